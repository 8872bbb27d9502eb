//! Implements the `Drive` trait with the Drive v3 REST API.

use crate::api::{Drive, DriveFile, TokenProvider, Upload};
use crate::error::Res;
use anyhow::{bail, Context};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use url::Url;

const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

/// Uploads files with a single multipart request. The `TokenProvider` is created on the first
/// upload so that a missing or broken key file surfaces as an upload failure.
pub(super) struct GoogleDrive {
    key_file: PathBuf,
    token_provider: Option<TokenProvider>,
    client: reqwest::Client,
}

impl GoogleDrive {
    pub(super) fn new(key_file: &Path) -> Self {
        Self {
            key_file: key_file.to_path_buf(),
            token_provider: None,
            client: reqwest::Client::new(),
        }
    }

    async fn access_token(&mut self) -> Res<String> {
        if self.token_provider.is_none() {
            self.token_provider = Some(TokenProvider::load(&self.key_file).await?);
        }
        let provider = self
            .token_provider
            .as_mut()
            .context("The token provider was not created")?;
        Ok(provider.token().await?.to_string())
    }
}

#[async_trait::async_trait]
impl Drive for GoogleDrive {
    async fn create_file(&mut self, upload: Upload) -> Res<DriveFile> {
        trace!("create_file {} in folder {}", upload.name, upload.folder_id);
        let token = self
            .access_token()
            .await
            .context("Unable to authenticate with Google")?;

        let boundary = format!("drive-export-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_body(&boundary, &upload)?;
        debug!(
            "Uploading {} ({} bytes) to Google Drive",
            upload.name,
            upload.content.len()
        );

        let response = self
            .client
            .post(upload_url()?)
            .bearer_auth(token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .context("Failed to send upload request to Google Drive API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            bail!("Google Drive API upload failed with status {status}: {body}");
        }

        response
            .json()
            .await
            .context("Failed to parse Google Drive API response")
    }
}

fn upload_url() -> Res<Url> {
    Url::parse_with_params(
        UPLOAD_URL,
        &[
            ("uploadType", "multipart"),
            ("fields", "id,name"),
            ("supportsAllDrives", "true"),
        ],
    )
    .context("Invalid upload URL")
}

/// A `multipart/related` body: the JSON metadata part followed by the file content.
fn multipart_body(boundary: &str, upload: &Upload) -> Res<Vec<u8>> {
    let metadata = json!({
        "name": upload.name,
        "parents": [upload.folder_id],
        "mimeType": upload.mime_type,
    });
    let metadata =
        serde_json::to_string(&metadata).context("Unable to serialize the file metadata")?;

    let mut body = Vec::with_capacity(upload.content.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: {}\r\n\r\n", upload.mime_type).as_bytes(),
    );
    body.extend_from_slice(&upload.content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Ok(body)
}
