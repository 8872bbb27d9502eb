//! Implements the `Drive` trait in memory for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! export, top-to-bottom, without uploading to Google Drive.

use crate::api::{Drive, DriveFile, Upload};
use crate::error::Res;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::info;

/// How `TestDrive` answers the next upload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TestResponse {
    /// Answer with this file id.
    Id(String),
    /// Answer successfully but without an id.
    #[cfg(test)]
    MissingId,
    /// Fail the upload with this message.
    #[cfg(test)]
    Fail(String),
}

/// An implementation of `Drive` that records every upload. Responses are taken from a script and
/// once it is exhausted each upload gets a fresh random id.
#[derive(Debug, Default, Clone)]
pub(crate) struct TestDrive {
    script: VecDeque<TestResponse>,
    uploads: Arc<Mutex<Vec<Upload>>>,
}

impl TestDrive {
    /// A `TestDrive` that answers uploads with `responses`, in order.
    #[cfg(test)]
    pub(crate) fn new(responses: impl IntoIterator<Item = TestResponse>) -> Self {
        Self {
            script: responses.into_iter().collect(),
            uploads: Arc::default(),
        }
    }

    /// The uploads received so far, including failed ones. Clones of this `TestDrive` share them.
    #[cfg(test)]
    pub(crate) fn uploads(&self) -> Vec<Upload> {
        self.uploads
            .lock()
            .map(|uploads| uploads.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Drive for TestDrive {
    async fn create_file(&mut self, upload: Upload) -> Res<DriveFile> {
        let name = upload.name.clone();
        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push(upload);
        }
        let response = self
            .script
            .pop_front()
            .unwrap_or_else(|| TestResponse::Id(uuid::Uuid::new_v4().simple().to_string()));
        info!("Test mode: not uploading {name} to Google Drive");
        match response {
            TestResponse::Id(id) => Ok(DriveFile {
                id: Some(id),
                name: Some(name),
            }),
            #[cfg(test)]
            TestResponse::MissingId => Ok(DriveFile {
                id: None,
                name: Some(name),
            }),
            #[cfg(test)]
            TestResponse::Fail(message) => anyhow::bail!("{message}"),
        }
    }
}
