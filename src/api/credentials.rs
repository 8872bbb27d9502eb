//! Deserialization of the Google credential file named by `GOOGLE_KEY_FILE`.
//!
//! Two kinds of files are accepted, distinguished by their `type` field:
//! - `service_account`: the JSON key downloaded for a service account.
//! - `authorized_user`: the file written by `gcloud auth application-default login`, which holds
//!   an OAuth client and a refresh token.

use crate::error::Res;
use crate::utils;
use anyhow::Context;
use serde::Deserialize;
use std::fmt::{Debug, Formatter};
use std::path::Path;

/// Google's OAuth token endpoint, used when the credential file does not name one.
pub(super) const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const REDACTED: &str = "<redacted>";

/// A parsed credential file.
#[derive(Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum KeyFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUserKey),
}

impl KeyFile {
    /// Reads and parses the credential file at `path`.
    pub(crate) async fn load(path: &Path) -> Res<Self> {
        utils::deserialize(path)
            .await
            .with_context(|| format!("Unable to load Google credentials from {}", path.display()))
    }

    /// The account the credentials act as, for log messages.
    pub(crate) fn principal(&self) -> &str {
        match self {
            KeyFile::ServiceAccount(key) => &key.client_email,
            KeyFile::AuthorizedUser(key) => &key.client_id,
        }
    }

    pub(crate) fn token_uri(&self) -> &str {
        match self {
            KeyFile::ServiceAccount(key) => &key.token_uri,
            KeyFile::AuthorizedUser(key) => &key.token_uri,
        }
    }
}

impl Debug for KeyFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyFile::ServiceAccount(key) => key.fmt(f),
            KeyFile::AuthorizedUser(key) => key.fmt(f),
        }
    }
}

/// The fields of a service account key that are needed to sign a token request.
#[derive(Clone, Deserialize)]
pub(crate) struct ServiceAccountKey {
    pub(super) client_email: String,
    pub(super) private_key: String,
    #[serde(default)]
    pub(super) private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub(super) token_uri: String,
}

impl Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &REDACTED)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// An OAuth client together with a user's refresh token.
#[derive(Clone, Deserialize)]
pub(crate) struct AuthorizedUserKey {
    pub(super) client_id: String,
    pub(super) client_secret: String,
    pub(super) refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub(super) token_uri: String,
}

impl Debug for AuthorizedUserKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUserKey")
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("refresh_token", &REDACTED)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}
