//! Access to Google Drive.
//!
//! The `Drive` trait is the seam between the export pipeline and the Drive API. `GoogleDrive`
//! talks to the real API; `TestDrive` keeps uploads in memory and is selected when
//! `DRIVE_EXPORT_IN_TEST_MODE` is set.

mod credentials;
mod drive;
mod drive_test_client;
mod oauth;

use crate::error::Res;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub(crate) use drive_test_client::TestDrive;
#[cfg(test)]
pub(crate) use drive_test_client::TestResponse;
pub(crate) use oauth::TokenProvider;

/// When this environment variable is set to a non-empty value, uploads go to an in-memory `Drive`.
pub const TEST_MODE_ENV: &str = "DRIVE_EXPORT_IN_TEST_MODE";

/// The only scope requested. It grants access to files this application creates.
const OAUTH_SCOPES: &[&str] = &["https://www.googleapis.com/auth/drive.file"];

/// Selects which `Drive` implementation is used.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum Mode {
    /// Upload to Google Drive.
    #[default]
    Google,
    /// Keep uploads in memory.
    Testing,
}

impl Mode {
    /// `Mode::Testing` if `DRIVE_EXPORT_IN_TEST_MODE` is set and non-empty, else `Mode::Google`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !value.is_empty() => Mode::Testing,
            _ => Mode::Google,
        }
    }
}

/// A file to create in Drive.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Upload {
    pub(crate) name: String,
    pub(crate) folder_id: String,
    pub(crate) mime_type: String,
    pub(crate) content: Vec<u8>,
}

/// The fields Drive returns for a created file. Both are requested but either may be absent.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DriveFile {
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) name: Option<String>,
}

/// Creates files in Google Drive.
#[async_trait::async_trait]
pub(crate) trait Drive {
    /// Creates `upload` as a new file in its folder and returns the metadata Drive reports.
    async fn create_file(&mut self, upload: Upload) -> Res<DriveFile>;
}

/// Builds the `Drive` for `mode`. For `Mode::Google` the credentials at `key_file` are read when
/// the first file is created.
pub(crate) fn drive(mode: Mode, key_file: &Path) -> Box<dyn Drive + Send> {
    match mode {
        Mode::Google => Box::new(drive::GoogleDrive::new(key_file)),
        Mode::Testing => Box::new(TestDrive::default()),
    }
}
