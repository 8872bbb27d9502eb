//! Error types for the export pipeline.
//!
//! Internally everything returns `Res<T>`, which is an `anyhow` result carrying a context chain.
//! At the boundary of each pipeline stage that chain is tagged with the `ErrorType` of the stage,
//! producing the public `Error`. The tag decides the process exit code.

use serde::{Deserialize, Serialize};

/// The internal result type.
pub(crate) type Res<T> = std::result::Result<T, anyhow::Error>;

/// The public result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The stage of the pipeline that failed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// The settings could not be turned into a usable configuration.
    Config,
    /// The database connection could not be established.
    Connection,
    /// The query file could not be read or the query failed.
    Query,
    /// The spreadsheet could not be written.
    Render,
    /// Authentication or upload failed, or the upload was not confirmed.
    Upload,
}

serde_plain::derive_display_from_serialize!(ErrorType);
serde_plain::derive_fromstr_from_deserialize!(ErrorType);

/// A failure that ends the run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0:#}")]
    Config(anyhow::Error),

    #[error("Unable to connect to the database: {0:#}")]
    Connection(anyhow::Error),

    #[error("Query failed: {0:#}")]
    Query(anyhow::Error),

    #[error("Unable to render the spreadsheet: {0:#}")]
    Render(anyhow::Error),

    #[error("Upload to Google Drive failed: {0:#}")]
    Upload(anyhow::Error),
}

impl Error {
    pub fn new(error_type: ErrorType, e: impl Into<anyhow::Error>) -> Self {
        let e = e.into();
        match error_type {
            ErrorType::Config => Error::Config(e),
            ErrorType::Connection => Error::Connection(e),
            ErrorType::Query => Error::Query(e),
            ErrorType::Render => Error::Render(e),
            ErrorType::Upload => Error::Upload(e),
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            Error::Config(_) => ErrorType::Config,
            Error::Connection(_) => ErrorType::Connection,
            Error::Query(_) => ErrorType::Query,
            Error::Render(_) => ErrorType::Render,
            Error::Upload(_) => ErrorType::Upload,
        }
    }

    /// The process exit code for this failure. Zero is reserved for success, one for failures that
    /// happen before the pipeline starts (such as argument parsing).
    pub fn exit_code(&self) -> u8 {
        match self.error_type() {
            ErrorType::Config => 2,
            ErrorType::Connection => 3,
            ErrorType::Query => 4,
            ErrorType::Render => 5,
            ErrorType::Upload => 6,
        }
    }
}

/// Converts an internal result into a public one by tagging the error with an `ErrorType`.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T> IntoResult<T> for Res<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| Error::new(error_type, e))
    }
}
