//! The `drive-export auth` command, which checks the Google credentials without uploading anything.

use crate::api::{Mode, TokenProvider};
use crate::commands::Out;
use crate::config::GOOGLE_KEY_FILE;
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;
use tracing::info;

/// Loads `GOOGLE_KEY_FILE` and exchanges it for an access token. The token itself is never
/// printed.
///
/// In test mode no request is made.
///
/// # Errors
/// Returns an `Upload` error if the key file is not set, cannot be parsed, or is rejected by the
/// token endpoint.
pub async fn auth(config: &Config, mode: Mode) -> Result<Out<()>> {
    let key_file = config
        .key_file()
        .with_context(|| format!("{GOOGLE_KEY_FILE} is not set"))
        .pub_result(ErrorType::Upload)?;

    let mut token_provider = TokenProvider::load(key_file)
        .await
        .pub_result(ErrorType::Upload)?;
    let principal = token_provider.key().principal().to_string();
    if mode == Mode::Testing {
        return Ok(format!("Test mode: credentials for {principal} were not exchanged").into());
    }

    token_provider
        .refresh()
        .await
        .context("Unable to obtain an access token")
        .pub_result(ErrorType::Upload)?;
    if let Some(expires_at) = token_provider.expires_at() {
        info!("The access token is valid until {expires_at}");
    }
    Ok(format!("The credentials for {principal} are valid").into())
}
