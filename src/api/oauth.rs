//! Obtains OAuth access tokens for the Drive API from a credential file.
//!
//! - Service accounts sign a JWT assertion with their private key and exchange it for a token.
//! - Authorized users exchange their refresh token using the `oauth2` client.
//!
//! The token is cached for the lifetime of the `TokenProvider` and refreshed when it is within
//! five minutes of expiring.

use crate::api::credentials::{AuthorizedUserKey, KeyFile, ServiceAccountKey};
use crate::api::OAUTH_SCOPES;
use crate::error::Res;
use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oauth2::basic::BasicClient;
use oauth2::{ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, trace};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Hands out a valid access token, fetching a new one when the cached token is missing or about
/// to expire.
#[derive(Debug)]
pub(crate) struct TokenProvider {
    key: KeyFile,
    http: reqwest::Client,
    token: Option<AccessToken>,
}

impl TokenProvider {
    /// Loads the credential file at `path`. No request is made until a token is needed.
    pub(crate) async fn load(path: &Path) -> Res<Self> {
        let key = KeyFile::load(path).await?;
        Self::new(key)
    }

    pub(crate) fn new(key: KeyFile) -> Res<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Unable to build the HTTP client")?;
        Ok(Self {
            key,
            http,
            token: None,
        })
    }

    pub(crate) fn key(&self) -> &KeyFile {
        &self.key
    }

    /// When the cached token expires, if there is one.
    pub(crate) fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.token.as_ref().map(|t| t.expires_at)
    }

    /// Returns a valid access token, refreshing it first if needed.
    pub(crate) async fn token(&mut self) -> Res<&str> {
        if self.token.as_ref().map_or(true, AccessToken::is_expired) {
            self.refresh().await?;
        }
        self.token
            .as_ref()
            .map(|t| t.secret.as_str())
            .context("No access token is available")
    }

    /// Fetches a new access token regardless of the cached one.
    pub(crate) async fn refresh(&mut self) -> Res<()> {
        debug!(
            "Requesting an access token for {} from {}",
            self.key.principal(),
            self.key.token_uri()
        );
        let token = match &self.key {
            KeyFile::ServiceAccount(key) => service_account_token(&self.http, key).await?,
            KeyFile::AuthorizedUser(key) => authorized_user_token(&self.http, key).await?,
        };
        trace!("Access token valid until {}", token.expires_at);
        self.token = Some(token);
        Ok(())
    }
}

#[derive(Clone)]
struct AccessToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn new(secret: String, expires_in_secs: i64) -> Self {
        Self {
            secret,
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    /// True when the token is expired or will expire within the buffer.
    fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now() + Duration::minutes(EXPIRY_BUFFER_MINUTES)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The claims of the JWT assertion a service account signs.
#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl<'a> Claims<'a> {
    fn new(key: &'a ServiceAccountKey, now: DateTime<Utc>) -> Self {
        let iat = now.timestamp();
        Self {
            iss: &key.client_email,
            scope: OAUTH_SCOPES.join(" "),
            aud: &key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Res<String> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .context("The service account private key is not a valid RSA PEM key")?;
    jsonwebtoken::encode(&header, &Claims::new(key, now), &encoding_key)
        .context("Unable to sign the token request")
}

async fn service_account_token(
    http: &reqwest::Client,
    key: &ServiceAccountKey,
) -> Res<AccessToken> {
    let assertion = sign_assertion(key, Utc::now())?;
    let response = http
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .context("Failed to send the token request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());
        bail!("The token request failed with status {status}: {body}");
    }

    let body: TokenEndpointResponse = response
        .json()
        .await
        .context("Failed to parse the token response")?;
    Ok(AccessToken::new(
        body.access_token,
        body.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS),
    ))
}

async fn authorized_user_token(
    http: &reqwest::Client,
    key: &AuthorizedUserKey,
) -> Res<AccessToken> {
    let client = BasicClient::new(ClientId::new(key.client_id.clone()))
        .set_client_secret(ClientSecret::new(key.client_secret.clone()))
        .set_token_uri(
            TokenUrl::new(key.token_uri.clone())
                .with_context(|| format!("Invalid token URI '{}'", key.token_uri))?,
        );

    let response = client
        .exchange_refresh_token(&RefreshToken::new(key.refresh_token.clone()))
        .request_async(http)
        .await
        .context("Unable to refresh the OAuth token")?;

    let expires_in = response
        .expires_in()
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or(ASSERTION_LIFETIME_SECS);
    Ok(AccessToken::new(
        response.access_token().secret().to_string(),
        expires_in,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::credentials::DEFAULT_TOKEN_URI;

    fn service_account(private_key: &str) -> ServiceAccountKey {
        serde_json::from_value(serde_json::json!({
            "client_email": "exporter@reports.iam.gserviceaccount.com",
            "private_key": private_key,
            "private_key_id": "kid-1",
        }))
        .unwrap()
    }

    #[test]
    fn test_claims() {
        let key = service_account("unused");
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let claims = Claims::new(&key, now);
        assert_eq!("exporter@reports.iam.gserviceaccount.com", claims.iss);
        assert_eq!("https://www.googleapis.com/auth/drive.file", claims.scope);
        assert_eq!(DEFAULT_TOKEN_URI, claims.aud);
        assert_eq!(1_700_000_000, claims.iat);
        assert_eq!(1_700_003_600, claims.exp);
    }

    #[test]
    fn test_bad_private_key() {
        let key = service_account("not a pem");
        let err = sign_assertion(&key, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("not a valid RSA PEM key"));
    }

    #[test]
    fn test_access_token_expiry() {
        assert!(!AccessToken::new("t".into(), 3600).is_expired());
        assert!(AccessToken::new("t".into(), 60).is_expired());
        assert!(AccessToken::new("t".into(), -10).is_expired());
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let debug = format!("{:?}", AccessToken::new("ya29.secret".into(), 3600));
        assert!(!debug.contains("ya29.secret"));
    }

    #[tokio::test]
    async fn test_no_token_before_first_request() {
        let key = KeyFile::ServiceAccount(service_account("unused"));
        let provider = TokenProvider::new(key).unwrap();
        assert!(provider.expires_at().is_none());
        assert_eq!(
            "exporter@reports.iam.gserviceaccount.com",
            provider.key().principal()
        );
    }
}
