//! Google service-account authentication.
//!
//! A signed RS256 assertion is exchanged at the key's token endpoint for a
//! short-lived bearer token. The token is cached process-wide and refreshed
//! shortly before it expires; concurrent first callers share one exchange.

use crate::error::{SheetsError, SheetsResult};
use crate::summarize_response_body;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// OAuth scope granting read/write access to spreadsheets.
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Token endpoint used when the key file does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens this close to expiry are treated as expired.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Anything that can hand out a bearer token for the Sheets API.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> SheetsResult<String>;

    /// Drop any cached token, e.g. after the API answered 401.
    async fn invalidate(&self) {}
}

/// A fixed token. Useful against emulators and in tests.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> SheetsResult<String> {
        Ok(self.0.clone())
    }
}

/// The fields of a service-account JSON key this crate needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> SheetsResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> SheetsResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Service-account token source with an in-memory cache.
pub struct ServiceAccountTokens {
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    http_client: reqwest::Client,
    cache: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    /// Fails early if the private key is not a valid RSA PEM.
    pub fn new(key: ServiceAccountKey, http_client: reqwest::Client) -> SheetsResult<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(Self {
            key,
            signing_key,
            http_client,
            cache: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn sign_assertion(&self, now: DateTime<Utc>) -> SheetsResult<String> {
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: SPREADSHEETS_SCOPE.to_string(),
            aud: self.key.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        Ok(encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.signing_key,
        )?)
    }

    async fn exchange(&self) -> SheetsResult<CachedToken> {
        let now = Utc::now();
        let assertion = self.sign_assertion(now)?;

        debug!(token_uri = %self.key.token_uri, "Exchanging service-account assertion");

        let response = self
            .http_client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            error!(status, body_summary = %body_summary, "Token exchange failed");
            return Err(SheetsError::Auth(format!(
                "token exchange failed with status {status} ({body_summary})"
            )));
        }

        let data: TokenResponse = response.json().await?;
        info!(
            client_email = %self.key.client_email,
            expires_in = data.expires_in,
            "Obtained service-account token"
        );

        Ok(CachedToken {
            value: data.access_token,
            expires_at: now + Duration::seconds(data.expires_in),
        })
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> SheetsResult<String> {
        // Held across the exchange so concurrent callers wait for one result.
        let mut cache = self.cache.lock().await;

        if let Some(token) = cache.as_ref().filter(|token| token.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let fresh = self.exchange().await?;
        let value = fresh.value.clone();
        *cache = Some(fresh);
        Ok(value)
    }

    async fn invalidate(&self) {
        self.cache.lock().await.take();
    }
}
