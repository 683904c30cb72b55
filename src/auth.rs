//! Service-account token exchange and caching.
//!
//! A [`TokenManager`] owns one credential document and the bearer token
//! minted from it. Tokens are reused until five minutes before they expire;
//! concurrent callers that find no usable token queue behind a single
//! refresh instead of each hitting the token endpoint.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{CLOUD_PLATFORM_SCOPE, DEFAULT_TOKEN_URI, TOKEN_ENV};
use crate::error::AuthError;

/// A token is treated as expired this long before its real expiry.
pub const EXPIRY_BUFFER: Duration = Duration::from_secs(300);

const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// Upper bound on a token lifetime reported by the token endpoint.
const MAX_TOKEN_LIFETIME_SECS: u64 = 24 * 3600;
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// The fields of a service-account key this crate needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri())
            .finish()
    }
}

impl ServiceAccountKey {
    /// Parses a service-account JSON document.
    pub fn from_json(document: &str) -> Result<Self, AuthError> {
        let key: ServiceAccountKey = serde_json::from_str(document)
            .map_err(|e| AuthError::MalformedCredentials(e.to_string()))?;

        if let Some(kind) = key.kind.as_deref() {
            if kind != "service_account" {
                return Err(AuthError::MalformedCredentials(format!(
                    "unsupported credential type '{kind}', expected 'service_account'"
                )));
            }
        }
        if key.client_email.trim().is_empty() {
            return Err(AuthError::MalformedCredentials(
                "client_email is empty".to_string(),
            ));
        }
        if key.private_key.trim().is_empty() {
            return Err(AuthError::MalformedCredentials(
                "private_key is empty".to_string(),
            ));
        }
        Ok(key)
    }

    pub fn token_uri(&self) -> &str {
        self.token_uri
            .as_deref()
            .filter(|uri| !uri.trim().is_empty())
            .unwrap_or(DEFAULT_TOKEN_URI)
    }

    /// RS256-signed JWT asserting this account for the cloud-platform scope.
    pub fn signed_assertion(&self, issued_at: u64) -> Result<String, AuthError> {
        #[derive(Serialize)]
        struct Claims<'a> {
            iss: &'a str,
            scope: &'a str,
            aud: &'a str,
            exp: u64,
            iat: u64,
        }

        let claims = Claims {
            iss: &self.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: self.token_uri(),
            exp: issued_at + ASSERTION_LIFETIME_SECS,
            iat: issued_at,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        header.kid = self.private_key_id.clone();

        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(|e| {
            AuthError::MalformedCredentials(format!("invalid RSA private key: {e}"))
        })?;
        encode(&header, &claims, &encoding_key)
            .map_err(|e| AuthError::MalformedCredentials(format!("could not sign assertion: {e}")))
    }
}

/// A bearer token together with the instant it stops being accepted.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: SystemTime,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: SystemTime) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// `true` iff `now < expires_at - 5 minutes`.
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        match self.expires_at.checked_sub(EXPIRY_BUFFER) {
            Some(deadline) => now < deadline,
            None => false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(SystemTime::now())
    }

    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

/// Anything that can hand out a usable bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken, AuthError>;
}

/// A fixed, externally issued token. Never refreshed.
pub struct StaticToken {
    value: String,
}

impl StaticToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Reads `TRAYTALK_TOKEN`, ignoring blank values.
    pub fn from_env() -> Option<Self> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .map(Self::new)
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        let expires_at = SystemTime::now() + Duration::from_secs(ASSERTION_LIFETIME_SECS);
        Ok(AccessToken::new(self.value.clone(), expires_at))
    }
}

/// Exchanges a service-account key for bearer tokens and caches the result.
pub struct TokenManager {
    http: reqwest::Client,
    key: ServiceAccountKey,
    cached: RwLock<Option<AccessToken>>,
    // Held for the whole duration of a refresh.
    refresh: Mutex<()>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager").field("key", &self.key).finish()
    }
}

impl TokenManager {
    pub fn new(http: reqwest::Client, key: ServiceAccountKey) -> Self {
        Self {
            http,
            key,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub fn from_json(http: reqwest::Client, document: &str) -> Result<Self, AuthError> {
        Ok(Self::new(http, ServiceAccountKey::from_json(document)?))
    }

    pub fn key(&self) -> &ServiceAccountKey {
        &self.key
    }

    /// The cached token, if it is still outside the expiry buffer.
    pub async fn cached_token(&self) -> Option<AccessToken> {
        self.cached
            .read()
            .await
            .as_ref()
            .filter(|token| token.is_valid())
            .cloned()
    }

    /// Returns a valid token, refreshing it at most once for any number of
    /// concurrent callers.
    pub async fn ensure_token(&self) -> Result<AccessToken, AuthError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _refresh = self.refresh.lock().await;
        if let Some(token) = self.cached_token().await {
            debug!("token refreshed by a concurrent caller");
            return Ok(token);
        }

        let token = self.exchange().await?;
        *self.cached.write().await = Some(token.clone());
        Ok(token)
    }

    /// Drops the cached token so the next call performs a fresh exchange.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn exchange(&self) -> Result<AccessToken, AuthError> {
        let requested_at = SystemTime::now();
        let issued_at = requested_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let assertion = self.key.signed_assertion(issued_at)?;
        let token_uri = self.key.token_uri();

        debug!(token_uri, client_email = %self.key.client_email, "requesting access token");
        let resp = self
            .http
            .post(token_uri)
            .form(&serde_json::json!({
                "grant_type": JWT_BEARER_GRANT,
                "assertion": assertion,
            }))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "token request failed");
                AuthError::Transport(e.to_string())
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "token endpoint rejected assertion");
            return Err(AuthError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        #[derive(Deserialize)]
        struct TokenResp {
            access_token: Option<String>,
            expires_in: Option<u64>,
        }
        let tr: TokenResp = serde_json::from_str(&body).map_err(|_| AuthError::MissingToken)?;
        let value = tr
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let expires_in = tr
            .expires_in
            .unwrap_or(ASSERTION_LIFETIME_SECS)
            .min(MAX_TOKEN_LIFETIME_SECS);

        info!(expires_in, "obtained new access token");
        Ok(AccessToken::new(
            value,
            requested_at + Duration::from_secs(expires_in),
        ))
    }
}

#[async_trait]
impl TokenSource for TokenManager {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        self.ensure_token().await
    }
}
