//! Provider endpoints and HTTP client construction.

use std::time::Duration;

/// Production Text-to-Speech endpoint.
pub const DEFAULT_BASE_URL: &str = "https://texttospeech.googleapis.com";

/// Token endpoint used when the credential document has no `token_uri`.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The single permission scope every token is requested for.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Upper bound for every provider request (token, voices, synthesis).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable overriding [`DEFAULT_BASE_URL`].
pub const BASE_URL_ENV: &str = "TRAYTALK_BASE_URL";

/// Environment variable carrying a pre-issued bearer token.
pub const TOKEN_ENV: &str = "TRAYTALK_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ApiConfig {
    /// Defaults, with the base URL taken from `TRAYTALK_BASE_URL` when set.
    pub fn from_env() -> Self {
        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn voices_url(&self) -> String {
        format!("{}/v1/voices", self.base_url.trim_end_matches('/'))
    }

    pub fn synthesize_url(&self) -> String {
        format!("{}/v1/text:synthesize", self.base_url.trim_end_matches('/'))
    }

    /// Builds the shared HTTP client. Loopback targets bypass any configured proxy.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if is_loopback(&self.base_url) {
            builder = builder.no_proxy();
        }
        builder.build()
    }
}

fn is_loopback(url: &str) -> bool {
    url.contains("127.0.0.1") || url.contains("localhost")
}
