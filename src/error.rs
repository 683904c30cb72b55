//! Error types for token exchange, voice listing, synthesis and preferences.

use std::io;

/// Failures while turning a credential document into a bearer token.
///
/// Cloneable so a single failed initialization can be reported to every
/// caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("malformed service account credentials: {0}")]
    MalformedCredentials(String),

    #[error("token request failed: {0}")]
    Transport(String),

    #[error("token endpoint returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("token response did not contain an access token")]
    MissingToken,
}

/// Voice listing failures. Logged by the catalog client, never surfaced.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("invalid voices URL: {0}")]
    InvalidUrl(String),

    #[error("voice listing failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("voice listing returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("could not decode voice list: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("invalid synthesis URL: {0}")]
    InvalidUrl(String),

    #[error("invalid synthesis request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("HTTP error {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("invalid response from server")]
    InvalidResponse,

    #[error("failed to encode request body: {0}")]
    EncodingFailure(#[source] serde_json::Error),

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl SynthesisError {
    /// Short status line suitable for a tray tooltip or status label.
    pub fn user_message(&self) -> String {
        match self {
            SynthesisError::Auth(AuthError::MalformedCredentials(_)) => {
                "Invalid service account credentials".to_string()
            }
            SynthesisError::Auth(_) => "Authentication failed".to_string(),
            SynthesisError::HttpStatus { status: 401 | 403, .. } => "Access denied".to_string(),
            SynthesisError::HttpStatus { status, .. } => format!("Server error ({status})"),
            SynthesisError::Transport(_) => "Network error".to_string(),
            SynthesisError::InvalidResponse => "Invalid response from server".to_string(),
            SynthesisError::InvalidRequest(msg) => msg.clone(),
            SynthesisError::InvalidUrl(_) | SynthesisError::EncodingFailure(_) => {
                "Could not build request".to_string()
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PreferencesError {
    #[error("preferences I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("invalid YAML preferences: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON preferences: {0}")]
    Json(#[from] serde_json::Error),
}
