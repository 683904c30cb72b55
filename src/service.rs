//! The text-to-speech service object shared by the coordinator.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::auth::{TokenManager, TokenSource};
use crate::config::ApiConfig;
use crate::error::{AuthError, SynthesisError};
use crate::synthesis::{SynthesisClient, SynthesisRequest};
use crate::voices::{Voice, VoiceCatalog};

/// Token source, synthesis client and voice catalog bound to one set of
/// credentials. Replacing the credentials means building a new service.
pub struct TtsService {
    tokens: Arc<dyn TokenSource>,
    synthesis: SynthesisClient,
    catalog: VoiceCatalog,
    voices: RwLock<HashMap<Option<String>, Arc<Vec<Voice>>>>,
}

impl TtsService {
    pub fn new(config: &ApiConfig, http: reqwest::Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            tokens,
            synthesis: SynthesisClient::new(http.clone(), config.synthesize_url()),
            catalog: VoiceCatalog::new(http, config.voices_url()),
            voices: RwLock::new(HashMap::new()),
        }
    }

    /// Parses `credentials` as a service-account document and wires a
    /// [`TokenManager`] for it.
    pub fn from_credentials(config: &ApiConfig, credentials: &str) -> Result<Self, AuthError> {
        let http = config
            .http_client()
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        let tokens = TokenManager::from_json(http.clone(), credentials)?;
        Ok(Self::new(config, http, Arc::new(tokens)))
    }

    pub fn with_token_source(
        config: &ApiConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, AuthError> {
        let http = config
            .http_client()
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        Ok(Self::new(config, http, tokens))
    }

    /// Makes sure a token can be obtained.
    pub async fn warm_up(&self) -> Result<(), AuthError> {
        self.tokens.access_token().await.map(|_| ())
    }

    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, SynthesisError> {
        let token = self.tokens.access_token().await?;
        self.synthesis.synthesize(&token, request).await
    }

    /// Voice catalog for `language`, fetched once per filter and cached.
    /// Empty results are not cached so a later call can retry.
    pub async fn voices(&self, language: Option<&str>) -> Arc<Vec<Voice>> {
        let key = language.filter(|l| !l.is_empty()).map(str::to_owned);
        if let Some(cached) = self.voices.read().await.get(&key) {
            return Arc::clone(cached);
        }

        let token = match self.tokens.access_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "no token for voice listing");
                return Arc::new(Vec::new());
            }
        };
        let voices = Arc::new(self.catalog.list_voices(&token, key.as_deref()).await);
        if !voices.is_empty() {
            debug!(count = voices.len(), language = ?key, "caching voice catalog");
            self.voices
                .write()
                .await
                .insert(key, Arc::clone(&voices));
        }
        voices
    }
}
