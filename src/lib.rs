//! Speak selected text through Google Cloud Text-to-Speech.
//!
//! The [`SpeechCoordinator`] is the entry point: hand it a
//! [`PreferenceStore`] and a [`PlaybackSink`], then call
//! [`SpeechCoordinator::speak`] whenever the hotkey fires.

pub mod auth;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod playback;
pub mod preferences;
pub mod service;
pub mod synthesis;
pub mod voices;

pub use auth::{AccessToken, ServiceAccountKey, StaticToken, TokenManager, TokenSource};
pub use config::ApiConfig;
pub use coordinator::{RequestState, SpeakOutcome, SpeakTicket, SpeechCoordinator};
pub use error::{AuthError, CatalogError, PreferencesError, SynthesisError};
pub use playback::{CommandSink, FileSink, PlaybackSink};
pub use preferences::{FilePreferences, MemoryPreferences, PreferenceStore, Preferences};
pub use service::TtsService;
pub use synthesis::{AudioEffect, SynthesisClient, SynthesisRequest};
pub use voices::{Gender, Voice, VoiceCatalog};
