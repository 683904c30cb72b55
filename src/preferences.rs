//! User preferences and where they are stored.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PreferencesError, SynthesisError};
use crate::synthesis::{AudioEffect, MAX_PITCH, MIN_PITCH, SynthesisRequest};

pub const DEFAULT_HOTKEY: &str = "option + `";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// Service-account JSON document.
    pub credentials: String,
    pub voice_name: String,
    pub language: String,
    pub speaking_speed: f64,
    pub pitch: f64,
    pub effect: AudioEffect,
    pub hotkey: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            credentials: String::new(),
            voice_name: String::new(),
            language: String::new(),
            speaking_speed: 1.0,
            pitch: 0.0,
            effect: AudioEffect::None,
            hotkey: DEFAULT_HOTKEY.to_string(),
        }
    }
}

impl Preferences {
    pub fn has_voice(&self) -> bool {
        !self.voice_name.trim().is_empty()
    }

    /// Builds a request for `text` from these preferences. Out-of-range
    /// stored pitch values are clamped.
    pub fn synthesis_request(&self, text: &str) -> Result<SynthesisRequest, SynthesisError> {
        SynthesisRequest::new(text, self.language.as_str(), self.voice_name.as_str())?
            .with_speaking_rate(self.speaking_speed)
            .with_pitch(self.pitch.clamp(MIN_PITCH, MAX_PITCH))
            .map(|request| request.with_effect(self.effect))
    }
}

/// Read/write access to persisted preferences.
pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Preferences;
    fn save(&self, preferences: &Preferences) -> Result<(), PreferencesError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    inner: RwLock<Preferences>,
}

impl MemoryPreferences {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            inner: RwLock::new(preferences),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut Preferences)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }
}

impl PreferenceStore for MemoryPreferences {
    fn load(&self) -> Preferences {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, preferences: &Preferences) -> Result<(), PreferencesError> {
        self.update(|current| *current = preferences.clone());
        Ok(())
    }
}

/// YAML or JSON file, picked by extension (`.yml`/`.yaml` → YAML).
#[derive(Clone, Debug)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/traytalk/preferences.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("traytalk").join("preferences.yaml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_yaml(&self) -> bool {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_lowercase().as_str(), "yml" | "yaml"))
            .unwrap_or(false)
    }

    pub fn try_load(&self) -> Result<Preferences, PreferencesError> {
        if !self.path.exists() {
            return Ok(Preferences::default());
        }
        let data = fs::read_to_string(&self.path)?;
        if self.is_yaml() {
            Ok(serde_yaml::from_str(&data)?)
        } else {
            Ok(serde_json::from_str(&data)?)
        }
    }
}

impl PreferenceStore for FilePreferences {
    fn load(&self) -> Preferences {
        self.try_load().unwrap_or_else(|e| {
            warn!(error = %e, path = %self.path.display(), "using default preferences");
            Preferences::default()
        })
    }

    fn save(&self, preferences: &Preferences) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = if self.is_yaml() {
            serde_yaml::to_string(preferences)?
        } else {
            serde_json::to_string_pretty(preferences)?
        };
        fs::write(&self.path, data)?;
        Ok(())
    }
}
