//! Synthesis requests, their wire format and the synthesis client.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use clap::ValueEnum;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::AccessToken;
use crate::error::SynthesisError;

pub const AUDIO_ENCODING: &str = "MP3";

pub const MIN_PITCH: f64 = -20.0;
pub const MAX_PITCH: f64 = 20.0;

/// Speaking rate submitted to the provider. The user's speed is applied by
/// the player instead.
pub const NEUTRAL_SPEAKING_RATE: f64 = 1.0;

/// Provider-side post-processing preset for a class of playback device.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize, ValueEnum)]
pub enum AudioEffect {
    #[default]
    #[serde(rename = "", alias = "none")]
    #[value(name = "none")]
    None,
    #[serde(rename = "wearable-class-device")]
    #[value(name = "wearable-class-device", alias = "wearable")]
    Wearable,
    #[serde(rename = "handset-class-device")]
    #[value(name = "handset-class-device", alias = "handset")]
    Handset,
    #[serde(rename = "headphone-class-device")]
    #[value(name = "headphone-class-device", alias = "headphone")]
    Headphone,
    #[serde(rename = "small-bluetooth-speaker-class-device")]
    #[value(name = "small-bluetooth-speaker-class-device", alias = "small-speaker")]
    SmallSpeaker,
    #[serde(rename = "medium-bluetooth-speaker-class-device")]
    #[value(name = "medium-bluetooth-speaker-class-device", alias = "medium-speaker")]
    MediumSpeaker,
    #[serde(rename = "large-home-entertainment-class-device")]
    #[value(name = "large-home-entertainment-class-device", alias = "large-speaker")]
    LargeSpeaker,
    #[serde(rename = "large-automotive-class-device")]
    #[value(name = "large-automotive-class-device", alias = "car-speaker")]
    CarSpeaker,
    #[serde(rename = "telephony-class-application")]
    #[value(name = "telephony-class-application", alias = "telephony")]
    Telephony,
}

impl AudioEffect {
    pub const ALL: [AudioEffect; 9] = [
        AudioEffect::None,
        AudioEffect::Wearable,
        AudioEffect::Handset,
        AudioEffect::Headphone,
        AudioEffect::SmallSpeaker,
        AudioEffect::MediumSpeaker,
        AudioEffect::LargeSpeaker,
        AudioEffect::CarSpeaker,
        AudioEffect::Telephony,
    ];

    /// The provider's `effectsProfileId` tag, `None` for no effect.
    pub fn profile_id(&self) -> Option<&'static str> {
        match self {
            AudioEffect::None => None,
            AudioEffect::Wearable => Some("wearable-class-device"),
            AudioEffect::Handset => Some("handset-class-device"),
            AudioEffect::Headphone => Some("headphone-class-device"),
            AudioEffect::SmallSpeaker => Some("small-bluetooth-speaker-class-device"),
            AudioEffect::MediumSpeaker => Some("medium-bluetooth-speaker-class-device"),
            AudioEffect::LargeSpeaker => Some("large-home-entertainment-class-device"),
            AudioEffect::CarSpeaker => Some("large-automotive-class-device"),
            AudioEffect::Telephony => Some("telephony-class-application"),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AudioEffect::None => "No Effect",
            AudioEffect::Wearable => "Wearable",
            AudioEffect::Handset => "Handset",
            AudioEffect::Headphone => "Headphone",
            AudioEffect::SmallSpeaker => "Small Speaker",
            AudioEffect::MediumSpeaker => "Medium Speaker",
            AudioEffect::LargeSpeaker => "Large Speaker",
            AudioEffect::CarSpeaker => "Car Speaker",
            AudioEffect::Telephony => "Telephony",
        }
    }
}

impl fmt::Display for AudioEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile_id().unwrap_or("none"))
    }
}

impl FromStr for AudioEffect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("none") {
            return Ok(AudioEffect::None);
        }
        AudioEffect::ALL
            .into_iter()
            .find(|effect| effect.profile_id() == Some(s))
            .ok_or_else(|| format!("unknown audio effect profile: {s}"))
    }
}

/// One utterance to synthesize.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub language_code: String,
    pub voice_name: String,
    /// Playback speed chosen by the user. Never sent to the provider.
    pub speaking_rate: f64,
    pub pitch: f64,
    pub effect: AudioEffect,
}

impl SynthesisRequest {
    pub fn new(
        text: impl Into<String>,
        language_code: impl Into<String>,
        voice_name: impl Into<String>,
    ) -> Result<Self, SynthesisError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SynthesisError::InvalidRequest("Nothing to speak".to_string()));
        }
        Ok(Self {
            text,
            language_code: language_code.into(),
            voice_name: voice_name.into(),
            speaking_rate: NEUTRAL_SPEAKING_RATE,
            pitch: 0.0,
            effect: AudioEffect::None,
        })
    }

    pub fn with_speaking_rate(mut self, rate: f64) -> Self {
        self.speaking_rate = rate;
        self
    }

    /// Pitch in semitones, accepted in `[-20.0, 20.0]` inclusive.
    pub fn with_pitch(mut self, pitch: f64) -> Result<Self, SynthesisError> {
        if !(MIN_PITCH..=MAX_PITCH).contains(&pitch) {
            return Err(SynthesisError::InvalidRequest(format!(
                "pitch {pitch} outside {MIN_PITCH}..={MAX_PITCH}"
            )));
        }
        self.pitch = pitch;
        Ok(self)
    }

    pub fn with_effect(mut self, effect: AudioEffect) -> Self {
        self.effect = effect;
        self
    }

    /// Serialized JSON body for `text:synthesize`.
    pub fn to_json(&self) -> Result<Vec<u8>, SynthesisError> {
        let body = SynthesizeRequest {
            input: SynthesisInput { text: &self.text },
            voice: VoiceSelectionParams {
                language_code: &self.language_code,
                name: &self.voice_name,
            },
            audio_config: AudioConfig {
                audio_encoding: AUDIO_ENCODING,
                speaking_rate: NEUTRAL_SPEAKING_RATE,
                pitch: self.pitch,
                effects_profile_id: self.effect.profile_id().map(|id| [id]),
            },
        };
        serde_json::to_vec(&body).map_err(SynthesisError::EncodingFailure)
    }
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelectionParams<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig<'a> {
    audio_encoding: &'a str,
    speaking_rate: f64,
    pitch: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    effects_profile_id: Option<[&'a str; 1]>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelectionParams<'a>,
    audio_config: AudioConfig<'a>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(alias = "audio_content")]
    audio_content: Option<String>,
}

/// Posts synthesis requests and decodes the returned audio.
#[derive(Clone, Debug)]
pub struct SynthesisClient {
    http: reqwest::Client,
    url: String,
}

impl SynthesisClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Returns the decoded MP3 payload for `request`.
    pub async fn synthesize(
        &self,
        token: &AccessToken,
        request: &SynthesisRequest,
    ) -> Result<Vec<u8>, SynthesisError> {
        let url = reqwest::Url::parse(&self.url)
            .map_err(|e| SynthesisError::InvalidUrl(format!("{}: {e}", self.url)))?;
        let body = request.to_json()?;

        debug!(
            voice = %request.voice_name,
            language = %request.language_code,
            pitch = request.pitch,
            effect = %request.effect,
            chars = request.text.chars().count(),
            "requesting synthesis"
        );
        let resp = self
            .http
            .post(url)
            .header(AUTHORIZATION, token.authorization())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            warn!(status = status.as_u16(), "synthesis request rejected");
            return Err(SynthesisError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let data: SynthesizeResponse =
            serde_json::from_slice(&bytes).map_err(|_| SynthesisError::InvalidResponse)?;
        let content = data.audio_content.ok_or(SynthesisError::InvalidResponse)?;
        let audio = base64::engine::general_purpose::STANDARD
            .decode(content)
            .map_err(|_| SynthesisError::InvalidResponse)?;
        debug!(bytes = audio.len(), "decoded synthesized audio");
        Ok(audio)
    }
}
