//! Voice catalog: wire types, the listing client and presentation helpers.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::AccessToken;
use crate::error::CatalogError;

#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Neutral,
    #[default]
    #[serde(rename = "SSML_VOICE_GENDER_UNSPECIFIED", other)]
    Unspecified,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Neutral => "neutral",
            Gender::Unspecified => "unspecified",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    pub name: String,
    #[serde(default)]
    pub language_codes: Vec<String>,
    #[serde(rename = "ssmlGender", default)]
    pub gender: Gender,
    #[serde(rename = "naturalSampleRateHertz", default)]
    pub native_sample_rate_hz: u32,
}

impl Voice {
    /// e.g. `en-US-Standard-A (female)`
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.gender.as_str())
    }

    pub fn speaks(&self, language: &str) -> bool {
        self.language_codes.iter().any(|code| code == language)
    }
}

#[derive(Deserialize, Serialize)]
struct ListVoicesResponse {
    #[serde(default)]
    voices: Vec<Voice>,
}

/// Sorted, de-duplicated language codes across `voices`.
pub fn languages(voices: &[Voice]) -> Vec<String> {
    let mut codes: Vec<String> = voices
        .iter()
        .flat_map(|v| v.language_codes.iter().cloned())
        .collect();
    codes.sort();
    codes.dedup();
    codes
}

/// Voices speaking `language`; an empty filter keeps everything.
pub fn filter_by_language<'a>(voices: &'a [Voice], language: &str) -> Vec<&'a Voice> {
    voices
        .iter()
        .filter(|v| language.is_empty() || v.speaks(language))
        .collect()
}

/// Client for the provider's voice listing endpoint.
#[derive(Clone, Debug)]
pub struct VoiceCatalog {
    http: reqwest::Client,
    url: String,
}

impl VoiceCatalog {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Lists voices, optionally filtered by language code.
    ///
    /// Any failure is logged and reported as an empty list so a voice picker
    /// can keep working with "nothing available".
    pub async fn list_voices(&self, token: &AccessToken, language: Option<&str>) -> Vec<Voice> {
        match self.try_list_voices(token, language).await {
            Ok(voices) => voices,
            Err(e) => {
                warn!(error = %e, language, "voice listing failed, reporting no voices");
                Vec::new()
            }
        }
    }

    pub async fn try_list_voices(
        &self,
        token: &AccessToken,
        language: Option<&str>,
    ) -> Result<Vec<Voice>, CatalogError> {
        let mut url = reqwest::Url::parse(&self.url)
            .map_err(|e| CatalogError::InvalidUrl(format!("{}: {e}", self.url)))?;
        if let Some(language) = language.filter(|l| !l.is_empty()) {
            url.query_pairs_mut().append_pair("languageCode", language);
        }

        let resp = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, token.authorization())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await?;
        let data: ListVoicesResponse = serde_json::from_slice(&body)?;
        debug!(count = data.voices.len(), language, "fetched voice catalog");
        Ok(data.voices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn voice(name: &str, langs: &[&str]) -> Voice {
        Voice {
            name: name.to_string(),
            language_codes: langs.iter().map(|l| l.to_string()).collect(),
            gender: Gender::Female,
            native_sample_rate_hz: 24000,
        }
    }

    #[test]
    fn decodes_provider_shape() {
        let raw = r#"{"voices":[
            {"name":"en-US-Standard-A","languageCodes":["en-US"],"ssmlGender":"MALE","naturalSampleRateHertz":24000},
            {"name":"x-Odd","languageCodes":[],"ssmlGender":"SOMETHING_NEW"}
        ]}"#;
        let data: ListVoicesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(data.voices[0].gender, Gender::Male);
        assert_eq!(data.voices[0].native_sample_rate_hz, 24000);
        assert_eq!(data.voices[1].gender, Gender::Unspecified);
        assert_eq!(data.voices[1].native_sample_rate_hz, 0);
    }

    #[test]
    fn display_name_includes_gender() {
        assert_eq!(
            voice("en-US-Standard-C", &["en-US"]).display_name(),
            "en-US-Standard-C (female)"
        );
    }

    #[test]
    fn languages_are_sorted_and_unique() {
        let voices = vec![
            voice("a", &["nl-NL", "en-US"]),
            voice("b", &["en-US"]),
            voice("c", &["de-DE"]),
        ];
        assert_eq!(languages(&voices), vec!["de-DE", "en-US", "nl-NL"]);
    }

    #[test]
    fn empty_filter_keeps_all_voices() {
        let voices = vec![voice("a", &["nl-NL"]), voice("b", &["en-US"])];
        assert_eq!(filter_by_language(&voices, "").len(), 2);
        let dutch = filter_by_language(&voices, "nl-NL");
        assert_eq!(dutch.len(), 1);
        assert_eq!(dutch[0].name, "a");
    }
}
