use std::sync::Arc;
use std::time::{Duration, SystemTime};

use httpmock::prelude::*;
use pretty_assertions::assert_eq;
use traytalk::{
    AccessToken, ApiConfig, AudioEffect, Gender, StaticToken, SynthesisClient, SynthesisError,
    SynthesisRequest, TtsService, VoiceCatalog,
};

fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn token() -> AccessToken {
    AccessToken::new("test-token", SystemTime::now() + Duration::from_secs(3600))
}

fn hello_request() -> SynthesisRequest {
    SynthesisRequest::new("Hello", "en-US", "en-US-Standard-A").unwrap()
}

#[tokio::test]
async fn synthesize_hello_returns_decoded_audio() {
    let server = MockServer::start_async().await;
    let synth_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/text:synthesize")
                .header("authorization", "Bearer test-token")
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "input": {"text": "Hello"},
                    "voice": {"languageCode": "en-US", "name": "en-US-Standard-A"},
                    "audioConfig": {
                        "audioEncoding": "MP3",
                        "speakingRate": 1.0,
                        "pitch": 0.0
                    }
                }));
            then.status(200)
                .json_body(serde_json::json!({"audioContent": "aGVsbG8="}));
        })
        .await;

    let client = SynthesisClient::new(http(), server.url("/v1/text:synthesize"));
    let audio = client.synthesize(&token(), &hello_request()).await.unwrap();

    assert_eq!(audio, b"hello");
    synth_mock.assert_async().await;
}

#[tokio::test]
async fn effect_speed_and_pitch_on_the_wire() {
    let server = MockServer::start_async().await;
    let synth_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/text:synthesize")
                .json_body(serde_json::json!({
                    "input": {"text": "Hello"},
                    "voice": {"languageCode": "en-US", "name": "en-US-Standard-A"},
                    "audioConfig": {
                        "audioEncoding": "MP3",
                        "speakingRate": 1.0,
                        "pitch": -20.0,
                        "effectsProfileId": ["wearable-class-device"]
                    }
                }));
            then.status(200)
                .json_body(serde_json::json!({"audioContent": "aGVsbG8="}));
        })
        .await;

    let request = hello_request()
        .with_speaking_rate(2.5)
        .with_pitch(-20.0)
        .unwrap()
        .with_effect(AudioEffect::Wearable);
    let client = SynthesisClient::new(http(), server.url("/v1/text:synthesize"));
    client.synthesize(&token(), &request).await.unwrap();

    synth_mock.assert_async().await;
}

#[tokio::test]
async fn permission_denied_surfaces_status_and_raw_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/text:synthesize");
            then.status(403).body(r#"{"error":"permission denied"}"#);
        })
        .await;

    let client = SynthesisClient::new(http(), server.url("/v1/text:synthesize"));
    let err = client
        .synthesize(&token(), &hello_request())
        .await
        .unwrap_err();

    match err {
        SynthesisError::HttpStatus { status, body } => {
            assert_eq!(status, 403);
            assert_eq!(body, r#"{"error":"permission denied"}"#);
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_or_undecodable_audio_is_invalid_response() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/missing");
            then.status(200).json_body(serde_json::json!({"other": 1}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/garbled");
            then.status(200)
                .json_body(serde_json::json!({"audioContent": "***not base64***"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/html");
            then.status(200).body("<html>oops</html>");
        })
        .await;

    for path in ["/v1/missing", "/v1/garbled", "/v1/html"] {
        let client = SynthesisClient::new(http(), server.url(path));
        let err = client
            .synthesize(&token(), &hello_request())
            .await
            .unwrap_err();
        assert!(
            matches!(err, SynthesisError::InvalidResponse),
            "{path}: {err:?}"
        );
    }
}

#[tokio::test]
async fn unparsable_endpoint_is_invalid_url() {
    let client = SynthesisClient::new(http(), "not a url");
    let err = client
        .synthesize(&token(), &hello_request())
        .await
        .unwrap_err();
    assert!(matches!(err, SynthesisError::InvalidUrl(_)));
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_error() {
    let client = SynthesisClient::new(http(), "http://127.0.0.1:9/v1/text:synthesize");
    let err = client
        .synthesize(&token(), &hello_request())
        .await
        .unwrap_err();
    assert!(matches!(err, SynthesisError::Transport(_)));
}

#[tokio::test]
async fn list_voices_passes_language_filter() {
    let server = MockServer::start_async().await;
    let voices_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/voices")
                .query_param("languageCode", "nl-NL")
                .header("authorization", "Bearer test-token");
            then.status(200).json_body(serde_json::json!({
                "voices": [
                    {"name": "nl-NL-Wavenet-B", "languageCodes": ["nl-NL"], "ssmlGender": "MALE", "naturalSampleRateHertz": 24000},
                    {"name": "nl-NL-Standard-A", "languageCodes": ["nl-NL"], "ssmlGender": "FEMALE", "naturalSampleRateHertz": 24000}
                ]
            }));
        })
        .await;

    let catalog = VoiceCatalog::new(http(), server.url("/v1/voices"));
    let voices = catalog.list_voices(&token(), Some("nl-NL")).await;

    assert_eq!(voices.len(), 2);
    assert_eq!(voices[0].name, "nl-NL-Wavenet-B");
    assert_eq!(voices[0].gender, Gender::Male);
    assert_eq!(voices[1].language_codes, vec!["nl-NL".to_string()]);
    voices_mock.assert_async().await;
}

#[tokio::test]
async fn malformed_catalog_json_yields_no_voices() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/voices");
            then.status(200).body("{\"voices\": [ {\"name\": ");
        })
        .await;

    let catalog = VoiceCatalog::new(http(), server.url("/v1/voices"));
    assert!(catalog.list_voices(&token(), None).await.is_empty());
    assert!(catalog.try_list_voices(&token(), None).await.is_err());
}

#[tokio::test]
async fn catalog_http_error_yields_no_voices() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/voices");
            then.status(500).body("boom");
        })
        .await;

    let catalog = VoiceCatalog::new(http(), server.url("/v1/voices"));
    assert!(catalog.list_voices(&token(), None).await.is_empty());
}

#[tokio::test]
async fn service_caches_voice_catalog() {
    let server = MockServer::start_async().await;
    let voices_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/voices");
            then.status(200).json_body(serde_json::json!({
                "voices": [
                    {"name": "en-US-Standard-A", "languageCodes": ["en-US"], "ssmlGender": "MALE", "naturalSampleRateHertz": 24000}
                ]
            }));
        })
        .await;

    let config = ApiConfig::default().with_base_url(server.base_url());
    let service =
        TtsService::with_token_source(&config, Arc::new(StaticToken::new("test-token"))).unwrap();

    let first = service.voices(None).await;
    let second = service.voices(None).await;

    assert_eq!(first.len(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    voices_mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn empty_catalog_is_not_cached() {
    let server = MockServer::start_async().await;
    let voices_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/voices");
            then.status(503);
        })
        .await;

    let config = ApiConfig::default().with_base_url(server.base_url());
    let service =
        TtsService::with_token_source(&config, Arc::new(StaticToken::new("test-token"))).unwrap();

    assert!(service.voices(None).await.is_empty());
    assert!(service.voices(None).await.is_empty());
    voices_mock.assert_hits_async(2).await;
}
