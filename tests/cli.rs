use assert_cmd::prelude::*;
use httpmock::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn traytalk(server: &MockServer, prefs: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("traytalk").unwrap();
    cmd.env("TRAYTALK_TOKEN", "test-token")
        .env("TRAYTALK_BASE_URL", server.base_url())
        .env_remove("HTTP_PROXY")
        .env_remove("HTTPS_PROXY")
        .env_remove("http_proxy")
        .env_remove("https_proxy")
        .arg("--prefs")
        .arg(prefs);
    cmd
}

#[test]
fn prints_help_without_args() {
    let mut cmd = Command::cargo_bin("traytalk").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("traytalk"));
}

#[test]
fn validates_output_extension() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("bad.wav");
    let mut cmd = Command::cargo_bin("traytalk").unwrap();
    cmd.args(["hello", "--output", out.to_str().unwrap()]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("does not match encoding"));
}

#[test]
fn speaks_to_output_file_with_neutral_rate() {
    let server = MockServer::start();
    let synth_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/text:synthesize")
            .header("authorization", "Bearer test-token")
            .json_body(serde_json::json!({
                "input": {"text": "Hello"},
                "voice": {"languageCode": "en-US", "name": "en-US-Standard-A"},
                "audioConfig": {
                    "audioEncoding": "MP3",
                    "speakingRate": 1.0,
                    "pitch": -4.5,
                    "effectsProfileId": ["headphone-class-device"]
                }
            }));
        then.status(200)
            .json_body(serde_json::json!({"audioContent": "aGVsbG8="}));
    });

    let dir = tempdir().unwrap();
    let out = dir.path().join("hello.mp3");

    traytalk(&server, &dir.path().join("prefs.yaml"))
        .args([
            "--voice",
            "en-US-Standard-A",
            "--speed",
            "1.8",
            "--pitch",
            "-4.5",
            "--effect",
            "headphone",
            "--output",
            out.to_str().unwrap(),
            "Hello",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));

    assert_eq!(fs::read(&out).unwrap(), b"hello");
    synth_mock.assert();
}

#[test]
fn saved_preferences_are_reused() {
    let server = MockServer::start();
    let synth_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/text:synthesize")
            .body_contains(r#""name":"nl-NL-Wavenet-B""#)
            .body_contains(r#""languageCode":"nl-NL""#);
        then.status(200)
            .json_body(serde_json::json!({"audioContent": "aGVsbG8="}));
    });

    let dir = tempdir().unwrap();
    let prefs = dir.path().join("prefs.yaml");
    let out = dir.path().join("hallo.mp3");

    traytalk(&server, &prefs)
        .args(["--voice", "nl-NL-Wavenet-B", "--save", "--list-voices"])
        .assert()
        .success();
    assert!(fs::read_to_string(&prefs).unwrap().contains("nl-NL-Wavenet-B"));

    traytalk(&server, &prefs)
        .args(["--output", out.to_str().unwrap(), "Hallo"])
        .assert()
        .success();
    synth_mock.assert();
}

#[test]
fn missing_voice_is_reported() {
    let server = MockServer::start();
    let dir = tempdir().unwrap();
    let out = dir.path().join("hello.mp3");

    traytalk(&server, &dir.path().join("prefs.yaml"))
        .args(["--output", out.to_str().unwrap(), "Hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no voice selected"));
    assert!(!out.exists());
}

#[test]
fn permission_denied_is_reported() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/text:synthesize");
        then.status(403).body(r#"{"error":"permission denied"}"#);
    });

    let dir = tempdir().unwrap();
    let out = dir.path().join("hello.mp3");

    traytalk(&server, &dir.path().join("prefs.yaml"))
        .args(["--voice", "en-US-Standard-A", "--output", out.to_str().unwrap(), "Hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Access denied"));
    assert!(!out.exists());
}

#[test]
fn list_voices_json() {
    let server = MockServer::start();
    let voices_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/voices")
            .header("authorization", "Bearer test-token");
        then.status(200).json_body(serde_json::json!({
            "voices": [
              {"name": "en-US-Test", "languageCodes": ["en-US"], "ssmlGender": "FEMALE", "naturalSampleRateHertz": 24000}
            ]
        }));
    });

    let dir = tempdir().unwrap();
    traytalk(&server, &dir.path().join("prefs.yaml"))
        .args(["--list-voices", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"voices\""))
        .stdout(predicate::str::contains("en-US-Test"));
    voices_mock.assert();
}
