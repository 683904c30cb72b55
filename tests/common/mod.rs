#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use tokio::sync::watch;
use traytalk::{PlaybackSink, RequestState};

pub const TEST_KEY: &str = include_str!("../fixtures/service_account_key.pem");

/// Service-account document whose token endpoint is `token_uri`.
pub fn credentials(token_uri: &str, client_email: &str) -> String {
    serde_json::json!({
        "type": "service_account",
        "project_id": "traytalk-test",
        "private_key_id": "test-key",
        "private_key": TEST_KEY,
        "client_email": client_email,
        "token_uri": token_uri,
    })
    .to_string()
}

pub fn token_body(token: &str, expires_in: u64) -> serde_json::Value {
    serde_json::json!({
        "access_token": token,
        "expires_in": expires_in,
        "token_type": "Bearer",
    })
}

/// Sink that remembers everything it was asked to play.
#[derive(Default)]
pub struct RecordingSink {
    played: Mutex<Vec<(Vec<u8>, f64)>>,
    stops: AtomicUsize,
    states: OnceLock<watch::Receiver<RequestState>>,
    states_at_play: Mutex<Vec<RequestState>>,
}

impl RecordingSink {
    pub fn played(&self) -> Vec<(Vec<u8>, f64)> {
        self.played.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Record the coordinator state seen at every `play`.
    pub fn observe(&self, states: watch::Receiver<RequestState>) {
        let _ = self.states.set(states);
    }

    pub fn states_at_play(&self) -> Vec<RequestState> {
        self.states_at_play.lock().unwrap().clone()
    }
}

impl PlaybackSink for RecordingSink {
    fn play(&self, audio: Vec<u8>, rate: f64) {
        if let Some(states) = self.states.get() {
            let state = states.borrow().clone();
            self.states_at_play.lock().unwrap().push(state);
        }
        self.played.lock().unwrap().push((audio, rate));
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
