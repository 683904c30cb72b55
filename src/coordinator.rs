//! The speak pipeline front door.
//!
//! [`SpeechCoordinator`] owns at most one in-flight request. Every call to
//! [`SpeechCoordinator::speak`] bumps a generation counter, aborts the task
//! of the previous generation and stops playback. Completion handlers only
//! touch the sink or the published state while their generation is still
//! current, so a superseded request can never play audio even if its HTTP
//! response arrives late.
//!
//! Each request publishes its terminal state (`Completed`, `Failed` or
//! `Cancelled`) and then returns to `Idle`; the result itself stays
//! available through [`SpeakTicket::wait`] and
//! [`SpeechCoordinator::status_message`].
//!
//! Building the [`TtsService`] (credential parsing plus the first token
//! exchange) is single-flight: concurrent callers share one initialization
//! future and all observe its outcome.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::auth::TokenSource;
use crate::config::ApiConfig;
use crate::error::{AuthError, SynthesisError};
use crate::playback::PlaybackSink;
use crate::preferences::{PreferenceStore, Preferences};
use crate::service::TtsService;
use crate::voices::Voice;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Initializing,
    Requesting,
    Completed,
    /// Carries the short user-facing status line.
    Failed(String),
    Cancelled,
}

impl RequestState {
    /// `true` while a request is being prepared or is on the wire.
    pub fn is_busy(&self) -> bool {
        matches!(self, RequestState::Initializing | RequestState::Requesting)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// No voice selected or nothing to say.
    Skipped,
    Completed { bytes: usize },
    Failed(String),
    Cancelled,
}

/// Handle to one `speak` call.
#[derive(Debug)]
pub struct SpeakTicket {
    generation: u64,
    handle: Option<JoinHandle<SpeakOutcome>>,
}

impl SpeakTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn wait(self) -> SpeakOutcome {
        let Some(handle) = self.handle else {
            return SpeakOutcome::Skipped;
        };
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => SpeakOutcome::Cancelled,
            Err(e) => {
                warn!(error = %e, "speak task panicked");
                SpeakOutcome::Failed("Internal error".to_string())
            }
        }
    }
}

type InitFuture = Shared<BoxFuture<'static, Result<Arc<TtsService>, AuthError>>>;

enum ServiceSlot {
    Empty,
    Pending {
        credentials: String,
        init: InitFuture,
    },
    Ready {
        credentials: String,
        service: Arc<TtsService>,
    },
}

struct Flight {
    generation: u64,
    task: Option<AbortHandle>,
}

struct Inner {
    config: ApiConfig,
    preferences: Arc<dyn PreferenceStore>,
    sink: Arc<dyn PlaybackSink>,
    token_source: Option<Arc<dyn TokenSource>>,
    flight: Mutex<Flight>,
    service: Mutex<ServiceSlot>,
    state: watch::Sender<RequestState>,
    status: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SpeechCoordinatorBuilder {
    config: ApiConfig,
    preferences: Arc<dyn PreferenceStore>,
    sink: Arc<dyn PlaybackSink>,
    token_source: Option<Arc<dyn TokenSource>>,
}

impl SpeechCoordinatorBuilder {
    pub fn config(mut self, config: ApiConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `tokens` instead of the credentials stored in preferences.
    pub fn token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(tokens);
        self
    }

    pub fn build(self) -> SpeechCoordinator {
        let (state, _) = watch::channel(RequestState::Idle);
        SpeechCoordinator {
            inner: Arc::new(Inner {
                config: self.config,
                preferences: self.preferences,
                sink: self.sink,
                token_source: self.token_source,
                flight: Mutex::new(Flight {
                    generation: 0,
                    task: None,
                }),
                service: Mutex::new(ServiceSlot::Empty),
                state,
                status: Mutex::new(None),
            }),
        }
    }
}

#[derive(Clone)]
pub struct SpeechCoordinator {
    inner: Arc<Inner>,
}

impl SpeechCoordinator {
    pub fn builder(
        preferences: Arc<dyn PreferenceStore>,
        sink: Arc<dyn PlaybackSink>,
    ) -> SpeechCoordinatorBuilder {
        SpeechCoordinatorBuilder {
            config: ApiConfig::default(),
            preferences,
            sink,
            token_source: None,
        }
    }

    /// Speaks `text` with the current preferences, superseding any request
    /// still in flight. Must be called from within a Tokio runtime.
    pub fn speak(&self, text: &str) -> SpeakTicket {
        let preferences = self.inner.preferences.load();
        let mut flight = lock(&self.inner.flight);
        let generation = self.inner.supersede(&mut flight);

        if !preferences.has_voice() || text.trim().is_empty() {
            debug!(generation, "no voice selected or empty text, ignoring");
            return SpeakTicket {
                generation,
                handle: None,
            };
        }

        self.inner.state.send_replace(RequestState::Initializing);
        let inner = Arc::clone(&self.inner);
        let text = text.to_owned();
        let handle = tokio::spawn(async move { inner.run(generation, text, preferences).await });
        flight.task = Some(handle.abort_handle());
        SpeakTicket {
            generation,
            handle: Some(handle),
        }
    }

    /// Cancels the in-flight request, if any, and stops playback.
    pub fn cancel(&self) {
        let mut flight = lock(&self.inner.flight);
        self.inner.supersede(&mut flight);
    }

    /// Voices for `language` through the shared, cached service. Failures
    /// yield an empty list.
    pub async fn voices(&self, language: Option<&str>) -> Arc<Vec<Voice>> {
        let preferences = self.inner.preferences.load();
        match self.inner.service(&preferences.credentials).await {
            Ok(service) => service.voices(language).await,
            Err(e) => {
                warn!(error = %e, "voice catalog unavailable");
                Arc::new(Vec::new())
            }
        }
    }

    pub fn state(&self) -> RequestState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState> {
        self.inner.state.subscribe()
    }

    /// Status line of the last failed request; cleared on success.
    pub fn status_message(&self) -> Option<String> {
        lock(&self.inner.status).clone()
    }
}

impl Inner {
    /// Starts a new generation: aborts the previous task and silences the sink.
    fn supersede(&self, flight: &mut Flight) -> u64 {
        flight.generation += 1;
        if let Some(task) = flight.task.take() {
            if !task.is_finished() {
                debug!(generation = flight.generation - 1, "cancelling superseded request");
                task.abort();
                self.state.send_replace(RequestState::Cancelled);
                self.state.send_replace(RequestState::Idle);
            }
        }
        self.sink.stop();
        flight.generation
    }

    async fn run(
        self: Arc<Self>,
        generation: u64,
        text: String,
        preferences: Preferences,
    ) -> SpeakOutcome {
        let service = match self.service(&preferences.credentials).await {
            Ok(service) => service,
            Err(e) => {
                return self
                    .deliver(generation, Err(e.into()), preferences.speaking_speed)
                    .await;
            }
        };
        if !self.advance(generation, RequestState::Requesting) {
            return SpeakOutcome::Cancelled;
        }

        let result = match preferences.synthesis_request(&text) {
            Ok(request) => service.synthesize(&request).await,
            Err(e) => Err(e),
        };
        self.deliver(generation, result, preferences.speaking_speed).await
    }

    /// Runs [`Inner::finish`] off the async workers; sinks may block.
    async fn deliver(
        self: &Arc<Self>,
        generation: u64,
        result: Result<Vec<u8>, SynthesisError>,
        rate: f64,
    ) -> SpeakOutcome {
        let inner = Arc::clone(self);
        match tokio::task::spawn_blocking(move || inner.finish(generation, result, rate)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(generation, error = %e, "delivery task failed");
                SpeakOutcome::Failed("Internal error".to_string())
            }
        }
    }

    fn advance(&self, generation: u64, state: RequestState) -> bool {
        let flight = lock(&self.flight);
        if flight.generation != generation {
            return false;
        }
        debug!(generation, ?state, "request state");
        self.state.send_replace(state);
        true
    }

    fn finish(
        &self,
        generation: u64,
        result: Result<Vec<u8>, SynthesisError>,
        rate: f64,
    ) -> SpeakOutcome {
        let mut flight = lock(&self.flight);
        if flight.generation != generation {
            debug!(generation, "discarding result of superseded request");
            return SpeakOutcome::Cancelled;
        }
        flight.task = None;

        let outcome = match result {
            Ok(audio) => {
                let bytes = audio.len();
                *lock(&self.status) = None;
                self.state.send_replace(RequestState::Completed);
                info!(generation, bytes, rate, "playing synthesized speech");
                self.sink.play(audio, rate);
                SpeakOutcome::Completed { bytes }
            }
            Err(e) => {
                let message = e.user_message();
                warn!(generation, error = %e, "speak request failed");
                *lock(&self.status) = Some(message.clone());
                self.state.send_replace(RequestState::Failed(message.clone()));
                SpeakOutcome::Failed(message)
            }
        };
        self.state.send_replace(RequestState::Idle);
        outcome
    }

    /// The service for `credentials`, initializing it at most once at a time.
    async fn service(&self, credentials: &str) -> Result<Arc<TtsService>, AuthError> {
        // An injected token source makes the stored credentials irrelevant.
        let key = if self.token_source.is_some() {
            ""
        } else {
            credentials
        };

        let init = {
            let mut slot = lock(&self.service);
            match &*slot {
                ServiceSlot::Ready {
                    credentials,
                    service,
                } if credentials == key => return Ok(Arc::clone(service)),
                ServiceSlot::Pending { credentials, init } if credentials == key => init.clone(),
                _ => {
                    debug!("initializing text-to-speech client");
                    let init = initialize(
                        self.config.clone(),
                        key.to_owned(),
                        self.token_source.clone(),
                    )
                    .boxed()
                    .shared();
                    *slot = ServiceSlot::Pending {
                        credentials: key.to_owned(),
                        init: init.clone(),
                    };
                    init
                }
            }
        };

        let outcome = init.clone().await;

        let mut slot = lock(&self.service);
        if let ServiceSlot::Pending {
            credentials,
            init: pending,
        } = &*slot
        {
            if pending.ptr_eq(&init) {
                let credentials = credentials.clone();
                *slot = match &outcome {
                    Ok(service) => ServiceSlot::Ready {
                        credentials,
                        service: Arc::clone(service),
                    },
                    // Let the next caller retry.
                    Err(_) => ServiceSlot::Empty,
                };
            }
        }
        outcome
    }
}

async fn initialize(
    config: ApiConfig,
    credentials: String,
    tokens: Option<Arc<dyn TokenSource>>,
) -> Result<Arc<TtsService>, AuthError> {
    let service = match tokens {
        Some(tokens) => TtsService::with_token_source(&config, tokens)?,
        None => TtsService::from_credentials(&config, &credentials)?,
    };
    service.warm_up().await?;
    info!("text-to-speech client ready");
    Ok(Arc::new(service))
}
