//! Recording replay
//!
//! Drives a full page instrumentation (bootstrap, observer, request
//! interceptor) through a [`PageRecording`], honouring the recorded time
//! offsets. Network calls are answered from the recording itself.
//!
//! Replay stages:
//! 1. Validate the recording
//! 2. Install the interceptor around the recorded network
//! 3. Document-ready: attach the observer unless the page is excluded
//! 4. Feed each signal at its offset, spawning fetches so they overlap
//! 5. Let pending debounces and in-flight sends settle

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bootstrap::PageInstrumentation;
use crate::config::ObserverConfig;
use crate::error::ObserverError;
use crate::interceptor::{FetchRequest, FetchResponse, NetworkClient};
use crate::observer::DomSignal;
use crate::scheduler::TokioScheduler;
use crate::signal::{PageRecording, RecordedAction, RecordedFetch, RecordingAdapter, ReplayStep};
use crate::transport::Transport;

type Outcome = (Duration, Result<FetchResponse, String>);

/// Network answering from recorded outcomes
///
/// Outcomes are queued per method and URL and handed out in order.
#[derive(Default)]
pub struct RecordedNetwork {
    scripted: Mutex<HashMap<(String, String), VecDeque<Outcome>>>,
}

impl RecordedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of `fetch`, settling after `latency`
    pub fn script(&self, fetch: &RecordedFetch, latency: Duration) {
        let request = fetch.request();
        self.lock()
            .entry(Self::key(&request))
            .or_default()
            .push_back((latency, fetch.outcome()));
    }

    fn key(request: &FetchRequest) -> (String, String) {
        (
            request.method_or_default().to_ascii_uppercase(),
            request.url.clone(),
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), VecDeque<Outcome>>> {
        self.scripted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl NetworkClient for RecordedNetwork {
    type Error = String;

    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, String> {
        let key = Self::key(&request);
        let scripted = self.lock().get_mut(&key).and_then(VecDeque::pop_front);

        match scripted {
            Some((latency, outcome)) => {
                sleep(latency).await;
                outcome
            }
            None => Err(format!("no recorded response for {} {}", key.0, key.1)),
        }
    }
}

/// Replay settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayOptions {
    /// Playback speed; 2.0 plays twice as fast. Timings observed by the
    /// page (debounce, latency, time on page) scale with it.
    pub speed: f64,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self { speed: 1.0 }
    }
}

impl ReplayOptions {
    pub fn with_speed(speed: f64) -> Self {
        Self { speed }
    }

    fn validate(&self) -> Result<(), ObserverError> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(ObserverError::InvalidConfig(format!(
                "replay speed must be a positive number, got {}",
                self.speed
            )));
        }
        Ok(())
    }

    fn scale(&self, ms: u64) -> Result<Duration, ObserverError> {
        Duration::try_from_secs_f64(ms as f64 / 1000.0 / self.speed).map_err(|_| {
            ObserverError::InvalidConfig(format!(
                "replay speed {} stretches {ms}ms beyond any representable delay",
                self.speed
            ))
        })
    }
}

/// What a replay did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySummary {
    /// Per-page-load id of the observer; `None` for excluded pages
    pub page_session: Option<Uuid>,
    pub excluded: bool,
    /// Page signals dispatched to the observer
    pub dom_signals: usize,
    /// Network calls issued through the interceptor
    pub fetches: usize,
    /// Fetches whose outcome was a failure
    pub failed_fetches: usize,
    /// Recorded length in milliseconds
    pub duration_ms: u64,
}

/// Replay `recording`, delivering activity events through `transport`
///
/// Must run inside a tokio runtime.
pub async fn replay(
    recording: PageRecording,
    transport: Arc<dyn Transport>,
    config: ObserverConfig,
    options: ReplayOptions,
) -> Result<ReplaySummary, ObserverError> {
    options.validate()?;
    RecordingAdapter::validate(&recording)?;

    // Scale everything up front so a bad speed fails before anything is sent
    let mut offsets = Vec::with_capacity(recording.signals.len());
    for recorded in &recording.signals {
        let latency = match &recorded.signal {
            RecordedAction::Fetch(fetch) => options.scale(fetch.latency_ms)?,
            _ => Duration::ZERO,
        };
        offsets.push((options.scale(recorded.at_ms)?, latency));
    }
    let debounce_ms = options.scale(config.search_debounce_ms)?.as_millis() as u64;
    let config = ObserverConfig {
        search_debounce_ms: debounce_ms.max(1),
        ..config
    };

    let duration_ms = recording.duration_ms();
    let host = Arc::new(recording.page);
    let instrumentation = PageInstrumentation::install(RecordedNetwork::new(), config.clone());
    let scheduler = Arc::new(TokioScheduler::current()?);

    let observer = instrumentation.on_document_ready(host, transport, scheduler)?;
    let started = Instant::now();
    let fetches = TaskTracker::new();
    let failures = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut summary = ReplaySummary {
        page_session: observer.as_ref().map(|o| o.id()),
        excluded: observer.is_none(),
        dom_signals: 0,
        fetches: 0,
        failed_fetches: 0,
        duration_ms,
    };
    let mut unloaded = false;

    for (recorded, (offset, latency)) in recording.signals.into_iter().zip(offsets) {
        sleep_until(started + offset).await;

        match recorded.signal.into_step() {
            ReplayStep::Dom(signal) => {
                let Some(observer) = observer.as_ref() else {
                    continue;
                };
                unloaded |= signal == DomSignal::BeforeUnload;
                observer.handle(signal);
                summary.dom_signals += 1;
            }
            ReplayStep::Fetch(fetch) => {
                let client = instrumentation.client().clone();
                client
                    .inner()
                    .script(&fetch, latency);
                let failures = failures.clone();
                fetches.spawn(async move {
                    if client.fetch(fetch.request()).await.is_err() {
                        failures.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                });
                summary.fetches += 1;
            }
        }
    }

    fetches.close();
    fetches.wait().await;
    summary.failed_fetches = failures.load(std::sync::atomic::Ordering::Relaxed);

    if let Some(observer) = observer {
        if !unloaded && observer.pending_searches() > 0 {
            debug!("waiting for pending search input to settle");
            sleep(config.search_debounce() + Duration::from_millis(1)).await;
        }
        observer.flush().await;
    }

    info!(
        dom_signals = summary.dom_signals,
        fetches = summary.fetches,
        excluded = summary.excluded,
        "replay finished"
    );
    Ok(summary)
}
