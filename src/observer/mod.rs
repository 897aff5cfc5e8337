//! Activity observer
//!
//! Receives page signals (scroll, click, submit, input, beforeunload) and
//! turns them into activity events. One observer exists per page load and
//! owns the session state for it.
//!
//! Handlers are synchronous and return immediately; network work is spawned
//! on the runtime, so the interaction being observed is never delayed.

pub mod click;
pub mod emitter;
pub mod form;
pub mod scroll;
pub mod search;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info_span};
use uuid::Uuid;

use crate::config::ObserverConfig;
use crate::error::ObserverError;
use crate::host::PageHost;
use crate::scheduler::{Debouncer, Scheduler};
use crate::transport::Transport;
use crate::types::{ButtonClick, DeliveryMode, PageView, SearchInput, SessionEnd};

pub use click::{describe_click, ClickCategory, ClickTarget};
pub use emitter::ActivityEmitter;
pub use form::FormSubmission;
pub use scroll::{ScrollDepth, ScrollMetrics};
pub use search::{is_search_field, settled_query};

/// A value typed into an input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputChange {
    /// Key of the field, as reported by [`PageHost::input_fields`]
    pub field: String,
    pub value: String,
}

/// Page signals the observer reacts to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomSignal {
    Scroll(ScrollMetrics),
    Click(ClickTarget),
    Submit(FormSubmission),
    Input(InputChange),
    BeforeUnload,
}

/// Per-page-load session state
#[derive(Debug)]
pub struct SessionState {
    started_at: Instant,
    scroll: ScrollDepth,
}

impl SessionState {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            scroll: ScrollDepth::new(),
        }
    }

    pub fn scroll_depth(&self) -> u8 {
        self.scroll.current()
    }

    pub fn max_scroll_depth(&self) -> u8 {
        self.scroll.max()
    }

    /// Whole seconds since the page loaded, rounded to nearest
    pub fn time_on_page(&self) -> u64 {
        let millis = self.started_at.elapsed().as_millis() as u64;
        (millis + 500) / 1000
    }
}

/// Observes one page and reports its activity
pub struct ActivityObserver {
    id: Uuid,
    emitter: ActivityEmitter,
    session: SessionState,
    search_fields: HashSet<String>,
    search_debounce: Debouncer<String>,
}

impl ActivityObserver {
    /// Start observing: register search fields present now and send `page_view`
    ///
    /// Must be called from within a tokio runtime.
    pub fn initialize(
        host: Arc<dyn PageHost>,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
        config: ObserverConfig,
    ) -> Result<Self, ObserverError> {
        config.validate()?;

        let id = Uuid::new_v4();
        let span = info_span!("activity_observer", page_session = %id);
        let debounce = config.search_debounce();

        let search_fields: HashSet<String> = host
            .input_fields()
            .into_iter()
            .filter(is_search_field)
            .map(|field| field.key)
            .collect();

        let emitter = ActivityEmitter::new(host, transport, config, span)?;
        let observer = Self {
            id,
            emitter,
            session: SessionState::new(),
            search_fields,
            search_debounce: Debouncer::new(scheduler, debounce),
        };

        debug!(
            page_session = %observer.id,
            search_fields = observer.search_fields.len(),
            "activity observer attached"
        );
        observer.track_page_view();
        Ok(observer)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Emitter shared with the request interceptor
    pub fn emitter(&self) -> ActivityEmitter {
        self.emitter.clone()
    }

    /// Whether input on `field` is observed
    pub fn observes_field(&self, field: &str) -> bool {
        self.search_fields.contains(field)
    }

    /// Route a page signal to its handler
    pub fn handle(&self, signal: DomSignal) {
        match signal {
            DomSignal::Scroll(metrics) => self.on_scroll(&metrics),
            DomSignal::Click(target) => self.on_click(&target),
            DomSignal::Submit(form) => self.on_form_submit(&form),
            DomSignal::Input(change) => self.on_search_input(&change.field, &change.value),
            DomSignal::BeforeUnload => self.on_page_exit(),
        }
    }

    /// Update scroll state; never emits
    pub fn on_scroll(&self, metrics: &ScrollMetrics) {
        self.session.scroll.record(metrics);
    }

    pub fn on_click(&self, target: &ClickTarget) {
        let Some(element) = describe_click(target) else {
            return;
        };
        self.emitter.emit(
            &ButtonClick {
                element,
                scroll_depth: self.session.max_scroll_depth(),
            },
            DeliveryMode::BestEffort,
        );
    }

    pub fn on_form_submit(&self, form: &FormSubmission) {
        let page_url = self.emitter.host().location_href();
        self.emitter
            .emit(&form.describe(&page_url), DeliveryMode::BestEffort);
    }

    /// Debounced per field; only the value present when the delay elapses is
    /// reported, and only if long enough
    pub fn on_search_input(&self, field: &str, value: &str) {
        if !self.observes_field(field) {
            debug!(field, "input on unobserved field ignored");
            return;
        }

        let emitter = self.emitter.clone();
        let value = value.to_string();
        let min_chars = emitter.config().min_search_query_chars;

        self.search_debounce.call(field.to_string(), move || {
            if let Some(query) = settled_query(&value, min_chars) {
                emitter.emit(
                    &SearchInput {
                        query,
                        partial: true,
                    },
                    DeliveryMode::BestEffort,
                );
            }
        });
    }

    /// `beforeunload`: report time on page through the beacon
    pub fn on_page_exit(&self) {
        self.emitter.emit(
            &SessionEnd {
                time_on_page: self.session.time_on_page(),
                max_scroll_depth: self.session.max_scroll_depth(),
            },
            DeliveryMode::Beacon,
        );
    }

    /// Number of search fields with a pending debounced emission
    pub fn pending_searches(&self) -> usize {
        self.search_debounce.pending_count()
    }

    /// Wait for in-flight sends to settle
    pub async fn flush(&self) {
        self.emitter.flush().await;
    }

    fn track_page_view(&self) {
        let host = self.emitter.host();
        self.emitter.emit(
            &PageView {
                page_title: host.title(),
                page_url: host.location_href(),
                referrer: host.referrer(),
                screen_resolution: host.screen_size().to_string(),
                viewport: host.viewport_size().to_string(),
            },
            DeliveryMode::BestEffort,
        );
    }
}
