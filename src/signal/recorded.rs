//! page.signal.v1 schema definition

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::host::PageSnapshot;
use crate::interceptor::{FetchRequest, FetchResponse};
use crate::observer::{ClickTarget, DomSignal, FormSubmission, InputChange, ScrollMetrics};

/// Current schema version
pub const SIGNAL_SCHEMA_VERSION: &str = "page.signal.v1";

/// First record of a recording: what the page looked like on document-ready
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingHeader {
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
    pub page: PageSnapshot,
}

/// One recorded page load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecording {
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
    pub page: PageSnapshot,
    #[serde(default)]
    pub signals: Vec<RecordedSignal>,
}

impl PageRecording {
    pub fn new(page: PageSnapshot) -> Self {
        Self {
            schema_version: SIGNAL_SCHEMA_VERSION.to_string(),
            recorded_at: None,
            page,
            signals: Vec::new(),
        }
    }

    pub fn with_signal(mut self, at_ms: u64, signal: RecordedAction) -> Self {
        self.signals.push(RecordedSignal { at_ms, signal });
        self
    }

    pub fn from_parts(header: RecordingHeader, signals: Vec<RecordedSignal>) -> Self {
        Self {
            schema_version: header.schema_version,
            recorded_at: header.recorded_at,
            page: header.page,
            signals,
        }
    }

    pub fn header(&self) -> RecordingHeader {
        RecordingHeader {
            schema_version: self.schema_version.clone(),
            recorded_at: self.recorded_at,
            page: self.page.clone(),
        }
    }

    /// Offset of the last signal
    pub fn duration_ms(&self) -> u64 {
        self.signals.iter().map(|s| s.at_ms).max().unwrap_or(0)
    }

    /// Keys of the input fields present in the page
    pub fn known_fields(&self) -> HashSet<&str> {
        self.page
            .input_fields
            .iter()
            .map(|f| f.key.as_str())
            .collect()
    }

    /// Validate the header: schema version and page URL
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SIGNAL_SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SIGNAL_SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }
        if let Err(e) = url::Url::parse(&self.page.href) {
            return Err(ValidationError::InvalidPage {
                reason: format!("href {:?}: {}", self.page.href, e),
            });
        }
        Ok(())
    }
}

/// A signal and its offset from document-ready
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedSignal {
    /// Milliseconds since the page became ready
    pub at_ms: u64,
    pub signal: RecordedAction,
}

impl RecordedSignal {
    /// Check this signal against the one before it and the page's fields
    pub fn validate(
        &self,
        previous_at: Option<u64>,
        known_fields: &HashSet<&str>,
    ) -> Result<(), ValidationError> {
        if let Some(previous) = previous_at {
            if self.at_ms < previous {
                return Err(ValidationError::OutOfOrder {
                    previous,
                    at_ms: self.at_ms,
                });
            }
        }

        match &self.signal {
            RecordedAction::Input(change) if !known_fields.contains(change.field.as_str()) => {
                Err(ValidationError::UnknownInputField {
                    field: change.field.clone(),
                })
            }
            RecordedAction::Fetch(fetch) => fetch.validate(),
            _ => Ok(()),
        }
    }
}

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordedAction {
    Scroll(ScrollMetrics),
    Click(ClickTarget),
    Submit(FormSubmission),
    Input(InputChange),
    BeforeUnload,
    /// A network call made by page code
    Fetch(RecordedFetch),
}

impl RecordedAction {
    pub fn kind(&self) -> &'static str {
        match self {
            RecordedAction::Scroll(_) => "scroll",
            RecordedAction::Click(_) => "click",
            RecordedAction::Submit(_) => "submit",
            RecordedAction::Input(_) => "input",
            RecordedAction::BeforeUnload => "before_unload",
            RecordedAction::Fetch(_) => "fetch",
        }
    }

    /// Split into a page signal or a network call
    pub fn into_step(self) -> ReplayStep {
        match self {
            RecordedAction::Scroll(m) => ReplayStep::Dom(DomSignal::Scroll(m)),
            RecordedAction::Click(t) => ReplayStep::Dom(DomSignal::Click(t)),
            RecordedAction::Submit(f) => ReplayStep::Dom(DomSignal::Submit(f)),
            RecordedAction::Input(c) => ReplayStep::Dom(DomSignal::Input(c)),
            RecordedAction::BeforeUnload => ReplayStep::Dom(DomSignal::BeforeUnload),
            RecordedAction::Fetch(f) => ReplayStep::Fetch(f),
        }
    }
}

/// A recorded action in replayable form
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayStep {
    Dom(DomSignal),
    Fetch(RecordedFetch),
}

/// A network call and how it settled
///
/// Exactly one of `status` and `error` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordedFetch {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Time until the call settled
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordedFetch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::InvalidFetch {
                reason: "url is empty".to_string(),
            });
        }
        match (&self.status, &self.error) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(ValidationError::InvalidFetch {
                reason: "both status and error are set".to_string(),
            }),
            (None, None) => Err(ValidationError::InvalidFetch {
                reason: "neither status nor error is set".to_string(),
            }),
        }
    }

    pub fn request(&self) -> FetchRequest {
        FetchRequest {
            url: self.url.clone(),
            method: self.method.clone(),
            ..Default::default()
        }
    }

    /// The outcome page code observed
    pub fn outcome(&self) -> Result<FetchResponse, String> {
        match (&self.status, &self.error) {
            (Some(status), _) => Ok(FetchResponse::new(*status)),
            (None, Some(error)) => Err(error.clone()),
            (None, None) => Err("no recorded outcome".to_string()),
        }
    }
}

/// Validation errors for recordings
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Invalid page: {reason}")]
    InvalidPage { reason: String },

    #[error("Signal at {at_ms}ms precedes previous signal at {previous}ms")]
    OutOfOrder { previous: u64, at_ms: u64 },

    #[error("Input on unknown field {field:?}")]
    UnknownInputField { field: String },

    #[error("Invalid fetch: {reason}")]
    InvalidFetch { reason: String },
}
