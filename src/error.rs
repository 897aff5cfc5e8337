//! Error types for the activity observer

use thiserror::Error;

/// Errors that can occur while building or delivering activity events
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Collection endpoint answered with HTTP {0}")]
    HttpStatus(u16),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to parse recording: {0}")]
    ParseError(String),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Runtime unavailable: {0}")]
    Runtime(String),
}

/// A page network call that settled without a response; displays the bare
/// reason so `ajax_error` carries it unprefixed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FetchError(pub String);

impl From<FetchError> for ObserverError {
    fn from(e: FetchError) -> Self {
        ObserverError::Fetch(e.0)
    }
}

impl From<reqwest::Error> for ObserverError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ObserverError::HttpStatus(status.as_u16()),
            None => ObserverError::Transport(e.to_string()),
        }
    }
}

impl From<url::ParseError> for ObserverError {
    fn from(e: url::ParseError) -> Self {
        ObserverError::InvalidUrl(e.to_string())
    }
}
