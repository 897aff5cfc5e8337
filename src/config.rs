//! Observer configuration
//!
//! Every constant the observer relies on (endpoint path, CSRF cookie/header
//! pair, excluded path prefix, debounce window, tracked request paths) lives
//! here so hosts can override them without touching the observer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ObserverError;

/// Default collection endpoint path, resolved against the page origin
pub const DEFAULT_ENDPOINT_PATH: &str = "/api/activity/";

/// Cookie holding the CSRF token
pub const DEFAULT_CSRF_COOKIE: &str = "csrftoken";

/// Header the CSRF token is echoed in
pub const DEFAULT_CSRF_HEADER: &str = "X-CSRFToken";

/// Pages under this prefix are never instrumented
pub const DEFAULT_EXCLUDED_PREFIX: &str = "/admin/";

/// Trailing-edge delay for search input
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 1000;

/// Shortest trimmed query that is reported
pub const DEFAULT_MIN_SEARCH_QUERY_CHARS: usize = 3;

/// Outbound request paths reported by the interceptor
pub const DEFAULT_TRACKED_REQUEST_PATHS: [&str; 3] = ["/suggest/", "/search/", "/filter/"];

/// Runtime configuration for the observer, the transport and the interceptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Collection endpoint path (or absolute URL)
    pub endpoint_path: String,
    /// Cookie the CSRF token is read from
    pub csrf_cookie: String,
    /// Header the CSRF token is sent in
    pub csrf_header: String,
    /// Path prefix of pages that receive no instrumentation
    pub excluded_path_prefix: String,
    /// Search input debounce window in milliseconds
    pub search_debounce_ms: u64,
    /// Minimum number of characters in a trimmed query
    pub min_search_query_chars: usize,
    /// URL substrings that mark an outbound request as tracked
    pub tracked_request_paths: Vec<String>,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            csrf_cookie: DEFAULT_CSRF_COOKIE.to_string(),
            csrf_header: DEFAULT_CSRF_HEADER.to_string(),
            excluded_path_prefix: DEFAULT_EXCLUDED_PREFIX.to_string(),
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
            min_search_query_chars: DEFAULT_MIN_SEARCH_QUERY_CHARS,
            tracked_request_paths: DEFAULT_TRACKED_REQUEST_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl ObserverConfig {
    /// Parse a configuration from JSON; absent keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self, ObserverError> {
        let config: ObserverConfig = serde_json::from_str(json)
            .map_err(|e| ObserverError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.endpoint_path = path.into();
        self
    }

    pub fn with_excluded_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.excluded_path_prefix = prefix.into();
        self
    }

    pub fn with_search_debounce(mut self, delay: Duration) -> Self {
        self.search_debounce_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_tracked_request_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked_request_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    /// Whether the interceptor should report a request to `url`
    pub fn is_tracked_request(&self, url: &str) -> bool {
        self.tracked_request_paths
            .iter()
            .any(|path| url.contains(path.as_str()))
    }

    /// Whether a page at `path` is left uninstrumented
    pub fn is_excluded_path(&self, path: &str) -> bool {
        !self.excluded_path_prefix.is_empty() && path.starts_with(&self.excluded_path_prefix)
    }

    pub fn validate(&self) -> Result<(), ObserverError> {
        if self.endpoint_path.trim().is_empty() {
            return Err(ObserverError::InvalidConfig(
                "endpoint_path must not be empty".to_string(),
            ));
        }
        if self.csrf_header.trim().is_empty() {
            return Err(ObserverError::InvalidConfig(
                "csrf_header must not be empty".to_string(),
            ));
        }
        if reqwest::header::HeaderName::from_bytes(self.csrf_header.as_bytes()).is_err() {
            return Err(ObserverError::InvalidConfig(format!(
                "csrf_header is not a valid header name: {}",
                self.csrf_header
            )));
        }
        if self.tracked_request_paths.iter().any(|p| p.is_empty()) {
            return Err(ObserverError::InvalidConfig(
                "tracked_request_paths must not contain empty entries".to_string(),
            ));
        }
        Ok(())
    }
}
