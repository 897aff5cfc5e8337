//! Outbound request instrumentation
//!
//! [`InstrumentedClient`] wraps any [`NetworkClient`] and reports calls to
//! tracked paths as `ajax_request` / `ajax_error`. Results are handed back to
//! the caller untouched, including failures.

use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::config::ObserverConfig;
use crate::error::{FetchError, ObserverError};
use crate::observer::ActivityEmitter;
use crate::types::{AjaxError, AjaxRequest, DeliveryMode};

/// Method assumed when a request does not name one
pub const DEFAULT_METHOD: &str = "GET";

/// An outbound request as issued by page code
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Method to report, defaulting to `GET`
    pub fn method_or_default(&self) -> &str {
        self.method.as_deref().unwrap_or(DEFAULT_METHOD)
    }
}

/// A settled response; any status, including 4xx/5xx
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// The page's network fetch capability
#[async_trait]
pub trait NetworkClient: Send + Sync {
    type Error: fmt::Display + Send + Sync + 'static;

    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, Self::Error>;
}

/// Shared reference to the page's observer, filled once by the bootstrap
#[derive(Clone, Default)]
pub struct ObserverSlot {
    emitter: Arc<OnceLock<ActivityEmitter>>,
}

impl ObserverSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the observer; `false` if one was already published
    pub fn fill(&self, emitter: ActivityEmitter) -> bool {
        self.emitter.set(emitter).is_ok()
    }

    pub fn get(&self) -> Option<&ActivityEmitter> {
        self.emitter.get()
    }

    pub fn is_filled(&self) -> bool {
        self.emitter.get().is_some()
    }
}

impl fmt::Debug for ObserverSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSlot")
            .field("filled", &self.is_filled())
            .finish()
    }
}

/// Decorator reporting tracked requests through the observer slot
pub struct InstrumentedClient<C> {
    inner: Arc<C>,
    slot: ObserverSlot,
    config: ObserverConfig,
}

impl<C> Clone for InstrumentedClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            slot: self.slot.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C: NetworkClient> InstrumentedClient<C> {
    pub fn new(inner: C, slot: ObserverSlot, config: ObserverConfig) -> Self {
        Self {
            inner: Arc::new(inner),
            slot,
            config,
        }
    }

    pub fn slot(&self) -> &ObserverSlot {
        &self.slot
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: NetworkClient> NetworkClient for InstrumentedClient<C> {
    type Error = C::Error;

    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, Self::Error> {
        if !self.config.is_tracked_request(&request.url) {
            return self.inner.fetch(request).await;
        }

        let url = request.url.clone();
        let method = request.method_or_default().to_string();
        let started = Instant::now();
        let result = self.inner.fetch(request).await;

        let Some(emitter) = self.slot.get() else {
            debug!(%url, "tracked request with no observer attached");
            return result;
        };

        match &result {
            Ok(response) => emitter.emit(
                &AjaxRequest {
                    url,
                    method,
                    response_time: started.elapsed().as_millis() as u64,
                    status: response.status,
                },
                DeliveryMode::BestEffort,
            ),
            Err(e) => emitter.emit(
                &AjaxError {
                    url,
                    error: e.to_string(),
                },
                DeliveryMode::BestEffort,
            ),
        }

        result
    }
}

/// [`NetworkClient`] backed by `reqwest`; relative URLs resolve against the
/// page origin
#[derive(Clone)]
pub struct ReqwestClient {
    client: Client,
    base: Url,
}

impl ReqwestClient {
    pub fn new(base: &str) -> Result<Self, ObserverError> {
        Self::with_client(Client::new(), base)
    }

    pub fn with_client(client: Client, base: &str) -> Result<Self, ObserverError> {
        Ok(Self {
            client,
            base: Url::parse(base)?,
        })
    }

    fn build(&self, request: FetchRequest) -> Result<reqwest::Request, FetchError> {
        let url = self
            .base
            .join(&request.url)
            .map_err(|e| FetchError(format!("invalid url {}: {e}", request.url)))?;
        let method = Method::from_bytes(request.method_or_default().as_bytes())
            .map_err(|e| FetchError(format!("invalid method: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FetchError(format!("invalid header value: {e}")))?;
            headers.append(name, value);
        }

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
            .build()
            .map_err(|e| FetchError(e.to_string()))
    }
}

#[async_trait]
impl NetworkClient for ReqwestClient {
    type Error = FetchError;

    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let request = self.build(request)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| FetchError(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError(e.to_string()))?
            .to_vec();

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PageSnapshot;
    use crate::transport::MemoryTransport;
    use crate::types::ActivityAction;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing::Span;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Answers with queued outcomes after a fixed latency
    struct ScriptedClient {
        latency: Duration,
        outcomes: Mutex<VecDeque<Result<FetchResponse, String>>>,
        seen: Mutex<Vec<FetchRequest>>,
    }

    impl ScriptedClient {
        fn new(latency: Duration) -> Self {
            Self {
                latency,
                outcomes: Mutex::new(VecDeque::new()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn respond(self, outcome: Result<FetchResponse, String>) -> Self {
            self.outcomes.lock().unwrap().push_back(outcome);
            self
        }

        fn seen(&self) -> Vec<FetchRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NetworkClient for ScriptedClient {
        type Error = String;

        async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, String> {
            self.seen.lock().unwrap().push(request);
            tokio::time::sleep(self.latency).await;
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("no scripted response".to_string()))
        }
    }

    fn attached_slot(transport: Arc<MemoryTransport>) -> ObserverSlot {
        let host = Arc::new(PageSnapshot::new("https://shop.test/catalog/"));
        let emitter =
            ActivityEmitter::new(host, transport, ObserverConfig::default(), Span::none()).unwrap();
        let slot = ObserverSlot::new();
        assert!(slot.fill(emitter));
        slot
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracked_success_reports_ajax_request() {
        let transport = Arc::new(MemoryTransport::new());
        let slot = attached_slot(transport.clone());
        let client = InstrumentedClient::new(
            ScriptedClient::new(Duration::from_millis(120))
                .respond(Ok(FetchResponse::new(200).with_body("[]"))),
            slot.clone(),
            ObserverConfig::default(),
        );

        let response = client.fetch(FetchRequest::get("/search/?q=x")).await.unwrap();
        assert_eq!(response, FetchResponse::new(200).with_body("[]"));
        slot.get().unwrap().flush().await;

        let events = transport.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.action, ActivityAction::AjaxRequest);
        assert_eq!(event.url, "/search/?q=x");
        assert_eq!(event.field("method"), Some(&Value::from("GET")));
        assert_eq!(event.field("status"), Some(&Value::from(200)));
        assert_eq!(event.field("response_time"), Some(&Value::from(120)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_is_still_a_response() {
        let transport = Arc::new(MemoryTransport::new());
        let slot = attached_slot(transport.clone());
        let client = InstrumentedClient::new(
            ScriptedClient::new(Duration::from_millis(5)).respond(Ok(FetchResponse::new(500))),
            slot.clone(),
            ObserverConfig::default(),
        );

        let request = FetchRequest::get("/filter/?color=red").with_method("POST");
        let response = client.fetch(request).await.unwrap();
        assert_eq!(response.status, 500);
        slot.get().unwrap().flush().await;

        let events = transport.events();
        assert_eq!(events[0].action, ActivityAction::AjaxRequest);
        assert_eq!(events[0].field("method"), Some(&Value::from("POST")));
        assert_eq!(events[0].field("status"), Some(&Value::from(500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracked_failure_reports_and_propagates() {
        let transport = Arc::new(MemoryTransport::new());
        let slot = attached_slot(transport.clone());
        let client = InstrumentedClient::new(
            ScriptedClient::new(Duration::from_millis(30))
                .respond(Err("Failed to fetch".to_string())),
            slot.clone(),
            ObserverConfig::default(),
        );

        let err = client.fetch(FetchRequest::get("/suggest/?q=bo")).await.unwrap_err();
        assert_eq!(err, "Failed to fetch");
        slot.get().unwrap().flush().await;

        let events = transport.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ActivityAction::AjaxError);
        assert_eq!(events[0].url, "/suggest/?q=bo");
        assert_eq!(events[0].field("error"), Some(&Value::from("Failed to fetch")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_untracked_request_passes_through_silently() {
        let transport = Arc::new(MemoryTransport::new());
        let slot = attached_slot(transport.clone());
        let inner = ScriptedClient::new(Duration::from_millis(10))
            .respond(Ok(FetchResponse::new(204)));
        let client = InstrumentedClient::new(inner, slot.clone(), ObserverConfig::default());

        let request = FetchRequest::get("/unrelated/").with_header("Accept", "text/html");
        let response = client.fetch(request.clone()).await.unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(client.inner().seen(), vec![request]);
        slot.get().unwrap().flush().await;

        assert!(transport.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_slot_passes_through() {
        let client = InstrumentedClient::new(
            ScriptedClient::new(Duration::from_millis(10)).respond(Ok(FetchResponse::new(200))),
            ObserverSlot::new(),
            ObserverConfig::default(),
        );

        let response = client.fetch(FetchRequest::get("/search/?q=boots")).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(!client.slot().is_filled());
    }

    #[tokio::test]
    async fn test_slot_fills_once() {
        let transport = Arc::new(MemoryTransport::new());
        let slot = attached_slot(transport.clone());
        let host = Arc::new(PageSnapshot::new("https://shop.test/other/"));
        let second =
            ActivityEmitter::new(host, transport, ObserverConfig::default(), Span::none()).unwrap();
        assert!(!slot.fill(second));
    }

    #[tokio::test]
    async fn test_reqwest_client_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search/"))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ReqwestClient::new(&server.uri()).unwrap();
        let response = client
            .fetch(
                FetchRequest::get("/search/")
                    .with_method("POST")
                    .with_header("Content-Type", "application/json")
                    .with_body("{}"),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.body, b"created".to_vec());
    }

    #[tokio::test]
    async fn test_reqwest_client_connection_error() {
        let client = ReqwestClient::new("http://127.0.0.1:9").unwrap();
        let err = client.fetch(FetchRequest::get("/search/")).await.unwrap_err();
        assert!(!err.to_string().is_empty());
        assert_eq!(
            ObserverError::from(err.clone()).to_string(),
            format!("Fetch failed: {err}")
        );
    }

    #[tokio::test]
    async fn test_reqwest_failure_reported_without_prefix() {
        let transport = Arc::new(MemoryTransport::new());
        let slot = attached_slot(transport.clone());
        let client = InstrumentedClient::new(
            ReqwestClient::new("http://127.0.0.1:9").unwrap(),
            slot.clone(),
            ObserverConfig::default(),
        );

        let err = client.fetch(FetchRequest::get("/search/?q=x")).await.unwrap_err();
        slot.get().unwrap().flush().await;

        let events = transport.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ActivityAction::AjaxError);
        let reported = events[0].field("error").and_then(Value::as_str).unwrap();
        assert_eq!(reported, err.to_string());
        assert!(!reported.starts_with("Fetch failed"));
    }
}
