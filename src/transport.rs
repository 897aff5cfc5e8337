//! Delivery of activity events to the collection endpoint
//!
//! Two capabilities, mirroring what a page offers: an async JSON POST that
//! carries the CSRF header, and an optional beacon that is attempted even
//! while the page is being torn down.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::sync::Notify;
use tokio_util::task::TaskTracker;
use tracing::debug;
use url::Url;

use crate::error::ObserverError;
use crate::types::{ActivityEvent, DeliveryMode};

/// Content type browsers use for string beacon bodies
pub const BEACON_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

/// CSRF header attached to async POSTs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfHeader {
    pub name: String,
    pub value: String,
}

/// One async POST to the collection endpoint
#[derive(Debug, Clone)]
pub struct ActivityRequest {
    /// Endpoint path or absolute URL
    pub endpoint: String,
    /// Serialized [`ActivityEvent`]
    pub body: String,
    pub csrf: Option<CsrfHeader>,
}

/// Beacon primitive: fire-and-forget, no failure signal
pub trait Beacon: Send + Sync {
    /// Queue `body` for delivery; `false` when the platform refused it
    fn send_beacon(&self, endpoint: &str, body: String) -> bool;
}

/// Outbound channel for activity events
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: ActivityRequest) -> Result<(), ObserverError>;

    /// Beacon capability, checked at every use
    fn beacon(&self) -> Option<&dyn Beacon>;

    /// Wait for work the transport started in the background
    async fn flush(&self) {}
}

/// Transport backed by `reqwest`, resolving endpoints against a base URL
pub struct ReqwestTransport {
    client: Client,
    base: Url,
    beacon_enabled: bool,
    beacons: TaskTracker,
}

impl ReqwestTransport {
    /// `base` is normally the page origin; endpoint paths are joined onto it
    pub fn new(base: &str) -> Result<Self, ObserverError> {
        Self::with_client(Client::new(), base)
    }

    pub fn with_client(client: Client, base: &str) -> Result<Self, ObserverError> {
        Ok(Self {
            client,
            base: Url::parse(base)?,
            beacon_enabled: true,
            beacons: TaskTracker::new(),
        })
    }

    /// Build a transport whose base is the origin of `page_href`
    pub fn for_page(page_href: &str) -> Result<Self, ObserverError> {
        let page = Url::parse(page_href)?;
        Self::new(page.origin().ascii_serialization().as_str())
    }

    /// Disable the beacon capability, as on platforms without it
    pub fn without_beacon(mut self) -> Self {
        self.beacon_enabled = false;
        self
    }

    pub fn resolve(&self, endpoint: &str) -> Result<Url, ObserverError> {
        Ok(self.base.join(endpoint)?)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(&self, request: ActivityRequest) -> Result<(), ObserverError> {
        let url = self.resolve(&request.endpoint)?;
        let mut builder = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(request.body);

        if let Some(csrf) = &request.csrf {
            builder = builder.header(csrf.name.as_str(), csrf.value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        debug!(%url, %status, "activity POST answered");

        if !status.is_success() {
            return Err(ObserverError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }

    fn beacon(&self) -> Option<&dyn Beacon> {
        if self.beacon_enabled {
            Some(self)
        } else {
            None
        }
    }

    async fn flush(&self) {
        self.beacons.close();
        self.beacons.wait().await;
        self.beacons.reopen();
    }
}

impl Beacon for ReqwestTransport {
    fn send_beacon(&self, endpoint: &str, body: String) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        let Ok(url) = self.resolve(endpoint) else {
            return false;
        };

        let request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, BEACON_CONTENT_TYPE)
            .body(body);

        self.beacons.spawn_on(
            async move {
                match request.send().await {
                    Ok(response) => debug!(%url, status = %response.status(), "beacon delivered"),
                    Err(e) => debug!(%url, error = %e, "beacon lost"),
                }
            },
            &handle,
        );
        true
    }
}

/// A delivery captured by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub mode: DeliveryMode,
    pub endpoint: String,
    pub csrf: Option<CsrfHeader>,
    pub body: String,
}

impl Delivery {
    pub fn event(&self) -> Result<ActivityEvent, ObserverError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// In-memory transport for dry runs and tests
pub struct MemoryTransport {
    deliveries: Mutex<Vec<Delivery>>,
    delivered: Notify,
    beacon_supported: bool,
    reject_with: Option<u16>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            delivered: Notify::new(),
            beacon_supported: true,
            reject_with: None,
        }
    }

    /// Behave like a platform without `sendBeacon`
    pub fn without_beacon(mut self) -> Self {
        self.beacon_supported = false;
        self
    }

    /// Record POSTs but answer them with an HTTP error status
    pub fn rejecting(mut self, status: u16) -> Self {
        self.reject_with = Some(status);
        self
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.lock().clone()
    }

    /// Parsed events in delivery order, skipping bodies that fail to parse
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.lock()
            .iter()
            .filter_map(|d| d.event().ok())
            .collect()
    }

    /// Remove and return everything delivered so far
    pub fn take(&self) -> Vec<Delivery> {
        std::mem::take(&mut *self.lock())
    }

    /// Wait until at least `count` deliveries were recorded
    pub async fn wait_for(&self, count: usize) -> Vec<Delivery> {
        loop {
            let notified = self.delivered.notified();
            {
                let deliveries = self.lock();
                if deliveries.len() >= count {
                    return deliveries.clone();
                }
            }
            notified.await;
        }
    }

    fn record(&self, delivery: Delivery) {
        self.lock().push(delivery);
        self.delivered.notify_waiters();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Delivery>> {
        self.deliveries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn post(&self, request: ActivityRequest) -> Result<(), ObserverError> {
        self.record(Delivery {
            mode: DeliveryMode::BestEffort,
            endpoint: request.endpoint,
            csrf: request.csrf,
            body: request.body,
        });
        match self.reject_with {
            Some(status) => Err(ObserverError::HttpStatus(status)),
            None => Ok(()),
        }
    }

    fn beacon(&self) -> Option<&dyn Beacon> {
        if self.beacon_supported {
            Some(self)
        } else {
            None
        }
    }
}

impl Beacon for MemoryTransport {
    fn send_beacon(&self, endpoint: &str, body: String) -> bool {
        self.record(Delivery {
            mode: DeliveryMode::Beacon,
            endpoint: endpoint.to_string(),
            csrf: None,
            body,
        });
        true
    }
}
