//! Event emission (`send_activity`)
//!
//! The emitter is the part of the observer that other components hold on
//! to: debounced search tasks and the request interceptor report through a
//! cloned emitter rather than through the observer itself.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn, Instrument, Span};

use crate::config::ObserverConfig;
use crate::encoder::ActivityEncoder;
use crate::error::ObserverError;
use crate::host::PageHost;
use crate::transport::{ActivityRequest, CsrfHeader, Transport};
use crate::types::{ActivityAction, ActivityPayload, DeliveryMode};

/// Cloneable handle that builds and transmits activity events
#[derive(Clone)]
pub struct ActivityEmitter {
    inner: Arc<EmitterInner>,
}

struct EmitterInner {
    host: Arc<dyn PageHost>,
    transport: Arc<dyn Transport>,
    config: ObserverConfig,
    runtime: Handle,
    in_flight: TaskTracker,
    span: Span,
}

impl ActivityEmitter {
    /// Bind to the runtime the caller is running on
    pub fn new(
        host: Arc<dyn PageHost>,
        transport: Arc<dyn Transport>,
        config: ObserverConfig,
        span: Span,
    ) -> Result<Self, ObserverError> {
        let runtime = Handle::try_current().map_err(|e| ObserverError::Runtime(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(EmitterInner {
                host,
                transport,
                config,
                runtime,
                in_flight: TaskTracker::new(),
                span,
            }),
        })
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.inner.config
    }

    pub fn host(&self) -> &Arc<dyn PageHost> {
        &self.inner.host
    }

    /// Build the envelope for `data` and transmit it
    ///
    /// Never fails from the caller's point of view: every error is logged and
    /// the event is dropped.
    pub fn send_activity(&self, action: ActivityAction, data: Map<String, Value>, mode: DeliveryMode) {
        let _entered = self.inner.span.enter();
        let host = &self.inner.host;
        let config = &self.inner.config;

        let event = ActivityEncoder::envelope(action, data, &host.location_href(), Utc::now());
        let body = match event.to_json() {
            Ok(body) => body,
            Err(e) => {
                warn!(action = %event.action, error = %e, "activity event could not be encoded");
                return;
            }
        };

        match mode {
            DeliveryMode::Beacon => match self.inner.transport.beacon() {
                Some(beacon) => {
                    if !beacon.send_beacon(&config.endpoint_path, body) {
                        debug!(action = %event.action, "beacon refused");
                    }
                }
                None => debug!(action = %event.action, "no beacon support, event dropped"),
            },
            DeliveryMode::BestEffort => {
                let request = ActivityRequest {
                    endpoint: config.endpoint_path.clone(),
                    body,
                    csrf: Some(CsrfHeader {
                        name: config.csrf_header.clone(),
                        value: host.cookie_value(&config.csrf_cookie),
                    }),
                };
                let transport = self.inner.transport.clone();
                let action = event.action;

                self.inner.in_flight.spawn_on(
                    async move {
                        match transport.post(request).await {
                            Ok(()) => debug!(%action, "activity event delivered"),
                            Err(e) => warn!(%action, error = %e, "activity event dropped"),
                        }
                    }
                    .instrument(self.inner.span.clone()),
                    &self.inner.runtime,
                );
            }
        }
    }

    /// Send a typed payload
    pub fn emit<P: ActivityPayload>(&self, payload: &P, mode: DeliveryMode) {
        match payload.to_data() {
            Ok(data) => self.send_activity(P::action(), data, mode),
            Err(e) => warn!(action = %P::action(), error = %e, "activity payload rejected"),
        }
    }

    /// Number of async sends still in flight
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Wait until every send started so far has settled
    pub async fn flush(&self) {
        let tracker = &self.inner.in_flight;
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
        self.inner.transport.flush().await;
    }
}
