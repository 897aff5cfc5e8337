//! Page-load wiring
//!
//! The network wrapper is composed when the module loads, before the page has
//! an observer. On document-ready the bootstrap either leaves the page alone
//! (excluded path) or creates the observer and publishes it to the wrapper.

use std::sync::Arc;

use tracing::info;

use crate::config::ObserverConfig;
use crate::error::ObserverError;
use crate::host::PageHost;
use crate::interceptor::{InstrumentedClient, NetworkClient, ObserverSlot};
use crate::observer::ActivityObserver;
use crate::scheduler::Scheduler;
use crate::transport::Transport;

/// Instrumentation for one page load
pub struct PageInstrumentation<C> {
    client: InstrumentedClient<C>,
    config: ObserverConfig,
}

impl<C: NetworkClient> PageInstrumentation<C> {
    /// Wrap the page's network client; done once at module load
    pub fn install(client: C, config: ObserverConfig) -> Self {
        let client = InstrumentedClient::new(client, ObserverSlot::new(), config.clone());
        Self { client, config }
    }

    /// Network client page code should use from now on
    pub fn client(&self) -> &InstrumentedClient<C> {
        &self.client
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Attach an observer unless the page is excluded
    ///
    /// Returns `Ok(None)` for excluded pages. Must run inside a tokio runtime.
    pub fn on_document_ready(
        &self,
        host: Arc<dyn PageHost>,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Option<ActivityObserver>, ObserverError> {
        let path = host.pathname();
        if self.config.is_excluded_path(&path) {
            info!(%path, "page excluded from activity tracking");
            return Ok(None);
        }

        let observer = ActivityObserver::initialize(host, transport, scheduler, self.config.clone())?;
        if !self.client.slot().fill(observer.emitter()) {
            return Err(ObserverError::Runtime(
                "an observer is already attached to this page".to_string(),
            ));
        }

        info!(%path, page_session = %observer.id(), "activity tracking started");
        Ok(Some(observer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PageSnapshot;
    use crate::interceptor::{FetchRequest, FetchResponse};
    use crate::scheduler::TokioScheduler;
    use crate::transport::MemoryTransport;
    use crate::types::ActivityAction;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct StaticClient;

    #[async_trait]
    impl NetworkClient for StaticClient {
        type Error = String;

        async fn fetch(&self, _request: FetchRequest) -> Result<FetchResponse, String> {
            Ok(FetchResponse::new(200))
        }
    }

    fn ready(
        page: &str,
        transport: Arc<MemoryTransport>,
    ) -> (PageInstrumentation<StaticClient>, Option<ActivityObserver>) {
        let instrumentation = PageInstrumentation::install(StaticClient, ObserverConfig::default());
        let observer = instrumentation
            .on_document_ready(
                Arc::new(PageSnapshot::new(page)),
                transport,
                Arc::new(TokioScheduler::current().unwrap()),
            )
            .unwrap();
        (instrumentation, observer)
    }

    #[tokio::test]
    async fn test_admin_pages_get_no_instrumentation() {
        let transport = Arc::new(MemoryTransport::new());
        let (instrumentation, observer) = ready("https://shop.test/admin/orders/", transport.clone());

        assert!(observer.is_none());
        assert!(!instrumentation.client().slot().is_filled());

        instrumentation
            .client()
            .fetch(FetchRequest::get("/search/?q=x"))
            .await
            .unwrap();
        assert!(transport.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_regular_page_is_observed() {
        let transport = Arc::new(MemoryTransport::new());
        let (instrumentation, observer) = ready("https://shop.test/catalog/", transport.clone());
        let observer = observer.unwrap();

        instrumentation
            .client()
            .fetch(FetchRequest::get("/search/?q=x"))
            .await
            .unwrap();
        observer.flush().await;

        let actions: Vec<_> = transport.events().into_iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![ActivityAction::PageView, ActivityAction::AjaxRequest]
        );
    }

    #[tokio::test]
    async fn test_prefix_only_matches_path_start() {
        let transport = Arc::new(MemoryTransport::new());
        let (_, observer) = ready("https://shop.test/docs/admin/", transport);
        assert!(observer.is_some());
    }

    #[tokio::test]
    async fn test_second_observer_rejected() {
        let transport = Arc::new(MemoryTransport::new());
        let (instrumentation, _observer) = ready("https://shop.test/", transport.clone());

        let again = instrumentation.on_document_ready(
            Arc::new(PageSnapshot::new("https://shop.test/")),
            transport,
            Arc::new(TokioScheduler::current().unwrap()),
        );
        assert!(matches!(again, Err(ObserverError::Runtime(_))));
    }
}
