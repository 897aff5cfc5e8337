//! Activity Observer - Page interaction instrumentation
//!
//! Observes page interactions (views, scrolling, clicks, form submissions,
//! search input, outbound requests, session end) and reports each one as an
//! activity event to a collection endpoint.
//!
//! ## Modules
//!
//! - **Observer**: per-page-load session and signal handlers
//! - **Interceptor**: decorator reporting tracked outbound requests
//! - **Bootstrap**: document-ready wiring and path exclusion
//! - **Signal recordings**: page.signal.v1 recordings and offline replay

pub mod bootstrap;
pub mod config;
pub mod encoder;
pub mod error;
pub mod host;
pub mod interceptor;
pub mod observer;
pub mod replay;
pub mod scheduler;
pub mod signal;
pub mod transport;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use bootstrap::PageInstrumentation;
pub use config::ObserverConfig;
pub use error::{FetchError, ObserverError};
pub use host::{PageHost, PageSnapshot};
pub use interceptor::{InstrumentedClient, NetworkClient, ObserverSlot};
pub use observer::{ActivityObserver, DomSignal};
pub use transport::{ReqwestTransport, Transport};
pub use types::{ActivityAction, ActivityEvent, DeliveryMode};

// Recording exports
pub use signal::{PageRecording, RecordingAdapter, SIGNAL_SCHEMA_VERSION};

/// Library version
pub const OBSERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "activity-observer";
