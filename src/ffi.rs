//! FFI bindings for the activity observer
//!
//! This module lets a native shell that hosts a web view drive an observer:
//! the shell forwards page signals as JSON and the observer reports to the
//! collection endpoint on its own runtime. All functions use C strings
//! (null-terminated); returned strings must be freed with
//! `observer_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::bootstrap::PageInstrumentation;
use crate::config::ObserverConfig;
use crate::error::ObserverError;
use crate::host::PageSnapshot;
use crate::interceptor::{FetchRequest, NetworkClient, ReqwestClient};
use crate::observer::{describe_click, ActivityObserver, ClickTarget, DomSignal};
use crate::scheduler::TokioScheduler;
use crate::transport::ReqwestTransport;

/// Upper bound on waiting for in-flight sends when a handle is freed
const FLUSH_ON_FREE_TIMEOUT: Duration = Duration::from_secs(2);

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Run an exported body; a panic becomes `fallback` with the last error set
fn guarded<T>(fallback: T, body: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => value,
        Err(_) => {
            set_last_error("internal error: observer call panicked");
            fallback
        }
    }
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Observer lifecycle
// ============================================================================

/// Opaque handle to an observed page
pub struct ObserverHandle {
    instrumentation: PageInstrumentation<ReqwestClient>,
    observer: Option<ActivityObserver>,
    runtime: Runtime,
}

impl ObserverHandle {
    fn open(
        page_json: &str,
        config_json: Option<&str>,
        endpoint_base: Option<&str>,
    ) -> Result<Self, ObserverError> {
        let page: PageSnapshot = serde_json::from_str(page_json)?;
        let config = match config_json {
            Some(json) => ObserverConfig::from_json(json)?,
            None => ObserverConfig::default(),
        };

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("activity-observer")
            .enable_all()
            .build()
            .map_err(|e| ObserverError::Runtime(e.to_string()))?;
        let _guard = runtime.enter();

        let transport = match endpoint_base {
            Some(base) => ReqwestTransport::new(base)?,
            None => ReqwestTransport::for_page(&page.href)?,
        };
        // Page calls resolve against the page itself, never the collector
        let client = ReqwestClient::new(&page.href)?;
        let instrumentation = PageInstrumentation::install(client, config);
        let observer = instrumentation.on_document_ready(
            Arc::new(page),
            Arc::new(transport),
            Arc::new(TokioScheduler::new(runtime.handle().clone())),
        )?;

        Ok(Self {
            instrumentation,
            observer,
            runtime,
        })
    }

    fn dispatch(&self, signal_json: &str) -> Result<bool, ObserverError> {
        let signal: DomSignal = serde_json::from_str(signal_json)?;
        let Some(observer) = self.observer.as_ref() else {
            return Ok(false);
        };
        let _guard = self.runtime.enter();
        observer.handle(signal);
        Ok(true)
    }

    fn fetch(&self, request_json: &str) -> Result<String, ObserverError> {
        let request: FfiFetchRequest = serde_json::from_str(request_json)?;
        let client = self.instrumentation.client();
        let response = self.runtime.block_on(client.fetch(FetchRequest {
            url: request.url,
            method: request.method,
            headers: request.headers,
            body: request.body,
        }))?;

        let body = serde_json::json!({
            "status": response.status,
            "headers": response.headers,
            "body": String::from_utf8_lossy(&response.body),
        });
        Ok(body.to_string())
    }

    fn close(self) {
        if let Some(observer) = self.observer.as_ref() {
            let flushed = self.runtime.block_on(async {
                tokio::time::timeout(FLUSH_ON_FREE_TIMEOUT, observer.flush()).await
            });
            if flushed.is_err() {
                tracing::warn!("in-flight activity events abandoned on close");
            }
        }
        drop(self.observer);
        self.runtime.shutdown_background();
    }
}

#[derive(serde::Deserialize)]
struct FfiFetchRequest {
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: Vec<(String, String)>,
    #[serde(default)]
    body: Option<String>,
}

/// Attach an observer to a page and send its `page_view`.
///
/// # Safety
/// - `page_json` must be a valid null-terminated C string holding a page
///   snapshot (`{"href": ..., "title": ..., ...}`).
/// - `config_json` and `endpoint_base` may be NULL for defaults (default
///   endpoint base is the page origin).
/// - Returns a handle that must be freed with `observer_free`, or NULL on
///   error; call `observer_last_error` to get the error message.
/// - Pages under the excluded prefix get a valid handle that reports nothing.
#[no_mangle]
pub unsafe extern "C" fn observer_new(
    page_json: *const c_char,
    config_json: *const c_char,
    endpoint_base: *const c_char,
) -> *mut ObserverHandle {
    guarded(ptr::null_mut(), || {
        clear_last_error();

        let page = match cstr_to_string(page_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid page JSON string pointer");
                return ptr::null_mut();
            }
        };
        let config = cstr_to_string(config_json);
        let base = cstr_to_string(endpoint_base);

        match ObserverHandle::open(&page, config.as_deref(), base.as_deref()) {
            Ok(handle) => Box::into_raw(Box::new(handle)),
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        }
    })
}

/// Forward a page signal (`{"type": "click", ...}`) to the observer.
///
/// Returns 0 when handled, 1 when the page is not observed, -1 on error.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `observer_new`.
/// - `signal_json` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn observer_dispatch(
    handle: *mut ObserverHandle,
    signal_json: *const c_char,
) -> i32 {
    guarded(-1, || {
        clear_last_error();

        if handle.is_null() {
            set_last_error("Null observer pointer");
            return -1;
        }
        let handle = &*handle;

        let signal = match cstr_to_string(signal_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid signal JSON string pointer");
                return -1;
            }
        };

        match handle.dispatch(&signal) {
            Ok(true) => 0,
            Ok(false) => 1,
            Err(e) => {
                set_last_error(&e.to_string());
                -1
            }
        }
    })
}

/// Perform a network call through the instrumented client, blocking until
/// it settles.
///
/// Returns `{"status", "headers", "body"}` JSON, or NULL on failure.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `observer_new`.
/// - `request_json` must be a valid null-terminated C string
///   (`{"url": ..., "method": ..., "headers": [[k, v]], "body": ...}`).
/// - Returns a newly allocated string that must be freed with
///   `observer_free_string`.
#[no_mangle]
pub unsafe extern "C" fn observer_fetch(
    handle: *mut ObserverHandle,
    request_json: *const c_char,
) -> *mut c_char {
    guarded(ptr::null_mut(), || {
        clear_last_error();

        if handle.is_null() {
            set_last_error("Null observer pointer");
            return ptr::null_mut();
        }
        let handle = &*handle;

        let request = match cstr_to_string(request_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid request JSON string pointer");
                return ptr::null_mut();
            }
        };

        match handle.fetch(&request) {
            Ok(response) => string_to_cstr(&response),
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        }
    })
}

/// Detach the observer, waiting briefly for in-flight sends.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `observer_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn observer_free(handle: *mut ObserverHandle) {
    guarded((), || {
        if !handle.is_null() {
            Box::from_raw(handle).close();
        }
    })
}

// ============================================================================
// Stateless helpers
// ============================================================================

/// Label a click target the way `button_click` events do.
///
/// Returns NULL with no error set when the target is not a tracked control.
///
/// # Safety
/// - `target_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with
///   `observer_free_string`.
#[no_mangle]
pub unsafe extern "C" fn observer_describe_click(target_json: *const c_char) -> *mut c_char {
    guarded(ptr::null_mut(), || {
        clear_last_error();

        let json = match cstr_to_string(target_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid target JSON string pointer");
                return ptr::null_mut();
            }
        };

        match serde_json::from_str::<ClickTarget>(&json) {
            Ok(target) => match describe_click(&target) {
                Some(label) => string_to_cstr(&label),
                None => ptr::null_mut(),
            },
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        }
    })
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by observer functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an observer function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn observer_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string, or NULL if the last
///   call succeeded.
/// - The returned pointer is valid until the next observer call on this thread.
#[no_mangle]
pub unsafe extern "C" fn observer_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string; do not free.
#[no_mangle]
pub unsafe extern "C" fn observer_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
