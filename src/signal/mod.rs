//! page.signal.v1 recordings
//!
//! A recording captures one page load (the page as it looked on
//! document-ready plus the signals that followed, with their time offsets)
//! so the observer can be driven offline, from the CLI or from tests.

mod adapter;
mod recorded;

pub use adapter::*;
pub use recorded::*;
