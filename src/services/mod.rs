//! Asynchronous services and external collaborators
//!
//! Filesystem access, remote fetching, the HTTP transport and browser launch
//! live here; the request core in `app` only talks to them through traits.

pub mod fetch;
pub mod fs;
pub mod launcher;
pub mod log_dirs;
pub mod transport;

#[cfg(feature = "runtime")]
pub mod tracing_setup;
