//! Materialization of non-local content
//!
//! Remote and provider-backed documents are copied into a local cache before
//! they are served. [`FetchSerializer`] keeps those reads one at a time per
//! session; [`RemoteCache`] owns the on-disk layout.

pub mod cache;
pub mod serializer;

pub use cache::{uri_hash, RemoteCache};
pub use serializer::{FetchOutcome, FetchSerializer, PendingFetch, ReplyFuture, ServeStatus};
