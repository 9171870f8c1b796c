//! HTTP transport collaborator
//!
//! The preview core never touches sockets. A [`Transport`] binds a port and
//! hands back a [`ServerHandle`]; the router installs one request handler on it
//! and answers each request by id through [`ServerHandle::send`].

#[cfg(feature = "runtime")]
pub mod http;

#[cfg(feature = "runtime")]
pub use http::TinyHttpTransport;

use crate::model::request::{RequestDescriptor, RequestId};
use crate::model::response::Response;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Callback invoked once per incoming request
pub type RequestHandler = Arc<dyn Fn(RequestDescriptor) + Send + Sync>;

/// Why a port could not be bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// This transport already listens on the port
    AlreadyOwned(u16),
    /// Another process holds the port
    InUse(u16),
    /// Any other bind failure
    Other { port: u16, message: String },
}

impl BindError {
    pub fn port(&self) -> u16 {
        match self {
            BindError::AlreadyOwned(port) | BindError::InUse(port) => *port,
            BindError::Other { port, .. } => *port,
        }
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::AlreadyOwned(port) => write!(f, "Port {port} is already served by this process"),
            BindError::InUse(port) => write!(f, "Port {port} is in use"),
            BindError::Other { port, message } => write!(f, "Failed to bind port {port}: {message}"),
        }
    }
}

impl std::error::Error for BindError {}

/// A listening server
pub trait ServerHandle: Send + Sync {
    /// Port actually bound
    fn port(&self) -> u16;

    /// Install the request handler, replacing any previous one
    fn set_on_request_handler(&self, handler: RequestHandler);

    /// Answer a pending request. Fails if the id is unknown or already answered.
    fn send(&self, request_id: RequestId, response: Response) -> io::Result<()>;

    /// Stop accepting connections. Idempotent.
    fn stop(&self);
}

/// Factory for listening servers
pub trait Transport: Send + Sync {
    fn create_server(&self, port: u16) -> Result<Arc<dyn ServerHandle>, BindError>;

    /// The live server this transport already runs on `port`, if any
    fn existing_server(&self, port: u16) -> Option<Arc<dyn ServerHandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        assert_eq!(BindError::InUse(8158).to_string(), "Port 8158 is in use");
        let error = BindError::Other {
            port: 80,
            message: "permission denied".to_string(),
        };
        assert_eq!(error.port(), 80);
        assert!(error.to_string().contains("permission denied"));
    }
}
