//! Request descriptors delivered by the transport

use crate::primitives::uri::decode_component;
use std::fmt;

/// Opaque id correlating a request with its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One incoming request: the id to answer with and the raw request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub request_id: RequestId,
    pub raw_path: String,
}

impl RequestDescriptor {
    pub fn new(request_id: RequestId, raw_path: impl Into<String>) -> Self {
        Self {
            request_id,
            raw_path: raw_path.into(),
        }
    }

    /// Routing form of the path: no query or fragment, percent-decoded, no
    /// leading slash, directories mapped to their `index.html`.
    pub fn normalized_path(&self) -> String {
        normalize_request_path(&self.raw_path)
    }
}

pub fn normalize_request_path(raw: &str) -> String {
    let path = raw.split(['?', '#']).next().unwrap_or_default();
    let path = decode_component(path).unwrap_or_else(|| path.to_string());
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return "index.html".to_string();
    }
    if trimmed.ends_with('/') {
        return format!("{trimmed}index.html");
    }
    trimmed.to_string()
}
