// Filesystem abstraction layer for async, pluggable file system access
//
// The preview server never talks to disks or network servers directly: every
// read goes through an FsBackend chosen by the location's scheme.

pub mod backend;
pub mod local;
pub mod memory;
pub mod slow;

pub use backend::{FsBackend, FsMetadata};
pub use local::LocalFsBackend;
pub use memory::MemoryFsBackend;
pub use slow::{BackendMetrics, SlowFsBackend, SlowFsConfig};

use crate::primitives::uri::{ParsedUri, UriScheme};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Converts Android `content://` URIs into stable filesystem-backed paths
/// (the platform's document URI formatting service).
#[async_trait]
pub trait UriFormatter: Send + Sync {
    /// Local path that backs `uri`, or `None` when the provider has no
    /// filesystem representation.
    async fn to_local_path(&self, uri: &str) -> Option<PathBuf>;
}

/// Formatter for platforms without content providers
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUriFormatter;

#[async_trait]
impl UriFormatter for NoUriFormatter {
    async fn to_local_path(&self, _uri: &str) -> Option<PathBuf> {
        None
    }
}

/// Backends keyed by scheme family, with local disk always available
#[derive(Clone)]
pub struct Filesystems {
    local: Arc<dyn FsBackend>,
    by_scheme: HashMap<UriScheme, Arc<dyn FsBackend>>,
    formatter: Arc<dyn UriFormatter>,
}

impl fmt::Debug for Filesystems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<_> = self.by_scheme.keys().collect();
        schemes.sort_by_key(|scheme| format!("{scheme:?}"));
        f.debug_struct("Filesystems")
            .field("local", &"<dyn FsBackend>")
            .field("schemes", &schemes)
            .finish()
    }
}

impl Default for Filesystems {
    fn default() -> Self {
        Self::new(Arc::new(LocalFsBackend::new()))
    }
}

impl Filesystems {
    pub fn new(local: Arc<dyn FsBackend>) -> Self {
        Self {
            local,
            by_scheme: HashMap::new(),
            formatter: Arc::new(NoUriFormatter),
        }
    }

    /// Builder: register the backend used for a non-local scheme family
    pub fn with_backend(mut self, scheme: UriScheme, backend: Arc<dyn FsBackend>) -> Self {
        self.by_scheme.insert(scheme, backend);
        self
    }

    /// Builder: register the content URI formatting service
    pub fn with_uri_formatter(mut self, formatter: Arc<dyn UriFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn local(&self) -> &Arc<dyn FsBackend> {
        &self.local
    }

    pub fn uri_formatter(&self) -> &Arc<dyn UriFormatter> {
        &self.formatter
    }

    /// Backend able to address `location`, if one is registered
    pub fn backend_for(&self, location: &str) -> Option<&Arc<dyn FsBackend>> {
        match ParsedUri::parse(location).scheme() {
            UriScheme::File => Some(&self.local),
            // Termux trees are content URIs as far as providers are concerned
            UriScheme::TermuxDocument => self
                .by_scheme
                .get(&UriScheme::TermuxDocument)
                .or_else(|| self.by_scheme.get(&UriScheme::Content)),
            scheme => self.by_scheme.get(&scheme),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_lookup_by_scheme() {
        let remote: Arc<dyn FsBackend> = Arc::new(MemoryFsBackend::new());
        let filesystems = Filesystems::default()
            .with_backend(UriScheme::Sftp, remote.clone())
            .with_backend(UriScheme::Content, remote.clone());

        assert!(filesystems.backend_for("/tmp/a.html").is_some());
        assert!(filesystems.backend_for("sftp://h/a.html").is_some());
        assert!(filesystems.backend_for("ftp://h/a.html").is_none());
        assert!(filesystems
            .backend_for("content://com.termux.documents/tree/%2Fa::/a/b")
            .is_some());
    }

    #[tokio::test]
    async fn test_default_formatter_has_no_paths() {
        let filesystems = Filesystems::default();
        assert!(filesystems
            .uri_formatter()
            .to_local_path("content://media/external/1")
            .await
            .is_none());
    }
}
