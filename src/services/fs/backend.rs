use async_trait::async_trait;
use std::io;
use std::time::SystemTime;

/// Metadata about a filesystem entry
#[derive(Debug, Clone, Default)]
pub struct FsMetadata {
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub is_dir: bool,
}

impl FsMetadata {
    pub fn file(size: u64) -> Self {
        Self {
            size,
            modified: None,
            is_dir: false,
        }
    }

    pub fn directory() -> Self {
        Self {
            size: 0,
            modified: None,
            is_dir: true,
        }
    }

    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }
}

/// Async filesystem backend trait
///
/// Every location handed to a backend is the string form the editor uses for
/// the document (a plain path, `ftp://...`, `content://...`), so the preview
/// server can address local disk, FTP, SFTP and content providers uniformly.
/// Operations are async because most non-local backends are network bound.
#[async_trait]
pub trait FsBackend: Send + Sync {
    /// Check if the location exists
    async fn exists(&self, location: &str) -> bool;

    /// Get metadata for a single location
    ///
    /// # Errors
    ///
    /// Returns an error if the location does not exist or cannot be inspected.
    async fn stat(&self, location: &str) -> io::Result<FsMetadata>;

    /// Read the full contents of a file
    async fn read_file(&self, location: &str) -> io::Result<Vec<u8>>;

    /// Replace the contents of an existing file, creating it if needed
    async fn write_file(&self, location: &str, contents: &[u8]) -> io::Result<()>;

    /// Create a new file named `name` inside `dir`, returning its location
    async fn create_file(&self, dir: &str, name: &str, contents: &[u8]) -> io::Result<String>;

    /// Create a directory named `name` inside `dir`, returning its location
    async fn create_directory(&self, dir: &str, name: &str) -> io::Result<String>;
}

/// Join a directory location and a child name
pub(crate) fn child_location(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}
