//! Write-through cache for content that cannot be served straight from disk
//!
//! Each remote or provider URI maps to a stable file name (a hash of the URI
//! plus its original extension) under one cache directory. Entries are never
//! expired; a later fetch of the same URI overwrites its file in place.

use crate::primitives::mime;
use crate::services::fs::{FsBackend, LocalFsBackend};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Generate a stable hash for a URI (used as the cache file stem)
pub fn uri_hash(uri: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(uri.as_bytes());
    // Use first 16 chars for brevity
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Cache directory manager
pub struct RemoteCache {
    cache_dir: PathBuf,
    fs: Arc<dyn FsBackend>,
}

impl std::fmt::Debug for RemoteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCache")
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

impl RemoteCache {
    /// Cache in the platform cache directory
    pub fn new() -> Self {
        Self::with_dir(Self::default_dir())
    }

    /// Cache in a custom directory (for testing and configuration overrides)
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            fs: Arc::new(LocalFsBackend::new()),
        }
    }

    /// `$XDG_CACHE_HOME/preview/remote`, or the temp dir when no cache dir exists
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("preview")
            .join("remote")
    }

    /// Path of the cache entry for `uri`, whether or not it exists yet
    pub fn entry_path(&self, uri: &str) -> PathBuf {
        let stem = uri_hash(uri);
        match mime::extension(uri) {
            Some(extension) => self.cache_dir.join(format!("{stem}.{extension}")),
            None => self.cache_dir.join(stem),
        }
    }

    /// Write `contents` as the cache entry for `uri`, creating the cache
    /// directory if absent and overwriting a previous entry.
    pub async fn store(&self, uri: &str, contents: &[u8]) -> io::Result<PathBuf> {
        self.ensure_dir().await?;

        let path = self.entry_path(uri);
        let location = path.to_string_lossy().to_string();
        if self.fs.exists(&location).await {
            self.fs.write_file(&location, contents).await?;
        } else {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            self.fs
                .create_file(&self.cache_dir.to_string_lossy(), &name, contents)
                .await?;
        }
        tracing::debug!("Cached {} as {:?}", uri, path);
        Ok(path)
    }

    async fn ensure_dir(&self) -> io::Result<()> {
        let location = self.cache_dir.to_string_lossy().to_string();
        if self.fs.exists(&location).await {
            return Ok(());
        }
        let (Some(parent), Some(name)) = (self.cache_dir.parent(), self.cache_dir.file_name())
        else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid cache directory {:?}", self.cache_dir),
            ));
        };
        self.fs
            .create_directory(&parent.to_string_lossy(), &name.to_string_lossy())
            .await?;
        Ok(())
    }
}

impl Default for RemoteCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_uri_hash_is_stable() {
        let hash = uri_hash("sftp://host/www/a.css");
        assert_eq!(hash.len(), 16);
        assert_eq!(hash, uri_hash("sftp://host/www/a.css"));
        assert_ne!(hash, uri_hash("sftp://host/www/b.css"));
    }

    #[test]
    fn test_entry_path_keeps_extension() {
        let cache = RemoteCache::with_dir(PathBuf::from("/tmp/cache"));
        let path = cache.entry_path("ftp://host/site/logo.PNG?x=1");
        assert_eq!(path.extension().unwrap(), "png");
        assert!(path.starts_with("/tmp/cache"));
    }

    #[tokio::test]
    async fn test_store_creates_dir_and_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let cache = RemoteCache::with_dir(temp_dir.path().join("nested").join("cache"));

        let path = cache.store("ftp://h/a.txt", b"one").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"one");

        let again = cache.store("ftp://h/a.txt", b"two").await.unwrap();
        assert_eq!(path, again);
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
    }
}
