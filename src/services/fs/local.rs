//! Local filesystem backend built on `tokio::fs`

use super::backend::{child_location, FsBackend, FsMetadata};
use crate::primitives::uri::ParsedUri;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;

/// Backend for plain paths and `file://` URIs
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFsBackend;

impl LocalFsBackend {
    pub fn new() -> Self {
        Self
    }

    /// Map a location to a local path. Non-`file` schemes are rejected.
    pub fn to_path(location: &str) -> io::Result<PathBuf> {
        match ParsedUri::parse(location) {
            ParsedUri::File { path } => Ok(PathBuf::from(path)),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a local path: {}", other.without_query()),
            )),
        }
    }
}

#[async_trait]
impl FsBackend for LocalFsBackend {
    async fn exists(&self, location: &str) -> bool {
        match Self::to_path(location) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn stat(&self, location: &str) -> io::Result<FsMetadata> {
        let metadata = tokio::fs::metadata(Self::to_path(location)?).await?;
        let mut result = if metadata.is_dir() {
            FsMetadata::directory()
        } else {
            FsMetadata::file(metadata.len())
        };
        if let Ok(modified) = metadata.modified() {
            result = result.with_modified(modified);
        }
        Ok(result)
    }

    async fn read_file(&self, location: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(Self::to_path(location)?).await
    }

    async fn write_file(&self, location: &str, contents: &[u8]) -> io::Result<()> {
        tokio::fs::write(Self::to_path(location)?, contents).await
    }

    async fn create_file(&self, dir: &str, name: &str, contents: &[u8]) -> io::Result<String> {
        let location = child_location(dir, name);
        let path = Self::to_path(&location)?;
        if tokio::fs::try_exists(&path).await? {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            ));
        }
        tokio::fs::write(&path, contents).await?;
        Ok(location)
    }

    async fn create_directory(&self, dir: &str, name: &str) -> io::Result<String> {
        let location = child_location(dir, name);
        tokio::fs::create_dir_all(Self::to_path(&location)?).await?;
        Ok(location)
    }
}
