//! In-memory filesystem backend
//!
//! Stands in for network filesystems (FTP, SFTP, content providers) when no
//! real client is wired up, and lets tests script failures per location.

use super::backend::{child_location, FsBackend, FsMetadata};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<String, Vec<u8>>,
    directories: HashSet<String>,
    failing: HashSet<String>,
}

/// Filesystem kept entirely in memory, keyed by location string
#[derive(Debug, Default)]
pub struct MemoryFsBackend {
    state: Mutex<MemoryState>,
}

impl MemoryFsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a file
    pub fn with_file(mut self, location: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.state
            .get_mut()
            .files
            .insert(location.to_string(), contents.into());
        self
    }

    /// Builder: make every read of `location` fail with a connection error
    pub fn with_failing_read(mut self, location: &str) -> Self {
        self.state.get_mut().failing.insert(location.to_string());
        self
    }

    /// Stop failing reads of `location`
    pub async fn heal(&self, location: &str) {
        self.state.lock().await.failing.remove(location);
    }

    /// Snapshot of a stored file, bypassing failure injection
    pub async fn contents(&self, location: &str) -> Option<Vec<u8>> {
        self.state.lock().await.files.get(location).cloned()
    }
}

fn not_found(location: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{location} not found"))
}

#[async_trait]
impl FsBackend for MemoryFsBackend {
    async fn exists(&self, location: &str) -> bool {
        let state = self.state.lock().await;
        state.files.contains_key(location) || state.directories.contains(location)
    }

    async fn stat(&self, location: &str) -> io::Result<FsMetadata> {
        let state = self.state.lock().await;
        if let Some(contents) = state.files.get(location) {
            return Ok(FsMetadata::file(contents.len() as u64));
        }
        if state.directories.contains(location) {
            return Ok(FsMetadata::directory());
        }
        Err(not_found(location))
    }

    async fn read_file(&self, location: &str) -> io::Result<Vec<u8>> {
        let state = self.state.lock().await;
        if state.failing.contains(location) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("failed to read {location}"),
            ));
        }
        state
            .files
            .get(location)
            .cloned()
            .ok_or_else(|| not_found(location))
    }

    async fn write_file(&self, location: &str, contents: &[u8]) -> io::Result<()> {
        self.state
            .lock()
            .await
            .files
            .insert(location.to_string(), contents.to_vec());
        Ok(())
    }

    async fn create_file(&self, dir: &str, name: &str, contents: &[u8]) -> io::Result<String> {
        let location = child_location(dir, name);
        let mut state = self.state.lock().await;
        if state.files.contains_key(&location) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{location} already exists"),
            ));
        }
        state.files.insert(location.clone(), contents.to_vec());
        Ok(location)
    }

    async fn create_directory(&self, dir: &str, name: &str) -> io::Result<String> {
        let location = child_location(dir, name);
        self.state.lock().await.directories.insert(location.clone());
        Ok(location)
    }
}
