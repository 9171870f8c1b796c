//! Slow filesystem backend for testing
//!
//! This module provides a decorator around any FsBackend that adds
//! configurable delays to simulate slow network filesystems, and counts
//! every call so tests can assert how many remote reads actually happened.

use super::backend::{FsBackend, FsMetadata};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Configuration for slow filesystem simulation
#[derive(Debug, Clone)]
pub struct SlowFsConfig {
    /// Delay for read_file operations
    pub read_delay: Duration,
    /// Delay for write_file/create_file/create_directory operations
    pub write_delay: Duration,
    /// Delay for exists/stat operations
    pub metadata_delay: Duration,
}

impl SlowFsConfig {
    /// Create a config with uniform delay for all operations
    pub fn uniform(delay: Duration) -> Self {
        Self {
            read_delay: delay,
            write_delay: delay,
            metadata_delay: delay,
        }
    }

    /// Create a config with no delays (useful as a baseline)
    pub fn none() -> Self {
        Self::uniform(Duration::ZERO)
    }

    /// Create a config simulating an FTP server on a slow link
    pub fn slow_network() -> Self {
        Self {
            read_delay: Duration::from_millis(500),
            write_delay: Duration::from_millis(300),
            metadata_delay: Duration::from_millis(50),
        }
    }
}

impl Default for SlowFsConfig {
    fn default() -> Self {
        Self::none()
    }
}

/// Metrics tracking for filesystem operations
#[derive(Debug, Clone, Default)]
pub struct BackendMetrics {
    pub exists_calls: usize,
    pub stat_calls: usize,
    pub read_calls: usize,
    pub write_calls: usize,
    pub create_calls: usize,
    /// Total time spent in artificial delays
    pub total_delay_time: Duration,
}

impl BackendMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all metrics to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Get total number of filesystem calls
    pub fn total_calls(&self) -> usize {
        self.exists_calls + self.stat_calls + self.read_calls + self.write_calls + self.create_calls
    }
}

/// Slow filesystem backend wrapper for testing
///
/// Wraps any FsBackend implementation and adds configurable delays to each
/// operation. Also tracks metrics about operation counts and timing.
pub struct SlowFsBackend {
    inner: Arc<dyn FsBackend>,
    config: SlowFsConfig,
    metrics: Arc<Mutex<BackendMetrics>>,
}

impl SlowFsBackend {
    pub fn new(inner: Arc<dyn FsBackend>, config: SlowFsConfig) -> Self {
        Self {
            inner,
            config,
            metrics: Arc::new(Mutex::new(BackendMetrics::new())),
        }
    }

    /// Create with uniform delay for all operations
    pub fn with_uniform_delay(inner: Arc<dyn FsBackend>, delay: Duration) -> Self {
        Self::new(inner, SlowFsConfig::uniform(delay))
    }

    /// Get a snapshot of current metrics
    pub async fn metrics(&self) -> BackendMetrics {
        self.metrics.lock().await.clone()
    }

    pub async fn reset_metrics(&self) {
        self.metrics.lock().await.reset();
    }

    async fn add_delay(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
            self.metrics.lock().await.total_delay_time += delay;
        }
    }
}

#[async_trait]
impl FsBackend for SlowFsBackend {
    async fn exists(&self, location: &str) -> bool {
        self.add_delay(self.config.metadata_delay).await;
        self.metrics.lock().await.exists_calls += 1;
        self.inner.exists(location).await
    }

    async fn stat(&self, location: &str) -> io::Result<FsMetadata> {
        self.add_delay(self.config.metadata_delay).await;
        self.metrics.lock().await.stat_calls += 1;
        self.inner.stat(location).await
    }

    async fn read_file(&self, location: &str) -> io::Result<Vec<u8>> {
        self.metrics.lock().await.read_calls += 1;
        self.add_delay(self.config.read_delay).await;
        self.inner.read_file(location).await
    }

    async fn write_file(&self, location: &str, contents: &[u8]) -> io::Result<()> {
        self.add_delay(self.config.write_delay).await;
        self.metrics.lock().await.write_calls += 1;
        self.inner.write_file(location, contents).await
    }

    async fn create_file(&self, dir: &str, name: &str, contents: &[u8]) -> io::Result<String> {
        self.add_delay(self.config.write_delay).await;
        self.metrics.lock().await.create_calls += 1;
        self.inner.create_file(dir, name, contents).await
    }

    async fn create_directory(&self, dir: &str, name: &str) -> io::Result<String> {
        self.add_delay(self.config.write_delay).await;
        self.metrics.lock().await.create_calls += 1;
        self.inner.create_directory(dir, name).await
    }
}
