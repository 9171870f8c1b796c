use super::cache::RemoteCache;
use crate::model::request::RequestId;
use crate::primitives::uri::{ParsedUri, UriScheme};
use crate::services::fs::{Filesystems, LocalFsBackend};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::sync::Mutex;

/// Future returned by a fetch continuation
pub type ReplyFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

type FetchReply = Box<dyn FnOnce(FetchOutcome) -> ReplyFuture + Send>;

/// Result of materializing one URI
#[derive(Debug)]
pub enum FetchOutcome {
    /// Content is available at this local path
    Ready(PathBuf),
    /// The read failed; the request should be answered with a 404
    Failed(io::Error),
}

/// A queued fetch: the URI to materialize and the continuation that answers
/// the request once the content is local
pub struct PendingFetch {
    pub uri: String,
    pub request_id: RequestId,
    reply: FetchReply,
}

impl fmt::Debug for PendingFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingFetch")
            .field("uri", &self.uri)
            .field("request_id", &self.request_id)
            .finish()
    }
}

impl PendingFetch {
    pub fn new<F, Fut>(uri: impl Into<String>, request_id: RequestId, reply: F) -> Self
    where
        F: FnOnce(FetchOutcome) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            uri: uri.into(),
            request_id,
            reply: Box::new(move |outcome| Box::pin(reply(outcome))),
        }
    }
}

/// What `serve` did with a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeStatus {
    /// The fetch ran (along with everything queued behind it)
    Completed,
    /// Another fetch was in flight; this one was queued at the given position
    Queued(usize),
}

#[derive(Debug, Default)]
struct QueueState {
    in_flight: Option<RequestId>,
    pending: VecDeque<PendingFetch>,
    /// URIs already materialized in this session
    materialized: HashMap<String, PathBuf>,
}

/// One-at-a-time fetcher for non-local content
///
/// At most one remote read is in flight per session. Requests arriving while a
/// fetch runs are queued and executed in FIFO order by the task that owns the
/// in-flight slot, so overlapping requests for the same remote file cost one
/// network round-trip and never race on the cache file.
pub struct FetchSerializer {
    filesystems: Filesystems,
    cache: RemoteCache,
    state: Mutex<QueueState>,
}

impl fmt::Debug for FetchSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchSerializer")
            .field("filesystems", &self.filesystems)
            .field("cache", &self.cache)
            .field("state", &"<mutex>")
            .finish()
    }
}

impl FetchSerializer {
    pub fn new(filesystems: Filesystems, cache: RemoteCache) -> Self {
        Self {
            filesystems,
            cache,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn cache(&self) -> &RemoteCache {
        &self.cache
    }

    /// Materialize `fetch.uri` locally and run its continuation.
    ///
    /// If a fetch is already in flight the request is queued and this returns
    /// immediately; otherwise the caller drives the fetch and then drains the
    /// queue one entry at a time.
    pub async fn serve(&self, fetch: PendingFetch) -> ServeStatus {
        {
            let mut state = self.state.lock().await;
            if let Some(current) = state.in_flight {
                tracing::debug!(
                    "Fetch for {} in flight, queueing {} ({})",
                    current,
                    fetch.request_id,
                    fetch.uri
                );
                state.pending.push_back(fetch);
                return ServeStatus::Queued(state.pending.len());
            }
            state.in_flight = Some(fetch.request_id);
        }

        let mut next = Some(fetch);
        while let Some(fetch) = next.take() {
            let outcome = match self.materialize(&fetch.uri).await {
                Ok(path) => FetchOutcome::Ready(path),
                Err(error) => {
                    tracing::warn!("Failed to fetch {}: {}", fetch.uri, error);
                    FetchOutcome::Failed(error)
                }
            };
            (fetch.reply)(outcome).await;

            let mut state = self.state.lock().await;
            next = state.pending.pop_front();
            state.in_flight = next.as_ref().map(|fetch| fetch.request_id);
        }
        ServeStatus::Completed
    }

    pub async fn is_busy(&self) -> bool {
        self.state.lock().await.in_flight.is_some()
    }

    /// Produce a local path holding the content of `uri`
    async fn materialize(&self, uri: &str) -> io::Result<PathBuf> {
        let scheme = ParsedUri::parse(uri).scheme();
        match scheme {
            UriScheme::File => return LocalFsBackend::to_path(uri),
            UriScheme::Content | UriScheme::TermuxDocument => {
                if let Some(path) = self.filesystems.uri_formatter().to_local_path(uri).await {
                    return Ok(path);
                }
            }
            _ => {}
        }

        if let Some(path) = self.cached(uri).await {
            tracing::debug!("Serving {} from cache {:?}", uri, path);
            return Ok(path);
        }

        let backend = self.filesystems.backend_for(uri).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                format!("no filesystem registered for {uri}"),
            )
        })?;
        let contents = backend.read_file(uri).await?;
        let path = self.cache.store(uri, &contents).await?;

        self.state
            .lock()
            .await
            .materialized
            .insert(uri.to_string(), path.clone());
        Ok(path)
    }

    async fn cached(&self, uri: &str) -> Option<PathBuf> {
        let path = self.state.lock().await.materialized.get(uri).cloned()?;
        tokio::fs::try_exists(&path)
            .await
            .unwrap_or(false)
            .then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fs::{FsBackend, MemoryFsBackend, SlowFsBackend, UriFormatter};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn serializer_with(backend: Arc<dyn FsBackend>, temp_dir: &TempDir) -> FetchSerializer {
        let filesystems = Filesystems::default()
            .with_backend(UriScheme::Ftp, backend.clone())
            .with_backend(UriScheme::Sftp, backend.clone())
            .with_backend(UriScheme::Other, backend);
        FetchSerializer::new(filesystems, RemoteCache::with_dir(temp_dir.path().join("cache")))
    }

    fn recording_fetch(
        uri: &str,
        id: u64,
        tx: mpsc::UnboundedSender<(RequestId, Result<Vec<u8>, io::ErrorKind>)>,
    ) -> PendingFetch {
        let request_id = RequestId(id);
        PendingFetch::new(uri, request_id, move |outcome| async move {
            let result = match outcome {
                FetchOutcome::Ready(path) => Ok(std::fs::read(path).unwrap()),
                FetchOutcome::Failed(error) => Err(error.kind()),
            };
            tx.send((request_id, result)).unwrap();
        })
    }

    #[tokio::test]
    async fn test_overlapping_requests_share_one_remote_read() {
        let temp_dir = TempDir::new().unwrap();
        let memory = Arc::new(MemoryFsBackend::new().with_file("ftp://h/a.txt", "alpha"));
        let slow = Arc::new(SlowFsBackend::with_uniform_delay(
            memory,
            Duration::from_millis(30),
        ));
        let serializer = serializer_with(slow.clone(), &temp_dir);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let (first, second) = tokio::join!(
            serializer.serve(recording_fetch("ftp://h/a.txt", 1, tx.clone())),
            serializer.serve(recording_fetch("ftp://h/a.txt", 2, tx.clone())),
        );
        assert_eq!(first, ServeStatus::Completed);
        assert_eq!(second, ServeStatus::Queued(1));

        let (id_a, body_a) = rx.recv().await.unwrap();
        let (id_b, body_b) = rx.recv().await.unwrap();
        assert_eq!((id_a, id_b), (RequestId(1), RequestId(2)));
        assert_eq!(body_a.unwrap(), b"alpha");
        assert_eq!(body_b.unwrap(), b"alpha");
        assert_eq!(slow.metrics().await.read_calls, 1);
        assert!(!serializer.is_busy().await);
    }

    #[tokio::test]
    async fn test_failed_read_does_not_block_queue() {
        let temp_dir = TempDir::new().unwrap();
        let memory = Arc::new(
            MemoryFsBackend::new()
                .with_file("sftp://h/a.txt", "alpha")
                .with_failing_read("sftp://h/a.txt"),
        );
        let slow = Arc::new(SlowFsBackend::with_uniform_delay(
            memory,
            Duration::from_millis(10),
        ));
        let serializer = serializer_with(slow.clone(), &temp_dir);
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::join!(
            serializer.serve(recording_fetch("sftp://h/a.txt", 1, tx.clone())),
            serializer.serve(recording_fetch("sftp://h/a.txt", 2, tx.clone())),
        );

        let (_, first) = rx.recv().await.unwrap();
        let (_, second) = rx.recv().await.unwrap();
        assert_eq!(first.unwrap_err(), io::ErrorKind::ConnectionRefused);
        assert_eq!(second.unwrap_err(), io::ErrorKind::ConnectionRefused);
        // The queued request made its own attempt
        assert_eq!(slow.metrics().await.read_calls, 2);
    }

    #[tokio::test]
    async fn test_fifo_order_across_uris() {
        let temp_dir = TempDir::new().unwrap();
        let memory = Arc::new(
            MemoryFsBackend::new()
                .with_file("ftp://h/1.txt", "1")
                .with_file("ftp://h/2.txt", "2")
                .with_file("ftp://h/3.txt", "3"),
        );
        let slow = Arc::new(SlowFsBackend::with_uniform_delay(
            memory,
            Duration::from_millis(5),
        ));
        let serializer = serializer_with(slow, &temp_dir);
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::join!(
            serializer.serve(recording_fetch("ftp://h/1.txt", 1, tx.clone())),
            serializer.serve(recording_fetch("ftp://h/2.txt", 2, tx.clone())),
            serializer.serve(recording_fetch("ftp://h/3.txt", 3, tx.clone())),
        );
        drop(tx);

        let mut order = Vec::new();
        while let Some((id, body)) = rx.recv().await {
            assert_eq!(body.unwrap(), id.0.to_string().into_bytes());
            order.push(id.0);
        }
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_other_schemes_write_through_cache() {
        let temp_dir = TempDir::new().unwrap();
        let memory = Arc::new(MemoryFsBackend::new().with_file("https://cdn/x.js", "x()"));
        let serializer = serializer_with(memory, &temp_dir);
        let (tx, mut rx) = mpsc::unbounded_channel();

        serializer
            .serve(recording_fetch("https://cdn/x.js", 7, tx))
            .await;
        let (_, body) = rx.recv().await.unwrap();
        assert_eq!(body.unwrap(), b"x()");

        let entry = serializer.cache().entry_path("https://cdn/x.js");
        assert_eq!(std::fs::read(entry).unwrap(), b"x()");
    }

    #[tokio::test]
    async fn test_unregistered_scheme_fails() {
        let temp_dir = TempDir::new().unwrap();
        let serializer = FetchSerializer::new(
            Filesystems::default(),
            RemoteCache::with_dir(temp_dir.path().to_path_buf()),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        serializer
            .serve(recording_fetch("ftp://h/a.txt", 1, tx))
            .await;
        let (_, body) = rx.recv().await.unwrap();
        assert_eq!(body.unwrap_err(), io::ErrorKind::Unsupported);
    }

    struct FixedFormatter(PathBuf);

    #[async_trait]
    impl UriFormatter for FixedFormatter {
        async fn to_local_path(&self, _uri: &str) -> Option<PathBuf> {
            Some(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_content_uris_use_formatter() {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("page.html");
        std::fs::write(&local, "<p>provider</p>").unwrap();

        let filesystems =
            Filesystems::default().with_uri_formatter(Arc::new(FixedFormatter(local.clone())));
        let serializer =
            FetchSerializer::new(filesystems, RemoteCache::with_dir(temp_dir.path().join("c")));
        let (tx, mut rx) = mpsc::unbounded_channel();

        serializer
            .serve(recording_fetch(
                "content://com.android.providers/document/42",
                1,
                tx,
            ))
            .await;
        let (_, body) = rx.recv().await.unwrap();
        assert_eq!(body.unwrap(), b"<p>provider</p>");
    }
}
