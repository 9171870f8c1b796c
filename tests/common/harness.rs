#![allow(dead_code)]

//! In-memory transport and launcher that record everything the preview
//! server does, so lifecycle and routing can be driven without sockets.

use preview::config::PreviewConfig;
use preview::model::request::{RequestDescriptor, RequestId};
use preview::model::response::Response;
use preview::model::session::TargetMode;
use preview::services::launcher::BrowserLauncher;
use preview::services::transport::{BindError, RequestHandler, ServerHandle, Transport};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long a test waits for the router to answer a request
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A server created by [`RecordingTransport`]
pub struct RecordingHandle {
    port: u16,
    handler: Mutex<Option<RequestHandler>>,
    responses: Mutex<HashMap<RequestId, Response>>,
    next_id: AtomicU64,
    stopped: AtomicBool,
}

impl RecordingHandle {
    fn new(port: u16) -> Self {
        Self {
            port,
            handler: Mutex::new(None),
            responses: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    /// Deliver a request to the installed handler without waiting
    pub fn deliver(&self, raw_path: &str) -> RequestId {
        let request_id = RequestId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let handler = self
            .handler
            .lock()
            .unwrap()
            .clone()
            .expect("no request handler installed");
        handler(RequestDescriptor::new(request_id, raw_path));
        request_id
    }

    /// Wait until the response for `request_id` has been sent
    pub async fn response(&self, request_id: RequestId) -> Response {
        let deadline = tokio::time::Instant::now() + RESPONSE_TIMEOUT;
        loop {
            if let Some(response) = self.responses.lock().unwrap().remove(&request_id) {
                return response;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "no response for request {request_id}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Deliver a request and wait for its response
    pub async fn get(&self, raw_path: &str) -> Response {
        let request_id = self.deliver(raw_path);
        self.response(request_id).await
    }
}

impl ServerHandle for RecordingHandle {
    fn port(&self) -> u16 {
        self.port
    }

    fn set_on_request_handler(&self, handler: RequestHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    fn send(&self, request_id: RequestId, response: Response) -> io::Result<()> {
        let mut responses = self.responses.lock().unwrap();
        if responses.contains_key(&request_id) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("request {request_id} already answered"),
            ));
        }
        responses.insert(request_id, response);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.handler.lock().unwrap().take();
    }
}

/// Transport whose ports can be marked busy (foreign process) or owned
#[derive(Default)]
pub struct RecordingTransport {
    busy: Mutex<HashSet<u16>>,
    servers: Mutex<Vec<Arc<RecordingHandle>>>,
    attempts: Mutex<Vec<u16>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: ports held by another process
    pub fn with_busy_ports(self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.busy.lock().unwrap().extend(ports);
        self
    }

    /// Every port `create_server` was asked for, in order
    pub fn attempts(&self) -> Vec<u16> {
        self.attempts.lock().unwrap().clone()
    }

    /// Most recently created server
    pub fn last_server(&self) -> Option<Arc<RecordingHandle>> {
        self.servers.lock().unwrap().last().cloned()
    }

    pub fn server_count(&self) -> usize {
        self.servers.lock().unwrap().len()
    }

    /// Servers that have not been stopped
    pub fn live_servers(&self) -> usize {
        self.servers
            .lock()
            .unwrap()
            .iter()
            .filter(|server| !server.is_stopped())
            .count()
    }
}

impl Transport for RecordingTransport {
    fn create_server(&self, port: u16) -> Result<Arc<dyn ServerHandle>, BindError> {
        self.attempts.lock().unwrap().push(port);
        if self.busy.lock().unwrap().contains(&port) {
            return Err(BindError::InUse(port));
        }

        let mut servers = self.servers.lock().unwrap();
        if servers
            .iter()
            .any(|server| server.port == port && !server.is_stopped())
        {
            return Err(BindError::AlreadyOwned(port));
        }
        let handle = Arc::new(RecordingHandle::new(port));
        servers.push(handle.clone());
        Ok(handle)
    }

    fn existing_server(&self, port: u16) -> Option<Arc<dyn ServerHandle>> {
        self.servers
            .lock()
            .unwrap()
            .iter()
            .find(|server| server.port == port && !server.is_stopped())
            .map(|server| server.clone() as Arc<dyn ServerHandle>)
    }
}

/// Launcher that remembers every URL it was asked to show
#[derive(Default)]
pub struct RecordingLauncher {
    launches: Mutex<Vec<(String, TargetMode)>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launches(&self) -> Vec<(String, TargetMode)> {
        self.launches.lock().unwrap().clone()
    }

    pub fn last_url(&self) -> Option<String> {
        self.launches.lock().unwrap().last().map(|(url, _)| url.clone())
    }
}

impl BrowserLauncher for RecordingLauncher {
    fn launch(&self, url: &str, mode: TargetMode) -> io::Result<()> {
        self.launches.lock().unwrap().push((url.to_string(), mode));
        Ok(())
    }
}

/// Default configuration with the fetch cache kept under `dir`
pub fn test_config(dir: &Path) -> PreviewConfig {
    PreviewConfig {
        cache_dir: Some(dir.join(".preview-cache")),
        ..PreviewConfig::default()
    }
}
