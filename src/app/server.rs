//! Preview server lifecycle
//!
//! `Stopped → Starting → Listening → Stopped`. A new [`PreviewServer::run`]
//! always retires the previous server first, so at most one preview server
//! listens per [`PreviewServer`]. Binding walks up from the configured port
//! until it succeeds or `max_port_attempts` ports have been tried.

use super::resolver::ContentResolver;
use super::router::RequestRouter;
use crate::config::PreviewConfig;
use crate::model::documents::DocumentStore;
use crate::model::request::RequestDescriptor;
use crate::model::session::{ActiveDocument, PreviewSession, TargetMode};
use crate::primitives::path_resolver::ProjectRoot;
use crate::services::fetch::{FetchSerializer, RemoteCache};
use crate::services::fs::Filesystems;
use crate::services::launcher::BrowserLauncher;
use crate::services::transport::{BindError, RequestHandler, ServerHandle, Transport};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt;
use std::sync::Arc;

/// Characters escaped inside one URL path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting { port: u16 },
    Listening { port: u16 },
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// URL handed to the launcher
    pub url: String,
    pub port: u16,
    /// The port was already served by this process; its server now routes
    /// this run's session
    pub reused: bool,
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Every port in the retry window failed to bind
    PortsExhausted { first_port: u16, attempts: u16 },
    /// The launch URL could not be built
    InvalidUrl(String),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::PortsExhausted {
                first_port,
                attempts,
            } => write!(
                f,
                "No free port in {} attempts starting at {}",
                attempts, first_port
            ),
            RunError::InvalidUrl(msg) => write!(f, "Invalid preview URL: {msg}"),
        }
    }
}

impl std::error::Error for RunError {}

struct ActiveServer {
    handle: Arc<dyn ServerHandle>,
    router: Arc<RequestRouter>,
}

/// Owns the listening server of the current preview session
pub struct PreviewServer {
    config: PreviewConfig,
    transport: Arc<dyn Transport>,
    launcher: Arc<dyn BrowserLauncher>,
    documents: Arc<dyn DocumentStore>,
    filesystems: Filesystems,
    state: ServerState,
    active: Option<ActiveServer>,
}

impl fmt::Debug for PreviewServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewServer")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("session", &self.session())
            .finish()
    }
}

impl PreviewServer {
    pub fn new(
        config: PreviewConfig,
        transport: Arc<dyn Transport>,
        launcher: Arc<dyn BrowserLauncher>,
        documents: Arc<dyn DocumentStore>,
        filesystems: Filesystems,
    ) -> Self {
        Self {
            config,
            transport,
            launcher,
            documents,
            filesystems,
            state: ServerState::Stopped,
            active: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    /// Session of the listening server
    pub fn session(&self) -> Option<&PreviewSession> {
        self.active.as_ref().map(|active| active.router.session())
    }

    /// Start previewing `location`, replacing any running preview.
    ///
    /// `root` is the opened project folder, if any; a root that does not
    /// contain the document is ignored (single-file preview).
    pub async fn run(&mut self, location: &str, root: Option<&str>) -> Result<RunOutcome, RunError> {
        self.stop();

        let active = ActiveDocument::from_location(location);
        let is_script = active.extension().as_deref() == Some("js");
        let mode = self.config.preview_mode.target_for(is_script);
        let session = PreviewSession::new(mode, active, root.map(ProjectRoot::new));
        tracing::info!(
            "Starting {:?} preview of {} (session {})",
            mode,
            location,
            session.token()
        );

        let first_port = self.config.port;
        let attempts = self.config.max_port_attempts.max(1);
        for offset in 0..attempts {
            let Some(port) = first_port.checked_add(offset) else {
                break;
            };
            self.state = ServerState::Starting { port };

            match self.transport.create_server(port) {
                Ok(handle) => return self.listen(session, handle, false).await,
                Err(BindError::AlreadyOwned(port)) => match self.transport.existing_server(port) {
                    Some(handle) => {
                        tracing::info!("Port {} already serves a preview, taking it over", port);
                        return self.listen(session, handle, true).await;
                    }
                    None => tracing::warn!("Port {} is owned but its server is gone, trying the next port", port),
                },
                Err(e) => tracing::warn!("{}, trying the next port", e),
            }
        }

        self.state = ServerState::Stopped;
        Err(RunError::PortsExhausted {
            first_port,
            attempts,
        })
    }

    async fn listen(
        &mut self,
        session: PreviewSession,
        handle: Arc<dyn ServerHandle>,
        reused: bool,
    ) -> Result<RunOutcome, RunError> {
        let port = handle.port();
        let session = session.with_port(port);

        let resolver = ContentResolver::new(
            self.documents.clone(),
            self.filesystems.clone(),
            &self.config,
        );
        let serializer = FetchSerializer::new(
            self.filesystems.clone(),
            RemoteCache::with_dir(self.config.cache_dir()),
        );
        let router = Arc::new(RequestRouter::new(
            session.clone(),
            resolver,
            serializer,
            &self.config,
        ));

        handle.set_on_request_handler(request_handler(router.clone(), handle.clone()));
        self.active = Some(ActiveServer {
            handle: handle.clone(),
            router,
        });
        self.state = ServerState::Listening { port };
        tracing::info!("Preview listening on port {}", port);

        match self.launch(&session).await {
            Ok(url) => Ok(RunOutcome { url, port, reused }),
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    /// Stop the listening server, if any
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.stop();
            tracing::info!(
                "Stopped preview session {} on port {}",
                active.router.session().token(),
                active.handle.port()
            );
        }
        self.state = ServerState::Stopped;
    }

    /// Build the launch URL for `session` and hand it to the launcher
    async fn launch(&self, session: &PreviewSession) -> Result<String, RunError> {
        let relative = self.entry_path(session).await;
        let url = launch_url(&self.config.host, session.port(), &relative)?;
        if let Err(e) = self.launcher.launch(&url, session.mode()) {
            tracing::warn!("Failed to open {}: {}", url, e);
        }
        Ok(url)
    }

    /// Browser-relative path the preview opens on
    async fn entry_path(&self, session: &PreviewSession) -> String {
        if session.mode() == TargetMode::InappConsole {
            return session.token().console_page_endpoint();
        }

        let renders_itself = matches!(
            session.active().extension().as_deref(),
            Some("html" | "htm" | "md" | "markdown" | "js")
        );
        if !renders_itself {
            if let Some(root) = session.root() {
                let index = root.join("index.html");
                if let Some(backend) = self.filesystems.backend_for(&index) {
                    if backend.exists(&index).await {
                        return "index.html".to_string();
                    }
                }
            }
        }

        session.active_relative_path()
    }
}

impl Drop for PreviewServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handler that routes each request on the current tokio runtime
fn request_handler(router: Arc<RequestRouter>, handle: Arc<dyn ServerHandle>) -> RequestHandler {
    let runtime = tokio::runtime::Handle::current();
    Arc::new(move |request: RequestDescriptor| {
        let router = router.clone();
        let handle = handle.clone();
        runtime.spawn(async move {
            router.dispatch(handle, request).await;
        });
    })
}

/// `http://{host}:{port}/{relative}`, each relative segment percent-encoded
pub fn launch_url(host: &str, port: u16, relative: &str) -> Result<String, RunError> {
    let base = url::Url::parse(&format!("http://{host}:{port}/"))
        .map_err(|e| RunError::InvalidUrl(format!("{host}:{port}: {e}")))?;
    let encoded: Vec<String> = relative
        .split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect();
    let url = base
        .join(&encoded.join("/"))
        .map_err(|e| RunError::InvalidUrl(format!("{relative}: {e}")))?;
    Ok(url.to_string())
}
