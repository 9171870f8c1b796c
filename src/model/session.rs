//! Per-run preview session state
//!
//! A [`PreviewSession`] is created every time a preview is started and replaced
//! by the next run. It carries everything request handlers need: the session
//! token namespacing synthetic endpoints, the target mode, the active document
//! and the project root used for path relativization.

use crate::primitives::mime;
use crate::primitives::path_resolver::{resolve_relative_path, ProjectRoot};
use crate::primitives::uri::ParsedUri;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Where and how the preview is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetMode {
    /// External system browser
    Browser,
    /// In-app console harness running a JavaScript file
    InappConsole,
    /// In-app webview rendering the document (HTML, Markdown, project page)
    FileRender,
}

impl TargetMode {
    pub fn is_in_app(self) -> bool {
        matches!(self, TargetMode::InappConsole | TargetMode::FileRender)
    }

    pub fn is_console(self) -> bool {
        self == TargetMode::InappConsole
    }
}

/// Random per-run identifier namespacing synthetic endpoints and injected markup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a fresh token
    pub fn generate() -> Self {
        use sha2::{Digest, Sha256};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let mut hasher = Sha256::new();
        hasher.update(now.to_le_bytes());
        hasher.update(std::process::id().to_le_bytes());
        hasher.update(COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        Self(format!("{:x}", hasher.finalize())[..12].to_string())
    }

    /// Token with a fixed value (tests, reproducible demos)
    pub fn from_string(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<token>_script.js`: live text of the executing script
    pub fn script_endpoint(&self) -> String {
        format!("{}_script.js", self.0)
    }

    /// `<token>_console.js`: console bootstrap
    pub fn console_endpoint(&self) -> String {
        format!("{}_console.js", self.0)
    }

    /// `<token>_md.css`: markdown stylesheet
    pub fn markdown_css_endpoint(&self) -> String {
        format!("{}_md.css", self.0)
    }

    /// `<token>_console.html`: generated console harness page
    pub fn console_page_endpoint(&self) -> String {
        format!("{}_console.html", self.0)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The document a run was started for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDocument {
    /// Full location (`/proj/src/index.html`, `sftp://...`, `content://...::...`)
    pub location: String,
    /// Parent directory location
    pub dir: String,
    pub filename: String,
}

impl ActiveDocument {
    /// Split a document location into directory and filename
    pub fn from_location(location: &str) -> Self {
        let (body, query) = match ParsedUri::parse(location) {
            ParsedUri::Remote {
                base,
                query: Some(query),
                ..
            } => (base, Some(query)),
            _ => (location.to_string(), None),
        };
        let (dir, filename) = match body.rsplit_once('/') {
            Some((dir, filename)) => (dir.to_string(), filename.to_string()),
            None => (String::new(), body.clone()),
        };
        let dir = match query {
            Some(query) => format!("{dir}?{query}"),
            None => dir,
        };
        Self {
            location: location.to_string(),
            dir,
            filename,
        }
    }

    /// Lowercased extension of the filename
    pub fn extension(&self) -> Option<String> {
        mime::extension(&self.filename)
    }
}

/// State of one preview run
#[derive(Debug, Clone)]
pub struct PreviewSession {
    token: SessionToken,
    mode: TargetMode,
    active: ActiveDocument,
    root: Option<ProjectRoot>,
    port: u16,
    /// No folder context: only the active file is servable
    single_file: bool,
}

impl PreviewSession {
    /// Create a session. A root that does not contain the active document is
    /// ignored and the session falls back to single-file mode.
    pub fn new(mode: TargetMode, active: ActiveDocument, root: Option<ProjectRoot>) -> Self {
        let root = root.filter(|root| root.contains(&active.location));
        Self {
            token: SessionToken::generate(),
            mode,
            single_file: root.is_none(),
            active,
            root,
            port: 0,
        }
    }

    /// Builder: use a fixed token
    pub fn with_token(mut self, token: SessionToken) -> Self {
        self.token = token;
        self
    }

    /// Builder: record the port the server listens on
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn mode(&self) -> TargetMode {
        self.mode
    }

    pub fn active(&self) -> &ActiveDocument {
        &self.active
    }

    pub fn root(&self) -> Option<&ProjectRoot> {
        self.root.as_ref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_single_file(&self) -> bool {
        self.single_file
    }

    /// Root used for serving: the project root, or the active document's own
    /// directory in single-file mode
    pub fn effective_root(&self) -> ProjectRoot {
        match &self.root {
            Some(root) => root.clone(),
            None => ProjectRoot::new(&self.active.dir),
        }
    }

    /// Browser-visible path of the active document
    pub fn active_relative_path(&self) -> String {
        resolve_relative_path(self.root.as_ref(), &self.active.dir, &self.active.filename)
    }

    /// Location of the document a browser-relative path refers to
    pub fn location_for(&self, relative: &str) -> String {
        if relative == self.active_relative_path() {
            return self.active.location.clone();
        }
        self.effective_root().join(relative)
    }
}
