//! Content resolution
//!
//! Maps a normalized request path to where its bytes come from. Nothing is
//! read here beyond existence checks; the router turns the [`ResolvedTarget`]
//! into a response.

use crate::config::PreviewConfig;
use crate::model::documents::{DocumentSnapshot, DocumentStore};
use crate::model::response::ResponseBody;
use crate::model::session::PreviewSession;
use crate::primitives::mime;
use crate::primitives::uri::{ParsedUri, UriScheme};
use crate::services::fs::{Filesystems, LocalFsBackend};
use crate::view::assets;
use std::path::PathBuf;
use std::sync::Arc;

/// Where the content for one request comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// Text of an open editor buffer
    BufferedDocument { text: String, mime: &'static str },
    /// A file on local disk
    LocalFile { path: PathBuf, mime: &'static str },
    /// A document that must be materialized through the fetch serializer
    RemoteFile {
        uri: String,
        scheme: UriScheme,
        mime: &'static str,
    },
    /// Content generated by the server itself
    SyntheticDocument {
        body: ResponseBody,
        mime: &'static str,
    },
    NotFound,
}

impl ResolvedTarget {
    pub fn is_found(&self) -> bool {
        !matches!(self, ResolvedTarget::NotFound)
    }
}

const JAVASCRIPT: &str = "application/javascript";

/// Decides the source of every request path for a session
pub struct ContentResolver {
    documents: Arc<dyn DocumentStore>,
    filesystems: Filesystems,
    legacy_console: bool,
    markdown_stylesheet: Option<PathBuf>,
}

impl std::fmt::Debug for ContentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentResolver")
            .field("filesystems", &self.filesystems)
            .field("legacy_console", &self.legacy_console)
            .field("markdown_stylesheet", &self.markdown_stylesheet)
            .finish()
    }
}

impl ContentResolver {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        filesystems: Filesystems,
        config: &PreviewConfig,
    ) -> Self {
        Self {
            documents,
            filesystems,
            legacy_console: config.legacy_console,
            markdown_stylesheet: config.markdown_stylesheet.clone(),
        }
    }

    pub fn filesystems(&self) -> &Filesystems {
        &self.filesystems
    }

    /// Resolve a normalized request path (no leading slash)
    pub async fn resolve(&self, request_path: &str, session: &PreviewSession) -> ResolvedTarget {
        let token = session.token();

        if request_path == token.script_endpoint() {
            let active = &session.active().location;
            return match self.documents.find(active) {
                Some(document) => ResolvedTarget::BufferedDocument {
                    text: document.text,
                    mime: JAVASCRIPT,
                },
                None => self.file_target(active, JAVASCRIPT).await,
            };
        }

        if request_path == token.console_endpoint() {
            return ResolvedTarget::SyntheticDocument {
                body: ResponseBody::Text(assets::console_script(self.legacy_console).to_string()),
                mime: JAVASCRIPT,
            };
        }

        if request_path == token.markdown_css_endpoint() {
            return self.markdown_stylesheet().await;
        }

        if request_path == token.console_page_endpoint() {
            return ResolvedTarget::SyntheticDocument {
                body: ResponseBody::Text(assets::console_page(token, &session.active().filename)),
                mime: "text/html",
            };
        }

        if session.is_single_file() && request_path != session.active_relative_path() {
            if is_favicon(request_path) {
                return default_favicon();
            }
            tracing::debug!("Single-file preview does not serve {}", request_path);
            return ResolvedTarget::NotFound;
        }

        if has_parent_segment(request_path) {
            tracing::debug!("Refusing {} outside the project", request_path);
            return ResolvedTarget::NotFound;
        }

        let location = session.location_for(request_path);
        let mime = mime::mime_from_path(request_path);
        let open = self.documents.find(&location);

        match mime::extension(request_path).as_deref() {
            Some("md") | Some("markdown") => match open {
                Some(document) => ResolvedTarget::BufferedDocument {
                    text: document.text,
                    mime,
                },
                None => {
                    tracing::debug!("Markdown {} is not open in the editor", location);
                    ResolvedTarget::NotFound
                }
            },
            _ => {
                if let Some(DocumentSnapshot {
                    text,
                    is_unsaved: true,
                    ..
                }) = open
                {
                    return ResolvedTarget::BufferedDocument { text, mime };
                }
                let target = self.file_target(&location, mime).await;
                if !target.is_found() && is_favicon(request_path) {
                    return default_favicon();
                }
                target
            }
        }
    }

    /// Disk or remote target for a document location
    async fn file_target(&self, location: &str, mime: &'static str) -> ResolvedTarget {
        let scheme = ParsedUri::parse(location).scheme();
        if !scheme.is_local_file() {
            return ResolvedTarget::RemoteFile {
                uri: location.to_string(),
                scheme,
                mime,
            };
        }

        if !self.filesystems.local().exists(location).await {
            return ResolvedTarget::NotFound;
        }
        match LocalFsBackend::to_path(location) {
            Ok(path) => ResolvedTarget::LocalFile { path, mime },
            Err(e) => {
                tracing::warn!("Cannot map {} to a local path: {}", location, e);
                ResolvedTarget::NotFound
            }
        }
    }

    async fn markdown_stylesheet(&self) -> ResolvedTarget {
        if let Some(path) = &self.markdown_stylesheet {
            let location = path.to_string_lossy();
            if self.filesystems.local().exists(&location).await {
                return ResolvedTarget::LocalFile {
                    path: path.clone(),
                    mime: "text/css",
                };
            }
            tracing::warn!("Markdown stylesheet {:?} not found, using the bundled one", path);
        }
        ResolvedTarget::SyntheticDocument {
            body: ResponseBody::Text(assets::MARKDOWN_CSS.to_string()),
            mime: "text/css",
        }
    }
}

/// `..` anywhere in the decoded path could climb out of the project root
fn has_parent_segment(request_path: &str) -> bool {
    request_path.split(['/', '\\']).any(|segment| segment == "..")
}

fn is_favicon(request_path: &str) -> bool {
    request_path.rsplit('/').next() == Some("favicon.ico")
}

fn default_favicon() -> ResolvedTarget {
    ResolvedTarget::SyntheticDocument {
        body: ResponseBody::Bytes(assets::FAVICON.to_vec()),
        mime: "image/x-icon",
    }
}
