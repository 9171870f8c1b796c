//! Per-request dispatch
//!
//! One router serves one session. For every request it resolves the target,
//! runs remote targets through the session's fetch serializer, transforms
//! HTML and Markdown, and hands the response to the transport by request id.
//! Failures never escape: anything that cannot be served becomes a 404.

use super::resolver::{ContentResolver, ResolvedTarget};
use crate::config::PreviewConfig;
use crate::model::request::{RequestDescriptor, RequestId};
use crate::model::response::{Response, ResponseBody};
use crate::model::session::PreviewSession;
use crate::primitives::mime;
use crate::services::fetch::{FetchOutcome, FetchSerializer, PendingFetch};
use crate::services::transport::ServerHandle;
use crate::view::{instrument, markdown};
use encoding_rs::{Encoding, UTF_8};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Routes the requests of one preview session
pub struct RequestRouter {
    session: PreviewSession,
    resolver: ContentResolver,
    serializer: FetchSerializer,
    /// Encoding of pages read from disk; bodies we build are always UTF-8
    encoding: &'static Encoding,
    /// Charset label for files streamed as-is
    file_charset: String,
    disable_cache: bool,
}

impl std::fmt::Debug for RequestRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRouter")
            .field("session", &self.session)
            .field("resolver", &self.resolver)
            .field("serializer", &self.serializer)
            .finish()
    }
}

impl RequestRouter {
    pub fn new(
        session: PreviewSession,
        resolver: ContentResolver,
        serializer: FetchSerializer,
        config: &PreviewConfig,
    ) -> Self {
        Self {
            session,
            resolver,
            serializer,
            encoding: Encoding::for_label(config.default_encoding.as_bytes()).unwrap_or(UTF_8),
            file_charset: config.default_encoding.clone(),
            disable_cache: config.disable_cache,
        }
    }

    pub fn session(&self) -> &PreviewSession {
        &self.session
    }

    pub fn serializer(&self) -> &FetchSerializer {
        &self.serializer
    }

    /// Route `request` and send the response through `handle`
    pub async fn dispatch(self: &Arc<Self>, handle: Arc<dyn ServerHandle>, request: RequestDescriptor) {
        let request_id = request.request_id;
        let response = self.route(&request).await;
        tracing::debug!(
            "Request {} {} -> {}",
            request_id,
            request.raw_path,
            response.status
        );

        let sent = tokio::task::spawn_blocking(move || handle.send(request_id, response)).await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to send response for {}: {}", request_id, e),
            Err(e) => tracing::warn!("Send task for {} failed: {}", request_id, e),
        }
    }

    /// Build the response for one request
    pub async fn route(self: &Arc<Self>, request: &RequestDescriptor) -> Response {
        let path = request.normalized_path();
        let target = self.resolver.resolve(&path, &self.session).await;

        let response = match target {
            ResolvedTarget::RemoteFile { uri, mime, .. } => {
                self.fetch_remote(request.request_id, &path, uri, mime).await
            }
            target => self.respond(&path, target).await,
        };
        self.finish(response)
    }

    /// Queue a remote target on the serializer and wait for its continuation
    async fn fetch_remote(
        self: &Arc<Self>,
        request_id: RequestId,
        path: &str,
        uri: String,
        mime: &'static str,
    ) -> Response {
        let (tx, rx) = oneshot::channel();
        let router = Arc::clone(self);
        let request_path = path.to_string();

        let fetch = PendingFetch::new(uri, request_id, move |outcome| async move {
            let response = match outcome {
                FetchOutcome::Ready(local) => router.file_response(&request_path, &local, mime).await,
                FetchOutcome::Failed(_) => Response::not_found(&request_path),
            };
            let _ = tx.send(response);
        });
        self.serializer.serve(fetch).await;

        rx.await.unwrap_or_else(|_| Response::not_found(path))
    }

    async fn respond(&self, path: &str, target: ResolvedTarget) -> Response {
        match target {
            ResolvedTarget::BufferedDocument { text, mime } => self.document_response(path, text, mime),
            ResolvedTarget::LocalFile { path: local, mime } => {
                self.file_response(path, &local, mime).await
            }
            ResolvedTarget::SyntheticDocument { body, mime } => match body {
                ResponseBody::Text(text) if mime == "text/html" => {
                    self.document_response(path, text, mime)
                }
                body => Response::ok(body, self.content_type(mime)),
            },
            ResolvedTarget::RemoteFile { uri, .. } => {
                tracing::warn!("Remote target {} reached the local responder", uri);
                Response::not_found(path)
            }
            ResolvedTarget::NotFound => Response::not_found(path),
        }
    }

    /// In-memory text, rendered and instrumented when it is a page
    fn document_response(&self, path: &str, text: String, mime: &'static str) -> Response {
        match mime {
            "text/markdown" => {
                let filename = path.rsplit('/').next().unwrap_or(path);
                let page = markdown::render_page(&text, filename, self.session.token());
                self.html_response(&page)
            }
            "text/html" => self.html_response(&text),
            _ => Response::text(text, self.content_type(mime)),
        }
    }

    /// A local file: pages are read and instrumented, everything else streams
    async fn file_response(&self, path: &str, local: &Path, mime: &'static str) -> Response {
        if mime != "text/html" {
            return Response::file(local, mime::content_type(mime, &self.file_charset));
        }
        match tokio::fs::read(local).await {
            Ok(bytes) => {
                // A byte order mark overrides the configured encoding
                let (html, _, _) = self.encoding.decode(&bytes);
                self.html_response(&html)
            }
            Err(e) => {
                tracing::warn!("Failed to read {:?}: {}", local, e);
                Response::not_found(path)
            }
        }
    }

    fn html_response(&self, html: &str) -> Response {
        let page = instrument::instrument(html, self.session.token(), self.session.mode());
        Response::text(page, self.content_type("text/html"))
    }

    fn content_type(&self, mime: &str) -> String {
        mime::content_type(mime, "utf-8")
    }

    fn finish(&self, response: Response) -> Response {
        if self.disable_cache {
            response.with_header("Cache-Control", "no-store")
        } else {
            response
        }
    }
}
