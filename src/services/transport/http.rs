//! `tiny_http` implementation of the transport
//!
//! Each server runs one accept thread that registers incoming requests under a
//! fresh [`RequestId`] and hands their descriptors to the installed handler.
//! Requests stay parked until [`ServerHandle::send`] answers them.

use super::{BindError, RequestHandler, ServerHandle, Transport};
use crate::model::request::{RequestDescriptor, RequestId};
use crate::model::response::{Response, ResponseBody};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread;
use tiny_http::{Header, Request, Server, StatusCode};

type PendingRequests = Arc<Mutex<HashMap<RequestId, Request>>>;

type OwnedServers = Arc<Mutex<HashMap<u16, Weak<TinyHttpHandle>>>>;

/// Loopback HTTP transport
#[derive(Debug, Clone)]
pub struct TinyHttpTransport {
    bind_ip: IpAddr,
    /// Live servers created by this transport, by port
    owned: OwnedServers,
}

impl Default for TinyHttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TinyHttpTransport {
    /// Transport bound to 127.0.0.1
    pub fn new() -> Self {
        Self::with_bind_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    pub fn with_bind_ip(bind_ip: IpAddr) -> Self {
        Self {
            bind_ip,
            owned: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn live_server(&self, port: u16) -> Option<Arc<TinyHttpHandle>> {
        if port == 0 {
            return None;
        }
        let handle = self.owned.lock().ok()?.get(&port).and_then(Weak::upgrade)?;
        (!handle.stopped.load(Ordering::SeqCst)).then_some(handle)
    }

    fn is_owned(&self, port: u16) -> bool {
        self.live_server(port).is_some()
    }
}

impl Transport for TinyHttpTransport {
    fn create_server(&self, port: u16) -> Result<Arc<dyn ServerHandle>, BindError> {
        if self.is_owned(port) {
            return Err(BindError::AlreadyOwned(port));
        }

        let server = Server::http(SocketAddr::new(self.bind_ip, port)).map_err(|err| {
            match err.downcast_ref::<io::Error>() {
                Some(io_err) if io_err.kind() == io::ErrorKind::AddrInUse => {
                    BindError::InUse(port)
                }
                _ => BindError::Other {
                    port,
                    message: err.to_string(),
                },
            }
        })?;
        let bound_port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .unwrap_or(port);

        tracing::info!("Preview transport listening on {}:{}", self.bind_ip, bound_port);

        let handle = Arc::new(TinyHttpHandle {
            port: bound_port,
            server: Arc::new(server),
            pending: Arc::new(Mutex::new(HashMap::new())),
            handler: Arc::new(RwLock::new(None)),
            owned: self.owned.clone(),
            stopped: AtomicBool::new(false),
        });
        if let Ok(mut owned) = self.owned.lock() {
            owned.insert(bound_port, Arc::downgrade(&handle));
        }
        handle.spawn_accept_loop();
        Ok(handle)
    }

    fn existing_server(&self, port: u16) -> Option<Arc<dyn ServerHandle>> {
        self.live_server(port)
            .map(|handle| handle as Arc<dyn ServerHandle>)
    }
}

struct TinyHttpHandle {
    port: u16,
    server: Arc<Server>,
    pending: PendingRequests,
    handler: Arc<RwLock<Option<RequestHandler>>>,
    owned: OwnedServers,
    stopped: AtomicBool,
}

impl TinyHttpHandle {
    fn spawn_accept_loop(&self) {
        let server = self.server.clone();
        let pending = self.pending.clone();
        let handler = self.handler.clone();
        let port = self.port;

        thread::spawn(move || {
            let next_id = AtomicU64::new(1);
            for request in server.incoming_requests() {
                let request_id = RequestId(next_id.fetch_add(1, Ordering::Relaxed));
                let descriptor = RequestDescriptor::new(request_id, request.url());
                let current = handler.read().ok().and_then(|handler| handler.clone());

                match current {
                    Some(handler) => {
                        if let Ok(mut pending) = pending.lock() {
                            pending.insert(request_id, request);
                        }
                        handler(descriptor);
                    }
                    None => {
                        tracing::warn!("Request {} on port {} before a handler was installed", request_id, port);
                        let response = tiny_http::Response::from_data(b"Not ready".to_vec())
                            .with_status_code(StatusCode(503));
                        let _ = request.respond(response);
                    }
                }
            }
            tracing::debug!("Accept loop for port {} finished", port);
        });
    }
}

fn respond<R: Read>(
    request: Request,
    response: tiny_http::Response<R>,
    status: u16,
    headers: &[(String, String)],
) -> io::Result<()> {
    let mut response = response.with_status_code(StatusCode(status));
    for (name, value) in headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => response.add_header(header),
            Err(()) => tracing::warn!("Dropping invalid header {}", name),
        }
    }
    request.respond(response)
}

impl ServerHandle for TinyHttpHandle {
    fn port(&self) -> u16 {
        self.port
    }

    fn set_on_request_handler(&self, handler: RequestHandler) {
        if let Ok(mut current) = self.handler.write() {
            *current = Some(handler);
        }
    }

    /// Writes the whole body before returning.
    fn send(&self, request_id: RequestId, response: Response) -> io::Result<()> {
        let request = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&request_id))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("No pending request {request_id}"),
                )
            })?;

        let Response {
            status,
            body,
            headers,
        } = response;
        match body {
            ResponseBody::Text(text) => respond(
                request,
                tiny_http::Response::from_data(text.into_bytes()),
                status,
                &headers,
            ),
            ResponseBody::Bytes(bytes) => respond(
                request,
                tiny_http::Response::from_data(bytes),
                status,
                &headers,
            ),
            ResponseBody::File(path) => match File::open(&path) {
                Ok(file) => respond(request, tiny_http::Response::from_file(file), status, &headers),
                Err(err) => {
                    tracing::warn!("Failed to open {:?} for {}: {}", path, request_id, err);
                    let response = tiny_http::Response::from_data(
                        format!("File not found: {}", path.display()).into_bytes(),
                    );
                    respond(request, response, 404, &[])?;
                    Err(err)
                }
            },
        }
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.server.unblock();
        if let Ok(mut handler) = self.handler.write() {
            *handler = None;
        }
        if let Ok(mut owned) = self.owned.lock() {
            owned.remove(&self.port);
        }
        tracing::info!("Preview transport on port {} stopped", self.port);
    }
}

impl Drop for TinyHttpHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};

    #[test]
    fn test_port_zero_binds_free_port() {
        let transport = TinyHttpTransport::new();
        let handle = transport.create_server(0).unwrap();
        assert_ne!(handle.port(), 0);
        handle.stop();
    }

    #[test]
    fn test_same_port_is_already_owned() {
        let transport = TinyHttpTransport::new();
        let handle = transport.create_server(0).unwrap();
        let port = handle.port();

        let err = transport.create_server(port).err().unwrap();
        assert_eq!(err, BindError::AlreadyOwned(port));
        assert_eq!(transport.existing_server(port).unwrap().port(), port);

        handle.stop();
        assert!(!transport.is_owned(port));
        assert!(transport.existing_server(port).is_none());
    }

    #[test]
    fn test_foreign_listener_is_in_use() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let transport = TinyHttpTransport::new();
        let err = transport.create_server(port).err().unwrap();
        assert_eq!(err, BindError::InUse(port));
    }

    #[test]
    fn test_send_unknown_request_fails() {
        let transport = TinyHttpTransport::new();
        let handle = transport.create_server(0).unwrap();
        let err = handle
            .send(RequestId(99), Response::text("x", "text/plain"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        handle.stop();
    }

    #[test]
    fn test_handler_answers_request() {
        let transport = TinyHttpTransport::new();
        let handle = transport.create_server(0).unwrap();
        let responder = handle.clone();
        handle.set_on_request_handler(Arc::new(move |request: RequestDescriptor| {
            let body = format!("path={}", request.raw_path);
            responder
                .send(request.request_id, Response::text(body, "text/plain"))
                .unwrap();
        }));

        let mut stream = TcpStream::connect(("127.0.0.1", handle.port())).unwrap();
        stream
            .write_all(b"GET /a/b.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).unwrap();

        assert!(reply.starts_with("HTTP/1.1 200"));
        assert!(reply.contains("path=/a/b.html"));
        handle.stop();
    }
}
