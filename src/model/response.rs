//! HTTP-equivalent responses handed back to the transport

use std::path::PathBuf;

/// Payload of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Text generated or read in memory
    Text(String),
    /// Binary content held in memory
    Bytes(Vec<u8>),
    /// A local file the transport streams itself
    File(PathBuf),
}

/// Status, body and headers for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: ResponseBody,
    pub headers: Vec<(String, String)>,
}

impl Response {
    pub fn ok(body: ResponseBody, content_type: impl Into<String>) -> Self {
        Self {
            status: 200,
            body,
            headers: vec![("Content-Type".to_string(), content_type.into())],
        }
    }

    pub fn text(text: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::ok(ResponseBody::Text(text.into()), content_type)
    }

    pub fn file(path: impl Into<PathBuf>, content_type: impl Into<String>) -> Self {
        Self::ok(ResponseBody::File(path.into()), content_type)
    }

    /// Plain-text 404
    pub fn not_found(path: &str) -> Self {
        Self {
            status: 404,
            body: ResponseBody::Text(format!("File not found: {path}")),
            headers: vec![(
                "Content-Type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
        }
    }

    /// Builder: append a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header with the given name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// Body text, when the body is held in memory as text
    pub fn text_body(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_plain_text() {
        let response = Response::not_found("missing.html");
        assert_eq!(response.status, 404);
        assert_eq!(response.content_type(), Some("text/plain; charset=utf-8"));
        assert!(response.text_body().unwrap().contains("missing.html"));
    }

    #[test]
    fn test_headers() {
        let response = Response::file("/tmp/a.png", "image/png").with_header("Cache-Control", "no-store");
        assert_eq!(response.header("cache-control"), Some("no-store"));
        assert_eq!(response.content_type(), Some("image/png"));
        assert_eq!(response.text_body(), None);
    }
}
