//! Mapping between browser-visible paths and project documents
//!
//! The preview page is served from `http://host:port/<relative path>`, where the
//! relative path is the document's location below the opened project root.
//! [`resolve_relative_path`] computes that path for a document, and
//! [`ProjectRoot::join`] maps a requested path back to a document location in
//! the root's own URI encoding.
//!
//! Resolution is tiered. Structured strategies (Termux tree, content provider,
//! remote with query string, plain segments) run first; any decode failure drops
//! to the next tier. The final fallbacks are the bare filename and then the
//! combined document path, so resolution always produces something.

use super::uri::{trim_trailing_slashes, ParsedUri, UriScheme, DOCUMENT_SEPARATOR};

/// Opened project folder used as the base for relative paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRoot {
    uri: String,
    parsed: ParsedUri,
}

impl ProjectRoot {
    /// Create a root, stripping trailing slashes from the URI
    pub fn new(uri: &str) -> Self {
        let uri = trim_trailing_slashes(uri).to_string();
        let parsed = ParsedUri::parse(&uri);
        Self { uri, parsed }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn scheme(&self) -> UriScheme {
        self.parsed.scheme()
    }

    pub fn parsed(&self) -> &ParsedUri {
        &self.parsed
    }

    /// Whether `location` lives strictly below this root
    pub fn contains(&self, location: &str) -> bool {
        relative_below(self, &ParsedUri::parse(location)).is_some()
    }

    /// Map a browser-relative path (no leading slash) to a document location
    /// expressed in this root's URI encoding.
    pub fn join(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        match &self.parsed {
            ParsedUri::Remote {
                base,
                query: Some(query),
                ..
            } => format!("{}/{relative}?{query}", trim_trailing_slashes(base)),
            ParsedUri::TermuxTree { tree, .. } => match self.parsed.termux_root() {
                Some(root) => format!("{tree}{DOCUMENT_SEPARATOR}{root}/{relative}"),
                None => format!("{}/{relative}", self.uri),
            },
            ParsedUri::Content { tree, .. } => match self.parsed.content_root() {
                Some(root) => format!("{tree}{DOCUMENT_SEPARATOR}{root}/{relative}"),
                None => format!("{}/{relative}", self.uri),
            },
            _ => format!("{}/{relative}", self.uri),
        }
    }
}

/// Join a document's directory and filename into one location string
pub fn join_document_path(document_dir: &str, filename: &str) -> String {
    if document_dir.is_empty() {
        return filename.to_string();
    }
    if filename.is_empty() {
        return document_dir.to_string();
    }
    // Keep the query of remote directories at the end of the combined location
    if let ParsedUri::Remote {
        base,
        query: Some(query),
        ..
    } = ParsedUri::parse(document_dir)
    {
        return format!("{}/{filename}?{query}", trim_trailing_slashes(&base));
    }
    format!("{}/{filename}", trim_trailing_slashes(document_dir))
}

/// Compute the browser-visible path of a document below `root`.
///
/// When `root` is `None`, or the document does not live below it, the
/// document's own directory acts as the root (single-file preview), which
/// yields the bare filename.
pub fn resolve_relative_path(
    root: Option<&ProjectRoot>,
    document_dir: &str,
    filename: &str,
) -> String {
    let full = join_document_path(document_dir, filename);
    let document = ParsedUri::parse(&full);

    let resolved = root
        .and_then(|root| relative_below(root, &document))
        .or_else(|| {
            let own_dir = ProjectRoot::new(document_dir);
            relative_below(&own_dir, &document)
        });

    match resolved {
        Some(relative) if !relative.is_empty() => relative,
        _ if !filename.is_empty() => filename.to_string(),
        _ => full,
    }
}

/// Relative path of `document` below `root`, if the structured strategies agree
/// that it is a descendant.
fn relative_below(root: &ProjectRoot, document: &ParsedUri) -> Option<String> {
    let strategy = match root.parsed() {
        ParsedUri::TermuxTree { .. } => termux_relative(root.parsed(), document),
        ParsedUri::Content { .. } => content_relative(root.parsed(), document),
        _ => None,
    };
    strategy.or_else(|| {
        // Query strings on FTP/SFTP locations are session artifacts, not path data
        let root_path = root.parsed().without_query();
        let document_path = document.without_query();
        segment_relative(trim_trailing_slashes(&root_path), &document_path)
    })
}

fn termux_relative(root: &ParsedUri, document: &ParsedUri) -> Option<String> {
    let root_path = root.termux_root()?;
    let document_path = document.document_path()?;
    strip_root_prefix(&root_path, &document_path)
}

fn content_relative(root: &ParsedUri, document: &ParsedUri) -> Option<String> {
    let root_path = root.content_root()?;
    let document_path = document.document_path()?;
    strip_root_prefix(&root_path, &document_path)
}

fn strip_root_prefix(root: &str, path: &str) -> Option<String> {
    let rest = path.strip_prefix(root)?;
    // `/site2/a.html` is not below `/site`
    if !rest.is_empty() && !rest.starts_with('/') && !root.ends_with('/') && !root.ends_with(':')
    {
        return None;
    }
    let rest = rest.trim_start_matches('/');
    (!rest.is_empty()).then(|| rest.to_string())
}

/// Everything in `path` past the leading segments it shares with `root`.
/// Returns `None` unless every root segment matches.
fn segment_relative(root: &str, path: &str) -> Option<String> {
    let root_segments: Vec<&str> = root.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();

    let common = root_segments
        .iter()
        .zip(path_segments.iter())
        .take_while(|(a, b)| a == b)
        .count();
    if common < root_segments.len() {
        return None;
    }

    let rest: Vec<&str> = path_segments[common..]
        .iter()
        .copied()
        .filter(|segment| !segment.is_empty())
        .collect();
    (!rest.is_empty()).then(|| rest.join("/"))
}
