//! Tagged URI variants for project roots and document locations
//!
//! Documents opened in the editor can live on local disk, on FTP/SFTP servers,
//! behind Android content providers or inside Termux document trees. Each of
//! those encodes the "real" path differently, so a location string is parsed
//! once into a [`ParsedUri`] and every caller matches on the variant instead of
//! sniffing substrings.

use percent_encoding::percent_decode_str;

/// Authority + path prefix of a Termux document tree URI
pub const TERMUX_TREE_PREFIX: &str = "content://com.termux.documents/tree/";

/// Separator between a content tree URI and the document id inside it
pub const DOCUMENT_SEPARATOR: &str = "::";

/// Scheme family of a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UriScheme {
    File,
    Ftp,
    Sftp,
    Content,
    TermuxDocument,
    Other,
}

impl UriScheme {
    /// FTP and SFTP locations need a network round-trip to read
    pub fn is_remote(self) -> bool {
        matches!(self, UriScheme::Ftp | UriScheme::Sftp)
    }

    /// Anything not directly readable as a local path
    pub fn is_local_file(self) -> bool {
        self == UriScheme::File
    }
}

/// A location string parsed into one of the supported shapes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedUri {
    /// Plain filesystem path (`/home/me/site`) or `file://` URI
    File { path: String },
    /// `ftp://` or `sftp://`, with the query string split off
    Remote {
        scheme: UriScheme,
        base: String,
        query: Option<String>,
    },
    /// `content://com.termux.documents/tree/<encoded root>[::<absolute path>]`
    TermuxTree {
        tree: String,
        document: Option<String>,
    },
    /// Any other `content://` URI, optionally carrying a `::<document id>` suffix
    Content {
        tree: String,
        document: Option<String>,
    },
    /// Schemes the preview server only knows how to read through the filesystem layer
    Other { scheme: String, uri: String },
}

impl ParsedUri {
    /// Parse a location. Never fails: unknown shapes land in [`ParsedUri::Other`]
    /// and scheme-less strings are treated as filesystem paths.
    pub fn parse(location: &str) -> Self {
        let Some(scheme_end) = location.find("://") else {
            return ParsedUri::File {
                path: location.to_string(),
            };
        };
        let scheme = location[..scheme_end].to_ascii_lowercase();

        match scheme.as_str() {
            "file" => ParsedUri::File {
                path: location[scheme_end + 3..].to_string(),
            },
            "ftp" | "sftp" => {
                let (base, query) = match location.split_once('?') {
                    Some((base, query)) => (base.to_string(), Some(query.to_string())),
                    None => (location.to_string(), None),
                };
                ParsedUri::Remote {
                    scheme: if scheme == "ftp" {
                        UriScheme::Ftp
                    } else {
                        UriScheme::Sftp
                    },
                    base,
                    query,
                }
            }
            "content" => {
                let (tree, document) = match location.split_once(DOCUMENT_SEPARATOR) {
                    Some((tree, document)) => (tree.to_string(), Some(document.to_string())),
                    None => (location.to_string(), None),
                };
                if tree.starts_with(TERMUX_TREE_PREFIX) {
                    ParsedUri::TermuxTree { tree, document }
                } else {
                    ParsedUri::Content { tree, document }
                }
            }
            _ => ParsedUri::Other {
                scheme,
                uri: location.to_string(),
            },
        }
    }

    pub fn scheme(&self) -> UriScheme {
        match self {
            ParsedUri::File { .. } => UriScheme::File,
            ParsedUri::Remote { scheme, .. } => *scheme,
            ParsedUri::TermuxTree { .. } => UriScheme::TermuxDocument,
            ParsedUri::Content { .. } => UriScheme::Content,
            ParsedUri::Other { .. } => UriScheme::Other,
        }
    }

    /// Absolute filesystem root encoded in a Termux tree URI.
    ///
    /// `content://com.termux.documents/tree/%2Fdata%2Fhome%2Fsite` → `/data/home/site`
    pub fn termux_root(&self) -> Option<String> {
        let ParsedUri::TermuxTree { tree, .. } = self else {
            return None;
        };
        let encoded = tree.strip_prefix(TERMUX_TREE_PREFIX)?;
        let decoded = decode_component(encoded)?;
        Some(trim_trailing_slashes(&decoded).to_string())
    }

    /// Root prefix of a generic content tree, decoded from its last path segment.
    ///
    /// `content://authority/tree/primary%3AProjects%2Fsite` → `primary:Projects/site`
    pub fn content_root(&self) -> Option<String> {
        let ParsedUri::Content { tree, .. } = self else {
            return None;
        };
        let segment = trim_trailing_slashes(tree).rsplit('/').next()?;
        if segment.is_empty() {
            return None;
        }
        let root = if segment.contains('%') {
            decode_component(segment)?
        } else {
            segment.to_string()
        };
        Some(trim_trailing_slashes(&root).to_string())
    }

    /// Decoded document id following `::`, for content and Termux URIs
    pub fn document_path(&self) -> Option<String> {
        match self {
            ParsedUri::TermuxTree {
                document: Some(document),
                ..
            }
            | ParsedUri::Content {
                document: Some(document),
                ..
            } => decode_component(document),
            _ => None,
        }
    }

    /// The location with any credential/session query string removed
    pub fn without_query(&self) -> String {
        match self {
            ParsedUri::File { path } => path.clone(),
            ParsedUri::Remote { base, .. } => base.clone(),
            ParsedUri::TermuxTree { tree, document } | ParsedUri::Content { tree, document } => {
                match document {
                    Some(document) => format!("{tree}{DOCUMENT_SEPARATOR}{document}"),
                    None => tree.clone(),
                }
            }
            ParsedUri::Other { uri, .. } => uri.clone(),
        }
    }
}

/// Percent-decode one URI component. `None` when the result is not UTF-8.
pub fn decode_component(component: &str) -> Option<String> {
    percent_decode_str(component)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

/// Strip every trailing `/`, keeping at least the scheme separator intact.
pub fn trim_trailing_slashes(location: &str) -> &str {
    let trimmed = location.trim_end_matches('/');
    if trimmed.ends_with(':') && location.len() > trimmed.len() {
        // `file:///` style roots: keep the `//` after the scheme
        let keep = (trimmed.len() + 2).min(location.len());
        return &location[..keep];
    }
    trimmed
}
