//! Open editor buffers visible to the preview server
//!
//! The editor owns its buffers; the preview server only needs to look up the
//! current text of an open document and whether it has unsaved changes.

use crate::primitives::uri::ParsedUri;
use std::collections::HashMap;
use std::sync::RwLock;

/// Point-in-time copy of an open buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub location: String,
    pub text: String,
    /// Buffer differs from its backing store
    pub is_unsaved: bool,
}

/// Lookup of open documents by location
pub trait DocumentStore: Send + Sync {
    fn find(&self, location: &str) -> Option<DocumentSnapshot>;
}

/// Key used to match locations: query strings and `file://` prefixes are ignored
fn document_key(location: &str) -> String {
    ParsedUri::parse(location).without_query()
}

/// Thread-safe in-memory set of open documents
#[derive(Debug, Default)]
pub struct OpenDocuments {
    documents: RwLock<HashMap<String, DocumentSnapshot>>,
}

impl OpenDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a document whose text matches its backing store
    pub fn open(&self, location: &str, text: impl Into<String>) {
        self.insert(location, text.into(), false);
    }

    /// Replace the buffer text, marking it unsaved
    pub fn edit(&self, location: &str, text: impl Into<String>) {
        self.insert(location, text.into(), true);
    }

    /// Mark a document as flushed to its backing store
    pub fn mark_saved(&self, location: &str) {
        if let Ok(mut documents) = self.documents.write() {
            if let Some(document) = documents.get_mut(&document_key(location)) {
                document.is_unsaved = false;
            }
        }
    }

    pub fn close(&self, location: &str) {
        if let Ok(mut documents) = self.documents.write() {
            documents.remove(&document_key(location));
        }
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, location: &str, text: String, is_unsaved: bool) {
        if let Ok(mut documents) = self.documents.write() {
            documents.insert(
                document_key(location),
                DocumentSnapshot {
                    location: location.to_string(),
                    text,
                    is_unsaved,
                },
            );
        }
    }
}

impl DocumentStore for OpenDocuments {
    fn find(&self, location: &str) -> Option<DocumentSnapshot> {
        self.documents
            .read()
            .ok()?
            .get(&document_key(location))
            .cloned()
    }
}
