// src/datum.rs

//! The unit of data passed between stages.

use std::fmt;
use std::sync::Arc;

/// Payload carried by a [`Datum`].
pub type Document = serde_json::Value;

/// One envelope flowing through the graph: a document plus an optional id.
///
/// The document sits behind an `Arc`, so broadcasting a datum to several
/// downstream stages copies the reference, not the document. Components that
/// need a modified document build a new one (see [`Datum::map_document`]).
#[derive(Clone, PartialEq)]
pub struct Datum {
    document: Arc<Document>,
    id: Option<String>,
}

impl Datum {
    pub fn new(document: impl Into<Document>) -> Self {
        Self {
            document: Arc::new(document.into()),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Build a new datum with the same id and a document derived from this one.
    pub fn map_document(&self, f: impl FnOnce(&Document) -> Document) -> Self {
        Self {
            document: Arc::new(f(&self.document)),
            id: self.id.clone(),
        }
    }

    /// Whether two datums share the same document allocation.
    pub fn shares_document_with(&self, other: &Datum) -> bool {
        Arc::ptr_eq(&self.document, &other.document)
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datum")
            .field("id", &self.id)
            .field("document", &*self.document)
            .finish()
    }
}

impl From<Document> for Datum {
    fn from(document: Document) -> Self {
        Datum::new(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clones_share_the_document() {
        let a = Datum::new(json!({"n": 1})).with_id("1");
        let b = a.clone();
        assert!(a.shares_document_with(&b));
        assert_eq!(b.id(), Some("1"));
    }

    #[test]
    fn map_document_keeps_id_and_allocates_fresh_document() {
        let a = Datum::new(json!(2)).with_id("two");
        let b = a.map_document(|doc| json!(doc.as_i64().unwrap_or(0) * 10));
        assert_eq!(b.document(), &json!(20));
        assert_eq!(b.id(), Some("two"));
        assert!(!a.shares_document_with(&b));
    }
}
