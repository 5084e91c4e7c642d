//! Detail ids and document paths

use crate::DocumentId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an included entity relationship (a detail "tab")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DetailId(pub String);

impl DetailId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DetailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DetailId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Fully qualified location of a document: the root document plus any
/// chain of `(detail, row)` steps leading to an included document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentPath {
    document_type: String,
    root_id: DocumentId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    details: Vec<(DetailId, DocumentId)>,
}

impl DocumentPath {
    /// Path of a top-level document stored in the table `document_type`.
    pub fn root(document_type: impl Into<String>, id: DocumentId) -> Self {
        Self {
            document_type: document_type.into(),
            root_id: id,
            details: Vec::new(),
        }
    }

    /// Path of an included row below this document.
    pub fn create_child_path(&self, detail_id: DetailId, row_id: DocumentId) -> Self {
        let mut child = self.clone();
        child.details.push((detail_id, row_id));
        child
    }

    /// Same path, with the last id replaced (used when a temporary id is
    /// swapped for a persisted one).
    pub fn with_document_id(&self, id: DocumentId) -> Self {
        let mut path = self.clone();
        match path.details.last_mut() {
            Some((_, row_id)) => *row_id = id,
            None => path.root_id = id,
        }
        path
    }

    pub fn is_root(&self) -> bool {
        self.details.is_empty()
    }

    pub fn document_type(&self) -> &str {
        &self.document_type
    }

    pub fn root_document_id(&self) -> DocumentId {
        self.root_id
    }

    /// Detail id of the innermost step, if this is an included document.
    pub fn detail_id(&self) -> Option<&DetailId> {
        self.details.last().map(|(detail_id, _)| detail_id)
    }

    /// Id of the document this path points at.
    pub fn document_id(&self) -> DocumentId {
        self.details
            .last()
            .map(|(_, row_id)| *row_id)
            .unwrap_or(self.root_id)
    }

    /// Path of the parent document, or `None` for a root path.
    pub fn parent(&self) -> Option<Self> {
        if self.details.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.details.pop();
        Some(parent)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document_type, self.root_id)?;
        for (detail_id, row_id) in &self.details {
            write!(f, "/{}/{}", detail_id, row_id)?;
        }
        Ok(())
    }
}
