//! Persistence contract
//!
//! The engine never talks to a database directly. Each entity descriptor is
//! bound to a [`DocumentsRepository`] that loads, versions, saves and
//! deletes documents of that entity.

mod memory;

pub use memory::InMemoryDocumentsRepository;

use crate::descriptor::EntityDescriptor;
use crate::document::{Document, DocumentParent};
use crate::error::{DocumentError, Result};
use docmodel_types::DocumentId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque marker of a stored row's state; any change to the row yields a
/// different token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(pub String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the store reports back after a save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveResult {
    /// Persisted id; differs from the document's id when it was new.
    pub id: DocumentId,
    pub version: Option<VersionToken>,
}

/// Which documents of an entity to load
#[derive(Debug, Clone)]
pub struct DocumentQuery {
    entity: Arc<EntityDescriptor>,
    record_id: Option<DocumentId>,
    parent: Option<DocumentParent>,
}

impl DocumentQuery {
    pub fn new(entity: Arc<EntityDescriptor>) -> Self {
        Self {
            entity,
            record_id: None,
            parent: None,
        }
    }

    pub fn record_id(mut self, id: DocumentId) -> Self {
        self.record_id = Some(id);
        self
    }

    /// Restrict to the included documents of `parent`.
    pub fn parent(mut self, parent: DocumentParent) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn entity(&self) -> &Arc<EntityDescriptor> {
        &self.entity
    }

    pub fn get_record_id(&self) -> Option<DocumentId> {
        self.record_id
    }

    pub fn get_parent(&self) -> Option<&DocumentParent> {
        self.parent.as_ref()
    }

    pub fn parent_link_id(&self) -> Option<DocumentId> {
        self.parent.as_ref().map(DocumentParent::id)
    }
}

impl fmt::Display for DocumentQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entity.table_name())?;
        if let Some(id) = self.record_id {
            write!(f, " id={id}")?;
        }
        if let Some(parent) = &self.parent {
            write!(f, " parent={}", parent.path())?;
        }
        Ok(())
    }
}

/// Storage backend of an entity
pub trait DocumentsRepository: Send + Sync + fmt::Debug {
    fn retrieve_documents(&self, query: &DocumentQuery) -> Result<Vec<Document>>;

    /// At most one document; more than one match is a store invariant
    /// violation.
    fn retrieve_document(&self, query: &DocumentQuery) -> Result<Option<Document>> {
        let mut documents = self.retrieve_documents(query)?;
        match documents.len() {
            0 | 1 => Ok(documents.pop()),
            count => Err(DocumentError::TooManyRowsFound {
                query: query.to_string(),
                count,
            }),
        }
    }

    /// A new, unsaved document with default values.
    fn create_new_document(
        &self,
        entity: &Arc<EntityDescriptor>,
        parent: Option<&DocumentParent>,
    ) -> Result<Document> {
        Ok(Document::new_with_defaults(Arc::clone(entity), parent))
    }

    /// Current version of the stored row; `None` when the row is absent.
    fn retrieve_version(
        &self,
        entity: &EntityDescriptor,
        id: DocumentId,
    ) -> Result<Option<VersionToken>>;

    /// Insert or update the row of `document`.
    fn save(&self, document: &mut Document) -> Result<SaveResult>;

    fn delete(&self, document: &Document) -> Result<()>;
}
