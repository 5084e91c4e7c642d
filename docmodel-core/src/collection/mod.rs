//! Included (child) document collections
//!
//! Each included entity of a document is backed by one collection. Which
//! variant is used is fixed by the descriptor: high-volume entities are
//! always queried, everything else is loaded once and cached.

mod cached;
mod high_volume;

pub use cached::CachedIncludedDocumentsCollection;
pub use high_volume::HighVolumeIncludedDocumentsCollection;

use crate::descriptor::EntityDescriptor;
use crate::document::{CopyMode, Document, DocumentParent, DocumentValidStatus};
use crate::error::{DocumentError, Result};
use docmodel_types::{DetailId, DocumentId};
use std::fmt;
use std::sync::Arc;

/// Child rows of one included entity below a parent document.
///
/// The parent is passed in as a [`DocumentParent`] snapshot on every call,
/// so a collection never holds a reference back to its owner.
pub trait IncludedDocumentsCollection: Send + Sync + fmt::Debug {
    fn detail_id(&self) -> &DetailId;

    fn entity(&self) -> &Arc<EntityDescriptor>;

    /// Read-only snapshots of every child document.
    fn documents(&self, parent: &DocumentParent) -> Result<Vec<Document>>;

    fn document_by_id(&self, parent: &DocumentParent, id: DocumentId) -> Result<Document>;

    fn with_document_mut(
        &mut self,
        parent: &DocumentParent,
        id: DocumentId,
        f: &mut dyn FnMut(&mut Document) -> Result<()>,
    ) -> Result<()>;

    fn assert_new_document_allowed(&self, parent: &DocumentParent) -> Result<()>;

    /// Create a child document and return a snapshot of it.
    fn create_new_document(&mut self, parent: &DocumentParent) -> Result<Document>;

    fn delete_documents(&mut self, parent: &DocumentParent, ids: &[DocumentId]) -> Result<()>;

    fn check_and_get_valid_status(&self) -> DocumentValidStatus;

    fn has_changes_recursively(&self) -> bool;

    fn save_if_has_changes(&mut self, parent: &DocumentParent) -> Result<()>;

    fn mark_stale_all(&self);

    /// Returns false when `id` is not cached.
    fn mark_stale(&self, id: DocumentId) -> bool;

    /// Line number for the next new child row.
    fn next_line_no(&self, parent: &DocumentParent) -> Result<i32>;

    /// The parent got a new id (or path); follow it.
    fn reparent(&mut self, parent: &DocumentParent);

    fn copy(&self, mode: CopyMode) -> Box<dyn IncludedDocumentsCollection>;
}

pub(crate) fn child_not_found(
    parent: &DocumentParent,
    detail_id: &DetailId,
    id: DocumentId,
) -> DocumentError {
    DocumentError::DocumentNotFound {
        path: parent.path().create_child_path(detail_id.clone(), id),
    }
}
