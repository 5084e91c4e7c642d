//! Top-level documents of one entity within a session
//!
//! [`RootDocumentsCollection`] owns the shared [`DocumentsCache`] of root
//! documents. Reads hand out read-only snapshots; writes go through
//! [`RootDocumentsCollection::with_document_mut`] so they happen under the
//! cache lock.

use crate::cache::DocumentsCache;
use crate::config::DocumentsConfig;
use crate::descriptor::EntityDescriptor;
use crate::document::{save_document, CopyMode, Document};
use crate::error::{DocumentError, Result};
use crate::repository::DocumentQuery;
use docmodel_types::{DocumentId, DocumentPath};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct RootDocumentsCollection {
    entity: Arc<EntityDescriptor>,
    cache: Arc<DocumentsCache>,
    config: DocumentsConfig,
}

impl RootDocumentsCollection {
    pub fn new(entity: Arc<EntityDescriptor>, config: DocumentsConfig) -> Self {
        Self {
            entity,
            cache: Arc::new(DocumentsCache::new()),
            config,
        }
    }

    pub fn entity(&self) -> &Arc<EntityDescriptor> {
        &self.entity
    }

    /// Shared with notification handlers that mark documents stale.
    pub fn cache(&self) -> &Arc<DocumentsCache> {
        &self.cache
    }

    fn not_found(&self, id: DocumentId) -> DocumentError {
        DocumentError::DocumentNotFound {
            path: DocumentPath::root(self.entity.table_name(), id),
        }
    }

    /// Create a new top-level document; returns a snapshot of it.
    pub fn create_new(&self) -> Result<Document> {
        let document = self
            .entity
            .repository()
            .create_new_document(&self.entity, None)?;
        let snapshot = document.copy(CopyMode::ReadonlySnapshot);
        self.cache.put(document);
        Ok(snapshot)
    }

    /// Reload the document when it is absent, marked stale, or (with
    /// `check_staleness_on_read`) outdated in the repository.
    fn load_if_needed(&self, id: DocumentId) -> Result<()> {
        let check = self.config.check_staleness_on_read;
        let cached = self.cache.with_document_mut(id, |document| {
            (check && document.check_staled(), document.has_changes_recursively())
        });

        let reload = match cached {
            None => true,
            Some((staled, _)) => staled || self.cache.is_stale_id(id),
        };
        if !reload || (cached.is_some() && !id.is_persisted()) {
            return Ok(());
        }
        if !id.is_persisted() {
            return Err(self.not_found(id));
        }
        if let Some((_, true)) = cached {
            warn!(
                document = %DocumentPath::root(self.entity.table_name(), id),
                "reloading stale document; unsaved changes are discarded"
            );
        }

        let query = DocumentQuery::new(Arc::clone(&self.entity)).record_id(id);
        match self.entity.repository().retrieve_document(&query)? {
            Some(document) => {
                debug!(document = %document.path(), "document (re)loaded");
                self.cache.put(document);
                Ok(())
            }
            None => {
                self.cache.remove_by_id(id);
                Err(self.not_found(id))
            }
        }
    }

    /// Read-only snapshot of the document, loading it if needed.
    pub fn get_or_load(&self, id: DocumentId) -> Result<Document> {
        self.load_if_needed(id)?;
        self.cache.get_by_id(id).ok_or_else(|| self.not_found(id))
    }

    pub fn with_document_mut<R>(
        &self,
        id: DocumentId,
        f: impl FnOnce(&mut Document) -> Result<R>,
    ) -> Result<R> {
        self.load_if_needed(id)?;
        self.cache
            .with_document_mut(id, f)
            .ok_or_else(|| self.not_found(id))?
    }

    /// Validate and save the document with its included documents. Returns
    /// the persisted id, which replaces a temporary id in the cache.
    pub fn save(&self, id: DocumentId) -> Result<DocumentId> {
        let saved = self
            .cache
            .with_document_mut(id, |document| -> Result<DocumentId> {
                if !document.has_changes_recursively() {
                    return Ok(document.id());
                }
                let status = document.check_and_get_valid_status();
                if !status.is_valid() {
                    return Err(DocumentError::InvalidDocumentState {
                        path: document.path().clone(),
                        reason: status.to_string(),
                    });
                }
                save_document(document)?;
                Ok(document.id())
            })
            .ok_or_else(|| self.not_found(id))??;

        self.cache.rekey(id, saved);
        self.cache.mark_not_stale(saved);
        Ok(saved)
    }

    pub fn delete(&self, id: DocumentId) -> Result<()> {
        let document = self
            .cache
            .with_document(id, |document| document.copy(CopyMode::ReadonlySnapshot))
            .ok_or_else(|| self.not_found(id))?;
        if !document.is_new() {
            self.entity.repository().delete(&document)?;
        }
        self.cache.remove_by_id(id);
        debug!(document = %document.path(), "document deleted");
        Ok(())
    }

    /// Returns false when the document is not cached.
    pub fn mark_stale(&self, id: DocumentId) -> bool {
        self.cache.mark_stale(id)
    }

    pub fn mark_all_stale(&self) {
        self.cache.mark_all_stale();
    }

    /// Mark whatever `path` points at stale: a root document, or one cached
    /// row of an included collection of a cached root document. Returns
    /// false when the path belongs to another table or nothing is cached.
    pub fn mark_stale_path(&self, path: &DocumentPath) -> bool {
        if path.document_type() != self.entity.table_name() {
            return false;
        }
        let root_id = path.root_document_id();
        match (path.detail_id(), path.parent()) {
            (None, _) => self.mark_stale(root_id),
            (Some(detail_id), Some(parent)) if parent.is_root() => self
                .cache
                .with_document(root_id, |document| {
                    document
                        .included(detail_id)
                        .map(|collection| collection.mark_stale(path.document_id()))
                        .unwrap_or(false)
                })
                .unwrap_or(false),
            _ => false,
        }
    }

    /// What-if duplicate: an independent, writable deep copy of every cached
    /// document.
    pub fn copy(&self) -> RootDocumentsCollection {
        RootDocumentsCollection {
            entity: Arc::clone(&self.entity),
            cache: Arc::new(self.cache.copy(CopyMode::WritableCopy)),
            config: self.config,
        }
    }
}
