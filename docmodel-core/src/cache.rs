//! Per-session document cache
//!
//! [`DocumentsCache`] keeps the live documents of one collection in
//! insertion order together with the set of ids considered stale. Staleness
//! marks may arrive from notification threads while a request is working
//! with the same cache, so every method takes `&self` and the state sits
//! behind one mutex.

use crate::document::{CopyMode, Document};
use docmodel_types::DocumentId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{trace, warn};

#[derive(Debug, Default)]
struct Inner {
    order: Vec<DocumentId>,
    documents: HashMap<DocumentId, Document>,
    /// Always a subset of the keys of `documents`.
    stale: HashSet<DocumentId>,
}

impl Inner {
    fn insert(&mut self, document: Document) -> bool {
        let id = document.id();
        self.stale.remove(&id);
        let replaced = self.documents.insert(id, document).is_some();
        if !replaced {
            self.order.push(id);
        }
        replaced
    }
}

/// Hit/miss counters of [`DocumentsCache`] lookups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub stale: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Insertion-ordered `id -> Document` map plus a stale-id set
#[derive(Debug, Default)]
pub struct DocumentsCache {
    inner: Mutex<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DocumentsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; the id is no longer stale.
    pub fn put(&self, document: Document) {
        self.inner.lock().insert(document);
    }

    /// Insert or overwrite a batch. Overwrites are logged, not rejected.
    pub fn put_all(&self, documents: impl IntoIterator<Item = Document>) {
        let mut inner = self.inner.lock();
        for document in documents {
            let path = document.path().clone();
            if inner.insert(document) {
                warn!(document = %path, "document overwritten while loading");
            }
        }
    }

    /// Drop the document; its id is no longer stale.
    pub fn remove_by_id(&self, id: DocumentId) -> Option<Document> {
        let mut inner = self.inner.lock();
        inner.stale.remove(&id);
        let removed = inner.documents.remove(&id);
        if removed.is_some() {
            inner.order.retain(|existing| *existing != id);
        }
        removed
    }

    /// Drop every persisted document, keeping unsaved new ones.
    pub fn clear_all_except_new_documents(&self) {
        let mut inner = self.inner.lock();
        let Inner {
            order,
            documents,
            stale,
        } = &mut *inner;

        let before = documents.len();
        documents.retain(|_, document| document.is_new());
        order.retain(|id| documents.contains_key(id));
        stale.retain(|id| documents.contains_key(id));
        trace!(
            removed = before - documents.len(),
            kept = documents.len(),
            "cleared non-new documents"
        );
    }

    pub fn mark_all_stale(&self) {
        let mut inner = self.inner.lock();
        let ids: Vec<DocumentId> = inner.order.clone();
        inner.stale.extend(ids);
    }

    pub fn mark_all_not_stale(&self) {
        self.inner.lock().stale.clear();
    }

    /// Mark one cached document stale. Returns false when it is not cached.
    pub fn mark_stale(&self, id: DocumentId) -> bool {
        let mut inner = self.inner.lock();
        if inner.documents.contains_key(&id) {
            inner.stale.insert(id);
            true
        } else {
            false
        }
    }

    pub fn mark_not_stale(&self, id: DocumentId) {
        self.inner.lock().stale.remove(&id);
    }

    /// Whether any cached document is stale.
    pub fn is_stale(&self) -> bool {
        !self.inner.lock().stale.is_empty()
    }

    pub fn is_stale_id(&self, id: DocumentId) -> bool {
        self.inner.lock().stale.contains(&id)
    }

    /// Run `f` on the cached document, holding the cache lock.
    pub fn with_document<R>(&self, id: DocumentId, f: impl FnOnce(&Document) -> R) -> Option<R> {
        let inner = self.inner.lock();
        let result = inner.documents.get(&id).map(f);
        self.record(result.is_some());
        result
    }

    /// Run `f` on the cached document mutably, holding the cache lock.
    pub fn with_document_mut<R>(
        &self,
        id: DocumentId,
        f: impl FnOnce(&mut Document) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock();
        let result = inner.documents.get_mut(&id).map(f);
        self.record(result.is_some());
        result
    }

    /// Read-only snapshot of a cached document.
    pub fn get_by_id(&self, id: DocumentId) -> Option<Document> {
        self.with_document(id, |document| document.copy(CopyMode::ReadonlySnapshot))
    }

    /// Apply `f` to every cached document in insertion order. Does not count
    /// as lookups in [`DocumentsCache::stats`].
    pub fn map_documents<R>(&self, mut f: impl FnMut(&Document) -> R) -> Vec<R> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.documents.get(id))
            .map(|document| f(document))
            .collect()
    }

    /// Cached ids in insertion order.
    pub fn ids(&self) -> Vec<DocumentId> {
        self.inner.lock().order.clone()
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.inner.lock().documents.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move the document cached under `old` to `new` (after the store
    /// assigned a persisted id), keeping its position.
    pub fn rekey(&self, old: DocumentId, new: DocumentId) {
        if old == new {
            return;
        }
        let mut inner = self.inner.lock();
        let Some(document) = inner.documents.remove(&old) else {
            return;
        };
        if inner.documents.insert(new, document).is_some() {
            warn!(id = %new, replaced = %old, "rekey replaced a cached document");
            inner.order.retain(|id| *id != old);
        } else {
            for id in inner.order.iter_mut().filter(|id| **id == old) {
                *id = new;
            }
        }
        if inner.stale.remove(&old) {
            inner.stale.insert(new);
        }
    }

    /// Deep copy of every document and of the stale set.
    pub fn copy(&self, mode: CopyMode) -> DocumentsCache {
        let inner = self.inner.lock();
        let documents = inner
            .documents
            .iter()
            .map(|(id, document)| (*id, document.copy(mode)))
            .collect();
        DocumentsCache {
            inner: Mutex::new(Inner {
                order: inner.order.clone(),
                documents,
                stale: inner.stale.clone(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: inner.documents.len(),
            stale: inner.stale.len(),
        }
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DocumentFieldDescriptor, EntityDescriptor};
    use crate::repository::InMemoryDocumentsRepository;
    use crate::values::FieldValue;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn entity() -> Arc<EntityDescriptor> {
        EntityDescriptor::builder("C_Order", Arc::new(InMemoryDocumentsRepository::new()))
            .field(DocumentFieldDescriptor::builder("DocumentNo"))
            .build()
            .unwrap()
    }

    fn persisted(entity: &Arc<EntityDescriptor>, id: i32) -> Document {
        let values =
            BTreeMap::from([("DocumentNo".to_string(), FieldValue::from(format!("SO-{id}")))]);
        Document::from_values(Arc::clone(entity), DocumentId::of(id), &values, None).unwrap()
    }

    #[test]
    fn test_put_mark_remove() {
        let entity = entity();
        let cache = DocumentsCache::new();
        cache.put(persisted(&entity, 1));

        cache.mark_all_stale();
        assert!(cache.is_stale_id(DocumentId::of(1)));
        assert!(cache.is_stale());

        assert!(cache.remove_by_id(DocumentId::of(1)).is_some());
        assert!(!cache.is_stale_id(DocumentId::of(1)));
        assert!(!cache.is_stale());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_clears_staleness() {
        let entity = entity();
        let cache = DocumentsCache::new();
        cache.put(persisted(&entity, 1));
        assert!(cache.mark_stale(DocumentId::of(1)));
        cache.put_all([persisted(&entity, 1), persisted(&entity, 2)]);

        assert!(!cache.is_stale());
        assert_eq!(cache.ids(), vec![DocumentId::of(1), DocumentId::of(2)]);
    }

    #[test]
    fn test_only_cached_ids_go_stale() {
        let cache = DocumentsCache::new();
        assert!(!cache.mark_stale(DocumentId::of(9)));
        assert!(!cache.is_stale_id(DocumentId::of(9)));
    }

    #[test]
    fn test_clear_keeps_new_documents() {
        let entity = entity();
        let cache = DocumentsCache::new();
        let new = Document::new_with_defaults(Arc::clone(&entity), None);
        let new_id = new.id();
        cache.put(persisted(&entity, 1));
        cache.put(new);
        cache.mark_all_stale();

        cache.clear_all_except_new_documents();
        assert_eq!(cache.ids(), vec![new_id]);
        assert!(cache.is_stale_id(new_id));
        assert!(!cache.is_stale_id(DocumentId::of(1)));
    }

    #[test]
    fn test_rekey_keeps_order() {
        let entity = entity();
        let cache = DocumentsCache::new();
        cache.put(persisted(&entity, 1));
        cache.put(persisted(&entity, 2));
        cache.rekey(DocumentId::of(1), DocumentId::of(10));

        assert_eq!(cache.ids(), vec![DocumentId::of(10), DocumentId::of(2)]);
        assert!(cache.contains(DocumentId::of(10)));
    }

    #[test]
    fn test_rekey_onto_cached_id() {
        let entity = entity();
        let cache = DocumentsCache::new();
        cache.put(persisted(&entity, 1));
        cache.put(persisted(&entity, 2));
        cache.put(persisted(&entity, 3));
        cache.rekey(DocumentId::of(1), DocumentId::of(2));

        assert_eq!(cache.ids(), vec![DocumentId::of(2), DocumentId::of(3)]);
        assert_eq!(cache.len(), 2);
        let document_no =
            cache.with_document(DocumentId::of(2), |d| d.value("DocumentNo").cloned());
        assert_eq!(document_no, Some(Some(FieldValue::from("SO-1"))));
    }

    #[test]
    fn test_copy_is_independent() {
        let entity = entity();
        let cache = DocumentsCache::new();
        cache.put(persisted(&entity, 1));
        let copy = cache.copy(CopyMode::WritableCopy);

        cache
            .with_document_mut(DocumentId::of(1), |document| {
                document.set_value("DocumentNo", Some(FieldValue::from("changed")), None)
            })
            .unwrap()
            .unwrap();

        let original = copy.get_by_id(DocumentId::of(1)).unwrap();
        assert_eq!(original.value("DocumentNo"), Some(&FieldValue::from("SO-1")));
    }

    #[test]
    fn test_stats() {
        let entity = entity();
        let cache = DocumentsCache::new();
        cache.put(persisted(&entity, 1));
        assert!(cache.get_by_id(DocumentId::of(1)).is_some());
        assert!(cache.get_by_id(DocumentId::of(2)).is_none());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_concurrent_stale_marks() {
        let entity = entity();
        let cache = Arc::new(DocumentsCache::new());
        for id in 1..=20 {
            cache.put(persisted(&entity, id));
        }

        let handles: Vec<_> = (1..=20)
            .map(|id| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.mark_stale(DocumentId::of(id)))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(cache.stats().stale, 20);
    }
}
