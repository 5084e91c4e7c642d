//! Cached included documents

use super::{child_not_found, IncludedDocumentsCollection};
use crate::cache::DocumentsCache;
use crate::descriptor::EntityDescriptor;
use crate::document::{save_document, CopyMode, Document, DocumentParent, DocumentValidStatus};
use crate::error::{DocumentError, Result};
use crate::logic::{LogicExpression, SharedLogic};
use crate::repository::DocumentQuery;
use crate::values::FieldValue;
use docmodel_types::{DetailId, DocumentId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Child rows loaded once (on first access) and kept in a [`DocumentsCache`].
#[derive(Debug)]
pub struct CachedIncludedDocumentsCollection {
    detail_id: DetailId,
    entity: Arc<EntityDescriptor>,
    cache: DocumentsCache,
    fully_loaded: AtomicBool,
    /// Set by [`IncludedDocumentsCollection::mark_stale_all`]; the next read
    /// reloads the whole set.
    all_stale: AtomicBool,
    writable: bool,
}

impl CachedIncludedDocumentsCollection {
    /// Collection of a persisted parent; rows are loaded on first read.
    pub fn new(entity: Arc<EntityDescriptor>) -> Self {
        Self::with_state(entity, false)
    }

    /// Collection of a new parent: there is nothing stored to load.
    pub fn new_empty(entity: Arc<EntityDescriptor>) -> Self {
        Self::with_state(entity, true)
    }

    fn with_state(entity: Arc<EntityDescriptor>, fully_loaded: bool) -> Self {
        let detail_id = entity
            .detail_id()
            .cloned()
            .unwrap_or_else(|| DetailId::new(entity.table_name()));
        Self {
            detail_id,
            entity,
            cache: DocumentsCache::new(),
            fully_loaded: AtomicBool::new(fully_loaded),
            all_stale: AtomicBool::new(false),
            writable: true,
        }
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.fully_loaded.load(Ordering::Acquire)
    }

    pub fn cache(&self) -> &DocumentsCache {
        &self.cache
    }

    fn query(&self, parent: &DocumentParent) -> DocumentQuery {
        DocumentQuery::new(Arc::clone(&self.entity)).parent(parent.clone())
    }

    fn detach(&self, document: Document) -> Document {
        if self.writable {
            document
        } else {
            document.copy(CopyMode::ReadonlySnapshot)
        }
    }

    /// Bring the cache up to date: full load on first access or after
    /// `mark_stale_all`, single-row reloads for individually stale rows.
    fn load_if_needed(&self, parent: &DocumentParent) -> Result<()> {
        if !parent.id().is_persisted() {
            return Ok(());
        }

        if !self.is_fully_loaded() || self.all_stale.load(Ordering::Acquire) {
            let documents = self.entity.repository().retrieve_documents(&self.query(parent))?;
            debug!(
                parent = %parent.path(),
                detail = %self.detail_id,
                count = documents.len(),
                "loading included documents"
            );
            self.cache.clear_all_except_new_documents();
            self.cache
                .put_all(documents.into_iter().map(|document| self.detach(document)));
            self.cache.mark_all_not_stale();
            self.all_stale.store(false, Ordering::Release);
            self.fully_loaded.store(true, Ordering::Release);
            return Ok(());
        }

        if self.cache.is_stale() {
            for id in self.cache.ids() {
                if self.cache.is_stale_id(id) {
                    self.reload(parent, id)?;
                }
            }
        }
        Ok(())
    }

    fn reload(&self, parent: &DocumentParent, id: DocumentId) -> Result<()> {
        trace!(
            parent = %parent.path(),
            detail = %self.detail_id,
            id = %id,
            "reloading stale document"
        );
        let query = self.query(parent).record_id(id);
        match self.entity.repository().retrieve_document(&query)? {
            Some(document) => self.cache.put(self.detach(document)),
            None => {
                self.cache.remove_by_id(id);
            }
        }
        Ok(())
    }

    /// Anything but `True` refuses, including `NoResult` for a logic that
    /// names a field the parent does not have.
    fn assert_allowed(
        &self,
        parent: &DocumentParent,
        logic: &SharedLogic,
        action: &str,
    ) -> Result<()> {
        let reason = if !parent.is_writable() {
            Some(format!("cannot {action} {}: parent is not writable", self.detail_id))
        } else if parent.is_processed() {
            Some(format!("cannot {action} {}: parent is processed", self.detail_id))
        } else if !logic.evaluate(parent).is_true() {
            Some(format!("{action} {} is not allowed", self.detail_id))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(DocumentError::InvalidDocumentState {
                path: parent.path().clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl IncludedDocumentsCollection for CachedIncludedDocumentsCollection {
    fn detail_id(&self) -> &DetailId {
        &self.detail_id
    }

    fn entity(&self) -> &Arc<EntityDescriptor> {
        &self.entity
    }

    fn documents(&self, parent: &DocumentParent) -> Result<Vec<Document>> {
        self.load_if_needed(parent)?;
        Ok(self
            .cache
            .map_documents(|document| document.copy(CopyMode::ReadonlySnapshot)))
    }

    fn document_by_id(&self, parent: &DocumentParent, id: DocumentId) -> Result<Document> {
        self.load_if_needed(parent)?;
        self.cache
            .get_by_id(id)
            .ok_or_else(|| child_not_found(parent, &self.detail_id, id))
    }

    fn with_document_mut(
        &mut self,
        parent: &DocumentParent,
        id: DocumentId,
        f: &mut dyn FnMut(&mut Document) -> Result<()>,
    ) -> Result<()> {
        self.load_if_needed(parent)?;
        self.cache
            .with_document_mut(id, |document| f(document))
            .ok_or_else(|| child_not_found(parent, &self.detail_id, id))?
    }

    fn assert_new_document_allowed(&self, parent: &DocumentParent) -> Result<()> {
        self.assert_allowed(parent, self.entity.allow_create_logic(), "create")
    }

    fn create_new_document(&mut self, parent: &DocumentParent) -> Result<Document> {
        self.assert_new_document_allowed(parent)?;
        let line_no = self.next_line_no(parent)?;

        let mut document = self
            .entity
            .repository()
            .create_new_document(&self.entity, Some(parent))?;
        document.init_field_by_name(
            self.entity.line_no_field(),
            Some(FieldValue::Integer(line_no)),
        );
        document.update_all_dependencies();
        trace!(document = %document.path(), line_no, "included document created");

        let snapshot = document.copy(CopyMode::ReadonlySnapshot);
        self.cache.put(document);
        Ok(snapshot)
    }

    fn delete_documents(&mut self, parent: &DocumentParent, ids: &[DocumentId]) -> Result<()> {
        self.assert_allowed(parent, self.entity.allow_delete_logic(), "delete")?;
        self.load_if_needed(parent)?;

        for &id in ids {
            let persisted = self
                .cache
                .with_document(id, |document| {
                    (!document.is_new()).then(|| document.copy(CopyMode::ReadonlySnapshot))
                })
                .ok_or_else(|| child_not_found(parent, &self.detail_id, id))?;
            if let Some(document) = persisted {
                self.entity.repository().delete(&document)?;
            }
            self.cache.remove_by_id(id);
            debug!(
                parent = %parent.path(),
                detail = %self.detail_id,
                id = %id,
                "included document deleted"
            );
        }
        Ok(())
    }

    fn check_and_get_valid_status(&self) -> DocumentValidStatus {
        self.cache
            .map_documents(Document::check_and_get_valid_status)
            .into_iter()
            .find(|status| !status.is_valid())
            .unwrap_or_else(DocumentValidStatus::valid)
    }

    fn has_changes_recursively(&self) -> bool {
        self.cache
            .map_documents(Document::has_changes_recursively)
            .into_iter()
            .any(|changed| changed)
    }

    fn save_if_has_changes(&mut self, parent: &DocumentParent) -> Result<()> {
        for id in self.cache.ids() {
            let saved = self.cache.with_document_mut(id, |document| -> Result<Option<DocumentId>> {
                if !document.has_changes_recursively() {
                    return Ok(None);
                }
                let status = document.check_and_get_valid_status();
                if !status.is_valid() {
                    debug!(
                        document = %document.path(),
                        status = %status,
                        "skipping invalid document"
                    );
                    return Ok(None);
                }
                save_document(document)?;
                Ok(Some(document.id()))
            });

            if let Some(new_id) = saved.transpose()?.flatten() {
                self.cache.rekey(id, new_id);
                self.cache.mark_not_stale(new_id);
            }
        }
        trace!(parent = %parent.path(), detail = %self.detail_id, "included documents saved");
        Ok(())
    }

    fn mark_stale_all(&self) {
        self.all_stale.store(true, Ordering::Release);
        self.cache.mark_all_stale();
    }

    fn mark_stale(&self, id: DocumentId) -> bool {
        self.cache.mark_stale(id)
    }

    fn next_line_no(&self, parent: &DocumentParent) -> Result<i32> {
        self.load_if_needed(parent)?;
        let field = self.entity.line_no_field();
        let max = self
            .cache
            .map_documents(|document| document.value(field).and_then(FieldValue::as_i32))
            .into_iter()
            .flatten()
            .max();
        Ok(max.unwrap_or(0) + self.entity.line_no_increment())
    }

    fn reparent(&mut self, parent: &DocumentParent) {
        for id in self.cache.ids() {
            self.cache.with_document_mut(id, |document| document.reparent(parent));
        }
    }

    fn copy(&self, mode: CopyMode) -> Box<dyn IncludedDocumentsCollection> {
        Box::new(CachedIncludedDocumentsCollection {
            detail_id: self.detail_id.clone(),
            entity: Arc::clone(&self.entity),
            cache: self.cache.copy(mode),
            fully_loaded: AtomicBool::new(self.is_fully_loaded()),
            all_stale: AtomicBool::new(self.all_stale.load(Ordering::Acquire)),
            writable: mode.is_writable(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DocumentFieldDescriptor;
    use crate::logic::{ConstantDefault, ConstantLogic, FnLogic, LogicResult};
    use crate::repository::{DocumentsRepository, InMemoryDocumentsRepository};
    use crate::values::WidgetType;
    use std::collections::BTreeMap;

    struct Fixture {
        repository: Arc<InMemoryDocumentsRepository>,
        order: Document,
        lines: DetailId,
    }

    fn doc_status_is(status: &'static str) -> SharedLogic {
        FnLogic::shared(format!("DocStatus={status}"), ["DocStatus"], move |ctx| {
            ctx.value("DocStatus").and_then(FieldValue::as_str) == Some(status)
        })
    }

    fn fixture(stored_lines: &[i32]) -> Fixture {
        fixture_with(stored_lines, doc_status_is("DR"), ConstantLogic::shared(true))
    }

    fn fixture_with(
        stored_lines: &[i32],
        allow_create: SharedLogic,
        allow_delete: SharedLogic,
    ) -> Fixture {
        let repository = Arc::new(InMemoryDocumentsRepository::new());
        let lines = EntityDescriptor::builder("C_OrderLine", repository.clone())
            .field(
                DocumentFieldDescriptor::builder("C_OrderLine_ID")
                    .widget_type(WidgetType::Integer)
                    .key(true),
            )
            .field(
                DocumentFieldDescriptor::builder("C_Order_ID")
                    .widget_type(WidgetType::Integer)
                    .parent_link(true),
            )
            .field(DocumentFieldDescriptor::builder("Line").widget_type(WidgetType::Integer))
            .field(
                DocumentFieldDescriptor::builder("M_Product_ID")
                    .widget_type(WidgetType::Integer)
                    .mandatory(true),
            )
            .allow_create_logic(allow_create)
            .allow_delete_logic(allow_delete);
        let entity = EntityDescriptor::builder("C_Order", repository.clone())
            .field(
                DocumentFieldDescriptor::builder("C_Order_ID")
                    .widget_type(WidgetType::Integer)
                    .key(true),
            )
            .field(
                DocumentFieldDescriptor::builder("DocStatus")
                    .default_value(ConstantDefault::of("DR")),
            )
            .included("lines", lines)
            .build()
            .unwrap();

        let order_id = repository.insert_row(
            "C_Order",
            BTreeMap::from([("DocStatus".to_string(), FieldValue::from("DR"))]),
        );
        for line in stored_lines {
            repository.insert_row(
                "C_OrderLine",
                BTreeMap::from([
                    ("C_Order_ID".to_string(), FieldValue::Integer(order_id.to_int())),
                    ("Line".to_string(), FieldValue::Integer(*line)),
                    ("M_Product_ID".to_string(), FieldValue::Integer(100)),
                ]),
            );
        }

        let order = repository
            .retrieve_document(&DocumentQuery::new(entity).record_id(order_id))
            .unwrap()
            .unwrap();
        Fixture {
            repository,
            order,
            lines: DetailId::new("lines"),
        }
    }

    #[test]
    fn test_lazy_load() {
        let f = fixture(&[10, 20]);
        let collection = f.order.included(&f.lines).unwrap();
        assert!(!collection.has_changes_recursively());

        let lines = f.order.included_documents(&f.lines).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| !line.is_writable()));
    }

    #[test]
    fn test_next_line_no() {
        let mut f = fixture(&[10, 30]);
        let line = f.order.create_included_document(&f.lines).unwrap();
        assert_eq!(line.value("Line"), Some(&FieldValue::Integer(40)));
        assert_eq!(line.value("C_Order_ID"), Some(&FieldValue::Integer(f.order.id().to_int())));

        let mut empty = fixture(&[]);
        let first = empty.order.create_included_document(&empty.lines).unwrap();
        assert_eq!(first.value("Line"), Some(&FieldValue::Integer(10)));
    }

    #[test]
    fn test_create_respects_allow_logic() {
        let mut f = fixture(&[]);
        f.order.set_value("DocStatus", Some(FieldValue::from("CO")), None).unwrap();
        let err = f.order.create_included_document(&f.lines).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidDocumentState { .. }));

        f.order.set_value("DocStatus", Some(FieldValue::from("DR")), None).unwrap();
        f.order.set_processed(true);
        let err = f.order.create_included_document(&f.lines).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidDocumentState { .. }));
    }

    #[test]
    fn test_save_new_line() {
        let mut f = fixture(&[10]);
        let line = f.order.create_included_document(&f.lines).unwrap();
        assert!(f.order.has_changes_recursively());

        let status = f.order.check_and_get_valid_status();
        assert!(!status.is_valid());
        assert_eq!(status.detail_id(), Some(&f.lines));

        f.order
            .with_included_document_mut(&f.lines, line.id(), |line| {
                line.set_value("M_Product_ID", Some(FieldValue::Integer(200)), None)
            })
            .unwrap();
        f.order.save_included_if_has_changes().unwrap();

        assert_eq!(f.repository.row_count("C_OrderLine"), 2);
        assert!(!f.order.has_changes_recursively());
        let ids: Vec<DocumentId> = f
            .order
            .included_documents(&f.lines)
            .unwrap()
            .iter()
            .map(Document::id)
            .collect();
        assert!(ids.iter().all(DocumentId::is_persisted));
    }

    #[test]
    fn test_delete() {
        let mut f = fixture(&[10, 20]);
        let lines = f.order.included_documents(&f.lines).unwrap();
        f.order.delete_included_documents(&f.lines, &[lines[0].id()]).unwrap();

        assert_eq!(f.repository.row_count("C_OrderLine"), 1);
        assert_eq!(f.order.included_documents(&f.lines).unwrap().len(), 1);

        let err = f
            .order
            .delete_included_documents(&f.lines, &[lines[0].id()])
            .unwrap_err();
        assert!(matches!(err, DocumentError::DocumentNotFound { .. }));
    }

    #[test]
    fn test_stale_reload() {
        let f = fixture(&[10]);
        let line_id = f.order.included_documents(&f.lines).unwrap()[0].id();
        f.repository
            .update_row("C_OrderLine", line_id, "Line", Some(FieldValue::Integer(15)))
            .unwrap();

        let line = f.order.included_document(&f.lines, line_id).unwrap();
        assert_eq!(line.value("Line"), Some(&FieldValue::Integer(10)));

        let collection = f.order.included(&f.lines).unwrap();
        assert!(!collection.mark_stale(DocumentId::of(999_999)));
        assert!(collection.mark_stale(line_id));
        let line = f.order.included_document(&f.lines, line_id).unwrap();
        assert_eq!(line.value("Line"), Some(&FieldValue::Integer(15)));
    }

    #[test]
    fn test_create_with_null_parent_field() {
        let not_completed = FnLogic::shared("DocStatus!=CO", ["DocStatus"], |ctx| {
            ctx.value("DocStatus").and_then(FieldValue::as_str) != Some("CO")
        });
        let mut f = fixture_with(&[], not_completed.clone(), ConstantLogic::shared(true));
        f.order.set_value("DocStatus", None, None).unwrap();

        assert_eq!(not_completed.evaluate(&f.order), LogicResult::True);
        assert_eq!(not_completed.evaluate(&f.order.parent_context()), LogicResult::True);
        let line = f.order.create_included_document(&f.lines).unwrap();
        assert_eq!(line.value("Line"), Some(&FieldValue::Integer(10)));
    }

    #[test]
    fn test_delete_respects_allow_logic() {
        let mut f = fixture_with(&[10, 20], ConstantLogic::shared(true), doc_status_is("DR"));
        let lines = f.order.included_documents(&f.lines).unwrap();

        f.order.set_value("DocStatus", Some(FieldValue::from("CO")), None).unwrap();
        let err = f
            .order
            .delete_included_documents(&f.lines, &[lines[0].id()])
            .unwrap_err();
        assert!(matches!(err, DocumentError::InvalidDocumentState { .. }));
        assert_eq!(f.repository.row_count("C_OrderLine"), 2);

        f.order.set_value("DocStatus", Some(FieldValue::from("DR")), None).unwrap();
        f.order.delete_included_documents(&f.lines, &[lines[0].id()]).unwrap();
        assert_eq!(f.repository.row_count("C_OrderLine"), 1);
    }

    #[test]
    fn test_delete_refused_without_logic_result() {
        let approved = FnLogic::shared("IsApproved=Y", ["IsApproved"], |_| true);
        let mut f = fixture_with(&[10], ConstantLogic::shared(true), approved.clone());
        assert_eq!(approved.evaluate(&f.order.parent_context()), LogicResult::NoResult);

        let lines = f.order.included_documents(&f.lines).unwrap();
        let err = f
            .order
            .delete_included_documents(&f.lines, &[lines[0].id()])
            .unwrap_err();
        assert!(matches!(err, DocumentError::InvalidDocumentState { .. }));
        assert_eq!(f.repository.row_count("C_OrderLine"), 1);
    }
}
