//! High-volume included documents

use super::{child_not_found, IncludedDocumentsCollection};
use crate::descriptor::EntityDescriptor;
use crate::document::{CopyMode, Document, DocumentParent, DocumentValidStatus};
use crate::error::{DocumentError, Result};
use crate::repository::DocumentQuery;
use docmodel_types::{DetailId, DocumentId};
use std::sync::Arc;

/// Child rows that are never cached: every read queries the repository.
///
/// The engine cannot change these rows; create, delete, edit and line
/// numbering fail with `OperationNotAllowed`.
#[derive(Debug, Clone)]
pub struct HighVolumeIncludedDocumentsCollection {
    detail_id: DetailId,
    entity: Arc<EntityDescriptor>,
}

impl HighVolumeIncludedDocumentsCollection {
    pub fn new(entity: Arc<EntityDescriptor>) -> Self {
        let detail_id = entity
            .detail_id()
            .cloned()
            .unwrap_or_else(|| DetailId::new(entity.table_name()));
        Self { detail_id, entity }
    }

    fn not_allowed(&self, operation: &str) -> DocumentError {
        DocumentError::operation_not_allowed(format!(
            "{operation} on high-volume {}",
            self.detail_id
        ))
    }
}

impl IncludedDocumentsCollection for HighVolumeIncludedDocumentsCollection {
    fn detail_id(&self) -> &DetailId {
        &self.detail_id
    }

    fn entity(&self) -> &Arc<EntityDescriptor> {
        &self.entity
    }

    fn documents(&self, parent: &DocumentParent) -> Result<Vec<Document>> {
        if !parent.id().is_persisted() {
            return Ok(Vec::new());
        }
        let query = DocumentQuery::new(Arc::clone(&self.entity)).parent(parent.clone());
        let documents = self.entity.repository().retrieve_documents(&query)?;
        Ok(documents
            .iter()
            .map(|document| document.copy(CopyMode::ReadonlySnapshot))
            .collect())
    }

    fn document_by_id(&self, parent: &DocumentParent, id: DocumentId) -> Result<Document> {
        if !parent.id().is_persisted() {
            return Err(child_not_found(parent, &self.detail_id, id));
        }
        let query = DocumentQuery::new(Arc::clone(&self.entity))
            .parent(parent.clone())
            .record_id(id);
        self.entity
            .repository()
            .retrieve_document(&query)?
            .map(|document| document.copy(CopyMode::ReadonlySnapshot))
            .ok_or_else(|| child_not_found(parent, &self.detail_id, id))
    }

    fn with_document_mut(
        &mut self,
        _parent: &DocumentParent,
        _id: DocumentId,
        _f: &mut dyn FnMut(&mut Document) -> Result<()>,
    ) -> Result<()> {
        Err(self.not_allowed("edit"))
    }

    fn assert_new_document_allowed(&self, _parent: &DocumentParent) -> Result<()> {
        Err(self.not_allowed("create"))
    }

    fn create_new_document(&mut self, _parent: &DocumentParent) -> Result<Document> {
        Err(self.not_allowed("create"))
    }

    fn delete_documents(&mut self, _parent: &DocumentParent, _ids: &[DocumentId]) -> Result<()> {
        Err(self.not_allowed("delete"))
    }

    fn check_and_get_valid_status(&self) -> DocumentValidStatus {
        DocumentValidStatus::valid()
    }

    fn has_changes_recursively(&self) -> bool {
        false
    }

    fn save_if_has_changes(&mut self, _parent: &DocumentParent) -> Result<()> {
        Ok(())
    }

    fn mark_stale_all(&self) {}

    fn mark_stale(&self, _id: DocumentId) -> bool {
        false
    }

    fn next_line_no(&self, _parent: &DocumentParent) -> Result<i32> {
        Err(self.not_allowed("line numbering"))
    }

    fn reparent(&mut self, _parent: &DocumentParent) {}

    fn copy(&self, _mode: CopyMode) -> Box<dyn IncludedDocumentsCollection> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DocumentFieldDescriptor;
    use crate::repository::{DocumentsRepository, InMemoryDocumentsRepository};
    use crate::values::{FieldValue, WidgetType};
    use std::collections::BTreeMap;

    fn order(repository: &Arc<InMemoryDocumentsRepository>, facts: usize) -> Document {
        let entity = EntityDescriptor::builder("C_Order", repository.clone())
            .field(
                DocumentFieldDescriptor::builder("C_Order_ID")
                    .widget_type(WidgetType::Integer)
                    .key(true),
            )
            .included(
                "facts",
                EntityDescriptor::builder("Fact_Acct", repository.clone())
                    .field(
                        DocumentFieldDescriptor::builder("Fact_Acct_ID")
                            .widget_type(WidgetType::Integer)
                            .key(true),
                    )
                    .field(
                        DocumentFieldDescriptor::builder("C_Order_ID")
                            .widget_type(WidgetType::Integer)
                            .parent_link(true),
                    )
                    .field(
                        DocumentFieldDescriptor::builder("Amount")
                            .widget_type(WidgetType::Amount),
                    )
                    .high_volume(true),
            )
            .build()
            .unwrap();

        let order_id = repository.insert_row("C_Order", BTreeMap::new());
        for i in 0..facts {
            repository.insert_row(
                "Fact_Acct",
                BTreeMap::from([
                    ("C_Order_ID".to_string(), FieldValue::Integer(order_id.to_int())),
                    ("Amount".to_string(), FieldValue::from(i as i32)),
                ]),
            );
        }
        repository
            .retrieve_document(&DocumentQuery::new(entity).record_id(order_id))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_reads_always_query() {
        let repository = Arc::new(InMemoryDocumentsRepository::new());
        let document = order(&repository, 2);
        let facts = DetailId::new("facts");
        assert_eq!(document.included_documents(&facts).unwrap().len(), 2);

        repository.insert_row(
            "Fact_Acct",
            BTreeMap::from([(
                "C_Order_ID".to_string(),
                FieldValue::Integer(document.id().to_int()),
            )]),
        );
        assert_eq!(document.included_documents(&facts).unwrap().len(), 3);
    }

    #[test]
    fn test_missing_row_carries_path() {
        let repository = Arc::new(InMemoryDocumentsRepository::new());
        let document = order(&repository, 0);
        let facts = DetailId::new("facts");

        let err = document
            .included_document(&facts, DocumentId::of(999_999))
            .unwrap_err();
        match err {
            DocumentError::DocumentNotFound { path } => {
                assert_eq!(path.to_string(), format!("C_Order/{}/facts/999999", document.id()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mutations_not_allowed() {
        let repository = Arc::new(InMemoryDocumentsRepository::new());
        let mut document = order(&repository, 1);
        let facts = DetailId::new("facts");

        let err = document.create_included_document(&facts).unwrap_err();
        assert!(matches!(err, DocumentError::OperationNotAllowed { .. }));
        let err = document
            .delete_included_documents(&facts, &[DocumentId::of(1)])
            .unwrap_err();
        assert!(matches!(err, DocumentError::OperationNotAllowed { .. }));

        let parent = document.parent_context();
        let collection = document.included(&facts).unwrap();
        assert!(matches!(
            collection.next_line_no(&parent),
            Err(DocumentError::OperationNotAllowed { .. })
        ));
        assert!(collection.check_and_get_valid_status().is_valid());
        assert!(!collection.has_changes_recursively());
    }
}
