//! Documents
//!
//! A [`Document`] is a live instance of an entity: one [`DocumentField`] per
//! field descriptor (in descriptor order) plus one included documents
//! collection per included entity. Field writes run the dependency
//! propagation synchronously, so the readonly, mandatory and displayed flags
//! are consistent as soon as [`Document::set_value`] returns.

use crate::collection::{
    CachedIncludedDocumentsCollection, HighVolumeIncludedDocumentsCollection,
    IncludedDocumentsCollection,
};
use crate::convert::to_boolean;
use crate::dependency::DependencyType;
use crate::descriptor::{DocumentFieldDescriptor, EntityDescriptor};
use crate::error::{DocumentError, Result};
use crate::field::DocumentField;
use crate::logic::{Evaluatee, LogicExpression};
use crate::repository::VersionToken;
use crate::status::DocumentRepositoryStatus;
use crate::values::{FieldValue, IntegerLookupValue, LookupValueByIdSupplier, ValueClass};
use docmodel_types::{DetailId, DocumentId, DocumentPath, WindowNo};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Name of the field that marks a document as processed
pub const PROCESSED_FIELD: &str = "Processed";

/// How [`Document::copy`] detaches the copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyMode {
    /// Independent copy for display; every write fails with `NotWritable`.
    ReadonlySnapshot,
    /// Independent, writable copy (e.g. a what-if duplicate of a session).
    WritableCopy,
}

impl CopyMode {
    pub fn is_writable(&self) -> bool {
        matches!(self, CopyMode::WritableCopy)
    }
}

/// Outcome of validating a document before save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentValidStatus {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail_id: Option<DetailId>,
}

impl DocumentValidStatus {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
            field_name: None,
            detail_id: None,
        }
    }

    pub fn invalid_field_mandatory(field_name: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some("mandatory field has no value".to_string()),
            field_name: Some(field_name.into()),
            detail_id: None,
        }
    }

    /// Wrap the status of an included document.
    pub fn invalid_included(detail_id: DetailId, inner: DocumentValidStatus) -> Self {
        Self {
            detail_id: Some(detail_id),
            ..inner
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    pub fn detail_id(&self) -> Option<&DetailId> {
        self.detail_id.as_ref()
    }
}

impl fmt::Display for DocumentValidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            return f.write_str("valid");
        }
        f.write_str("invalid")?;
        if let Some(detail_id) = &self.detail_id {
            write!(f, " in {detail_id}")?;
        }
        if let Some(field_name) = &self.field_name {
            write!(f, " ({field_name})")?;
        }
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}

/// What an included collection needs to know about its parent document:
/// where it lives, whether it may change, and its current values for
/// evaluating create/delete logic.
///
/// Every parent field is present in `values`; empty fields map to `None`,
/// so `has_variable` answers the same as on the [`Document`] itself.
#[derive(Debug, Clone)]
pub struct DocumentParent {
    path: DocumentPath,
    id: DocumentId,
    processed: bool,
    writable: bool,
    values: BTreeMap<String, Option<FieldValue>>,
}

impl DocumentParent {
    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

impl Evaluatee for DocumentParent {
    fn value(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name).and_then(Option::as_ref)
    }

    fn has_variable(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

/// A live entity instance
#[derive(Debug)]
pub struct Document {
    entity: Arc<EntityDescriptor>,
    id: DocumentId,
    window_no: WindowNo,
    path: DocumentPath,
    fields: Vec<DocumentField>,
    included: Vec<(DetailId, Box<dyn IncludedDocumentsCollection>)>,
    processed: bool,
    writable: bool,
    parent_link_id: Option<DocumentId>,
    repository_status: DocumentRepositoryStatus,
}

impl Document {
    /// Create a new document with a fresh temporary id.
    ///
    /// Default values are best effort: a failing default expression is
    /// logged and leaves its field unset.
    pub fn new_with_defaults(
        entity: Arc<EntityDescriptor>,
        parent: Option<&DocumentParent>,
    ) -> Document {
        let id = DocumentId::new_temporary();
        let mut document = Document::blank(entity, id, parent, true);

        for idx in 0..document.fields.len() {
            let descriptor = Arc::clone(document.fields[idx].descriptor());
            let value = match descriptor.default_value() {
                None => None,
                Some(expression) => match expression.evaluate(&document) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(
                            document = %document.path,
                            field = descriptor.field_name(),
                            mandatory = descriptor.mandatory_logic().is_constant_true(),
                            error = %e,
                            "default value evaluation failed; leaving field unset"
                        );
                        None
                    }
                },
            };
            document.init_field(idx, value);
        }

        if let (Some(parent), Some(link)) = (parent, document.entity.parent_link_field()) {
            let link = Arc::clone(link);
            document.init_field_by_name(link.field_name(), Some(id_value(&link, parent.id())));
        }

        document.update_all_dependencies();
        trace!(document = %document.path, "new document created");
        document
    }

    /// Build a document from a stored row. Values become both current and
    /// initial values; the key field is filled from `id`.
    pub fn from_values(
        entity: Arc<EntityDescriptor>,
        id: DocumentId,
        values: &BTreeMap<String, FieldValue>,
        parent: Option<&DocumentParent>,
    ) -> Result<Document> {
        let mut document = Document::blank(entity, id, parent, false);

        for field in &mut document.fields {
            let descriptor = Arc::clone(field.descriptor());
            let raw = if descriptor.is_key() {
                Some(id_value(&descriptor, id))
            } else {
                values.get(descriptor.field_name()).cloned()
            };
            field.set_initial_value(raw, None)?;
        }

        document.processed = document
            .value(PROCESSED_FIELD)
            .map(to_boolean)
            .unwrap_or(false);
        document.update_all_dependencies();
        Ok(document)
    }

    fn blank(
        entity: Arc<EntityDescriptor>,
        id: DocumentId,
        parent: Option<&DocumentParent>,
        new: bool,
    ) -> Document {
        let path = match (parent, entity.detail_id()) {
            (Some(parent), Some(detail_id)) => {
                parent.path().create_child_path(detail_id.clone(), id)
            }
            _ => DocumentPath::root(entity.table_name(), id),
        };

        let fields = entity
            .fields()
            .iter()
            .map(|descriptor| DocumentField::new(Arc::clone(descriptor)))
            .collect();

        let included = entity
            .included_entities()
            .iter()
            .filter_map(|child| {
                let detail_id = child.detail_id()?.clone();
                let collection: Box<dyn IncludedDocumentsCollection> = if child.is_high_volume() {
                    Box::new(HighVolumeIncludedDocumentsCollection::new(Arc::clone(child)))
                } else if new {
                    Box::new(CachedIncludedDocumentsCollection::new_empty(Arc::clone(child)))
                } else {
                    Box::new(CachedIncludedDocumentsCollection::new(Arc::clone(child)))
                };
                Some((detail_id, collection))
            })
            .collect();

        Document {
            entity,
            id,
            window_no: WindowNo::next(),
            path,
            fields,
            included,
            processed: false,
            writable: true,
            parent_link_id: parent.map(DocumentParent::id),
            repository_status: DocumentRepositoryStatus::new(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn entity(&self) -> &Arc<EntityDescriptor> {
        &self.entity
    }

    pub fn window_no(&self) -> WindowNo {
        self.window_no
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    pub fn parent_link_id(&self) -> Option<DocumentId> {
        self.parent_link_id
    }

    /// Not persisted yet: the id is `NEW` or a temporary id.
    pub fn is_new(&self) -> bool {
        !self.id.is_persisted()
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    /// Freeze the document: no more field writes or child row changes.
    pub fn set_processed(&mut self, processed: bool) {
        self.processed = processed;
    }

    /// False for read-only snapshots.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn assert_writable(&self) -> Result<()> {
        if self.processed {
            return Err(DocumentError::DocumentProcessed {
                path: self.path.clone(),
            });
        }
        if !self.writable {
            return Err(DocumentError::NotWritable {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    /// Fields in descriptor order.
    pub fn fields(&self) -> &[DocumentField] {
        &self.fields
    }

    pub fn field(&self, field_name: &str) -> Result<&DocumentField> {
        self.entity
            .field_index(field_name)
            .map(|idx| &self.fields[idx])
            .ok_or_else(|| self.field_not_found(field_name))
    }

    pub fn value(&self, field_name: &str) -> Option<&FieldValue> {
        self.entity
            .field_index(field_name)
            .and_then(|idx| self.fields[idx].value())
    }

    pub fn repository_status(&self) -> &DocumentRepositoryStatus {
        &self.repository_status
    }

    /// Ask the repository whether the stored row moved past the version this
    /// document was loaded with. Never fails; see
    /// [`DocumentRepositoryStatus::check_staled`].
    pub fn check_staled(&mut self) -> bool {
        self.repository_status.check_staled(&self.entity, self.id)
    }

    pub fn mark_staled(&mut self) {
        self.repository_status.mark_staled();
    }

    /// Engine write: convert `raw`, store it and recompute every dependent.
    pub fn set_value(
        &mut self,
        field_name: &str,
        raw: Option<FieldValue>,
        lookups: Option<&dyn LookupValueByIdSupplier>,
    ) -> Result<()> {
        self.assert_writable()?;
        let idx = self
            .entity
            .field_index(field_name)
            .ok_or_else(|| self.field_not_found(field_name))?;

        if self.fields[idx].set_value(raw, lookups)? {
            self.propagate(field_name);
        }
        Ok(())
    }

    /// User write: like [`Document::set_value`], but refuses fields that are
    /// currently read-only (unless they are always updateable).
    pub fn process_value_change(
        &mut self,
        field_name: &str,
        raw: Option<FieldValue>,
        lookups: Option<&dyn LookupValueByIdSupplier>,
    ) -> Result<()> {
        self.assert_writable()?;
        let field = self.field(field_name)?;
        if field.is_readonly() && !field.descriptor().is_always_updateable() {
            return Err(DocumentError::FieldReadonly {
                path: self.path.clone(),
                field_name: field_name.to_string(),
            });
        }
        self.set_value(field_name, raw, lookups)
    }

    /// Run every recomputation triggered by a change of `changed_field`,
    /// following virtual field values until nothing changes any more.
    fn propagate(&mut self, changed_field: &str) {
        let entity = Arc::clone(&self.entity);
        let mut queue = VecDeque::from([changed_field.to_string()]);

        while let Some(changed) = queue.pop_front() {
            for dependency in entity.dependencies().triggers_of(&changed) {
                let Some(idx) = entity.field_index(&dependency.field_name) else {
                    continue;
                };
                trace!(
                    document = %self.path,
                    changed = %changed,
                    target = %dependency.field_name,
                    kind = %dependency.kind,
                    "recompute"
                );

                match dependency.kind {
                    DependencyType::FieldValue => {
                        if self.recompute_virtual_value(idx) {
                            queue.push_back(dependency.field_name.clone());
                        }
                    }
                    kind => {
                        let mut field = self.fields[idx].clone();
                        field.update_logic(kind, &*self);
                        self.fields[idx] = field;
                    }
                }
            }
        }
    }

    /// Returns whether the virtual field's value changed.
    fn recompute_virtual_value(&mut self, idx: usize) -> bool {
        let descriptor = Arc::clone(self.fields[idx].descriptor());
        let Some(provider) = descriptor.value_provider() else {
            return false;
        };

        let value = match provider.calculate(&*self) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    document = %self.path,
                    field = descriptor.field_name(),
                    error = %e,
                    "virtual field value calculation failed"
                );
                return false;
            }
        };

        match self.fields[idx].set_value(value, None) {
            Ok(changed) => changed,
            Err(e) => {
                warn!(document = %self.path, error = %e, "virtual field value rejected");
                false
            }
        }
    }

    /// Recompute every virtual value and every logic flag once. Used after
    /// bulk loading, when no previous state is known.
    pub fn update_all_dependencies(&mut self) {
        for idx in 0..self.fields.len() {
            let is_virtual = self.fields[idx].descriptor().value_provider().is_some();
            if is_virtual && self.recompute_virtual_value(idx) {
                let name = self.fields[idx].field_name().to_string();
                self.propagate(&name);
            }
        }

        for idx in 0..self.fields.len() {
            let mut field = self.fields[idx].clone();
            for kind in [
                DependencyType::ReadonlyLogic,
                DependencyType::DisplayLogic,
                DependencyType::MandatoryLogic,
            ] {
                field.update_logic(kind, &*self);
            }
            self.fields[idx] = field;
        }
    }

    /// Current values by field name, for logic evaluation.
    pub fn as_evaluatee(&self) -> &dyn Evaluatee {
        self
    }

    /// Values that differ from their initial value (virtual fields are not
    /// stored and never count). New documents always have changes.
    pub fn has_changes(&self) -> bool {
        self.is_new()
            || self
                .fields
                .iter()
                .any(|f| !f.descriptor().is_virtual_field() && f.has_changes())
    }

    pub fn has_changes_recursively(&self) -> bool {
        self.has_changes()
            || self
                .included
                .iter()
                .any(|(_, collection)| collection.has_changes_recursively())
    }

    /// The first displayed mandatory field without a value makes the
    /// document invalid; then included collections are checked.
    pub fn check_and_get_valid_status(&self) -> DocumentValidStatus {
        if let Some(field) = self
            .fields
            .iter()
            .find(|f| f.is_displayed() && f.is_mandatory() && !f.has_value())
        {
            return DocumentValidStatus::invalid_field_mandatory(field.field_name());
        }

        for (detail_id, collection) in &self.included {
            let status = collection.check_and_get_valid_status();
            if !status.is_valid() {
                return DocumentValidStatus::invalid_included(detail_id.clone(), status);
            }
        }
        DocumentValidStatus::valid()
    }

    pub fn included(&self, detail_id: &DetailId) -> Result<&dyn IncludedDocumentsCollection> {
        self.included
            .iter()
            .find(|(id, _)| id == detail_id)
            .map(|(_, collection)| collection.as_ref())
            .ok_or_else(|| self.detail_not_found(detail_id))
    }

    pub fn included_mut(
        &mut self,
        detail_id: &DetailId,
    ) -> Result<&mut dyn IncludedDocumentsCollection> {
        let path = self.path.clone();
        match self.included.iter_mut().find(|(id, _)| id == detail_id) {
            Some((_, collection)) => Ok(collection.as_mut()),
            None => Err(DocumentError::DetailNotFound {
                path,
                detail_id: detail_id.clone(),
            }),
        }
    }

    /// Snapshot of what included collections need from this document.
    pub fn parent_context(&self) -> DocumentParent {
        DocumentParent {
            path: self.path.clone(),
            id: self.id,
            processed: self.processed,
            writable: self.writable,
            values: self
                .fields
                .iter()
                .map(|f| (f.field_name().to_string(), f.value().cloned()))
                .collect(),
        }
    }

    pub fn create_included_document(&mut self, detail_id: &DetailId) -> Result<Document> {
        let parent = self.parent_context();
        self.included_mut(detail_id)?.create_new_document(&parent)
    }

    pub fn delete_included_documents(
        &mut self,
        detail_id: &DetailId,
        ids: &[DocumentId],
    ) -> Result<()> {
        let parent = self.parent_context();
        self.included_mut(detail_id)?.delete_documents(&parent, ids)
    }

    pub fn included_documents(&self, detail_id: &DetailId) -> Result<Vec<Document>> {
        let parent = self.parent_context();
        self.included(detail_id)?.documents(&parent)
    }

    pub fn included_document(&self, detail_id: &DetailId, id: DocumentId) -> Result<Document> {
        let parent = self.parent_context();
        self.included(detail_id)?.document_by_id(&parent, id)
    }

    /// Run `f` on the cached included document `id`.
    pub fn with_included_document_mut<R>(
        &mut self,
        detail_id: &DetailId,
        id: DocumentId,
        f: impl FnOnce(&mut Document) -> Result<R>,
    ) -> Result<R> {
        self.assert_writable()?;
        let parent = self.parent_context();
        let collection = self.included_mut(detail_id)?;

        let mut f = Some(f);
        let mut output = None;
        collection.with_document_mut(&parent, id, &mut |document| {
            if let Some(f) = f.take() {
                output = Some(f(document)?);
            }
            Ok(())
        })?;

        output.ok_or_else(|| DocumentError::DocumentNotFound {
            path: parent.path().create_child_path(detail_id.clone(), id),
        })
    }

    pub fn save_included_if_has_changes(&mut self) -> Result<()> {
        let parent = self.parent_context();
        for (_, collection) in &mut self.included {
            collection.save_if_has_changes(&parent)?;
        }
        Ok(())
    }

    /// Independent copy. Field values are cloned, descriptors are shared and
    /// included collections are copied with the same mode.
    pub fn copy(&self, mode: CopyMode) -> Document {
        Document {
            entity: Arc::clone(&self.entity),
            id: self.id,
            window_no: self.window_no,
            path: self.path.clone(),
            fields: self.fields.clone(),
            included: self
                .included
                .iter()
                .map(|(detail_id, collection)| (detail_id.clone(), collection.copy(mode)))
                .collect(),
            processed: self.processed,
            writable: mode.is_writable(),
            parent_link_id: self.parent_link_id,
            repository_status: self.repository_status.copy(),
        }
    }

    /// The same document under the id the store assigned to it, with the
    /// current values as the new baseline.
    pub fn into_persisted(mut self, id: DocumentId) -> Document {
        self.assign_persisted_id(id);
        for field in &mut self.fields {
            field.reset_initial_value();
        }
        self
    }

    /// Swap the id, rewrite the key field and re-parent included documents.
    /// Only called while the document is out of (or being re-keyed in) its
    /// owning cache.
    pub(crate) fn assign_persisted_id(&mut self, id: DocumentId) {
        debug!(document = %self.path, persisted_id = %id, "assigning persisted id");
        self.id = id;
        self.path = self.path.with_document_id(id);

        if let Some(key) = self.entity.key_field().map(Arc::clone) {
            self.init_field_by_name(key.field_name(), Some(id_value(&key, id)));
        }

        let parent = self.parent_context();
        for (_, collection) in &mut self.included {
            collection.reparent(&parent);
        }
    }

    /// Point this included document at a (re-keyed) parent.
    pub(crate) fn reparent(&mut self, parent: &DocumentParent) {
        if let Some(detail_id) = self.entity.detail_id() {
            self.path = parent.path().create_child_path(detail_id.clone(), self.id);
        }
        self.parent_link_id = Some(parent.id());

        if let Some(link) = self.entity.parent_link_field().map(Arc::clone) {
            if let Some(idx) = self.entity.field_index(link.field_name()) {
                let link_value = id_value(&link, parent.id());
                if let Err(e) = self.fields[idx].set_value(Some(link_value), None) {
                    warn!(document = %self.path, error = %e, "cannot update parent link");
                }
            }
        }

        let context = self.parent_context();
        for (_, collection) in &mut self.included {
            collection.reparent(&context);
        }
    }

    /// Take current values as the new baseline and remember the stored
    /// version.
    pub fn mark_saved(&mut self, version: Option<VersionToken>) {
        for field in &mut self.fields {
            field.reset_initial_value();
        }
        self.repository_status.mark_not_staled(version);
    }

    /// Set a field's value and initial value without propagation.
    pub(crate) fn init_field_by_name(&mut self, field_name: &str, value: Option<FieldValue>) {
        if let Some(idx) = self.entity.field_index(field_name) {
            self.init_field(idx, value);
        }
    }

    fn init_field(&mut self, idx: usize, value: Option<FieldValue>) {
        if let Err(e) = self.fields[idx].set_initial_value(value, None) {
            warn!(
                document = %self.path,
                field = self.fields[idx].field_name(),
                error = %e,
                "cannot set initial value"
            );
        }
    }

    fn field_not_found(&self, field_name: &str) -> DocumentError {
        DocumentError::FieldNotFound {
            path: self.path.clone(),
            field_name: field_name.to_string(),
        }
    }

    fn detail_not_found(&self, detail_id: &DetailId) -> DocumentError {
        DocumentError::DetailNotFound {
            path: self.path.clone(),
            detail_id: detail_id.clone(),
        }
    }
}

impl Evaluatee for Document {
    fn value(&self, name: &str) -> Option<&FieldValue> {
        Document::value(self, name)
    }

    fn has_variable(&self, name: &str) -> bool {
        self.entity.has_field(name)
    }
}

/// Raw value of an id for an id-carrying field (key or parent link).
fn id_value(descriptor: &DocumentFieldDescriptor, id: DocumentId) -> FieldValue {
    match descriptor.value_class() {
        ValueClass::IntegerLookup => {
            FieldValue::IntegerLookup(IntegerLookupValue::unknown(id.to_int()))
        }
        _ => FieldValue::Integer(id.to_int()),
    }
}

/// Save `document` through its entity's repository, then its included
/// documents. A new document gets the persisted id the store assigned.
pub(crate) fn save_document(document: &mut Document) -> Result<()> {
    let repository = Arc::clone(document.entity().repository());
    let result = repository.save(document)?;
    if result.id != document.id() {
        document.assign_persisted_id(result.id);
    }
    document.mark_saved(result.version);
    document.save_included_if_has_changes()
}
