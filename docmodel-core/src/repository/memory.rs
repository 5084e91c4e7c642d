//! In-memory repository

use super::{DocumentQuery, DocumentsRepository, SaveResult, VersionToken};
use crate::descriptor::EntityDescriptor;
use crate::document::Document;
use crate::error::{DocumentError, Result};
use crate::values::FieldValue;
use docmodel_types::DocumentId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::debug;

type Row = BTreeMap<String, FieldValue>;

const FIRST_ID: i32 = 1000;

/// Rows kept per table in memory.
///
/// Versions are the blake3 hash of a row's values, so any write (including
/// [`InMemoryDocumentsRepository::update_row`] playing another session)
/// changes the version a loaded document remembers.
#[derive(Debug)]
pub struct InMemoryDocumentsRepository {
    tables: RwLock<HashMap<String, BTreeMap<i32, Row>>>,
    next_id: AtomicI32,
}

impl Default for InMemoryDocumentsRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentsRepository {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            next_id: AtomicI32::new(FIRST_ID),
        }
    }

    fn allocate_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store a row directly and return its id.
    pub fn insert_row(&self, table_name: &str, values: BTreeMap<String, FieldValue>) -> DocumentId {
        let id = self.allocate_id();
        self.tables
            .write()
            .entry(table_name.to_string())
            .or_default()
            .insert(id, values);
        DocumentId::of(id)
    }

    /// Change one value of a stored row behind the engine's back.
    pub fn update_row(
        &self,
        table_name: &str,
        id: DocumentId,
        field_name: &str,
        value: Option<FieldValue>,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        let row = tables
            .get_mut(table_name)
            .and_then(|rows| rows.get_mut(&id.to_int()))
            .ok_or_else(|| DocumentError::repository(format!("no row {table_name}/{id}")))?;
        match value {
            Some(value) => row.insert(field_name.to_string(), value),
            None => row.remove(field_name),
        };
        Ok(())
    }

    pub fn row(&self, table_name: &str, id: DocumentId) -> Option<BTreeMap<String, FieldValue>> {
        self.tables
            .read()
            .get(table_name)
            .and_then(|rows| rows.get(&id.to_int()))
            .cloned()
    }

    pub fn row_count(&self, table_name: &str) -> usize {
        self.tables.read().get(table_name).map_or(0, BTreeMap::len)
    }
}

fn version_of(row: &Row) -> Result<VersionToken> {
    let bytes = serde_json::to_vec(row).map_err(|e| DocumentError::repository(e.to_string()))?;
    Ok(VersionToken(blake3::hash(&bytes).to_hex().to_string()))
}

/// Stored values of a document: every non-virtual field except the key.
fn row_of(document: &Document) -> Row {
    document
        .fields()
        .iter()
        .filter(|f| !f.descriptor().is_key() && !f.descriptor().is_virtual_field())
        .filter_map(|f| f.value().map(|v| (f.field_name().to_string(), v.clone())))
        .collect()
}

impl DocumentsRepository for InMemoryDocumentsRepository {
    fn retrieve_documents(&self, query: &DocumentQuery) -> Result<Vec<Document>> {
        let entity = query.entity();
        let link_field = entity.parent_link_field().map(|f| f.field_name().to_string());

        let matches: Vec<(i32, Row)> = {
            let tables = self.tables.read();
            let Some(rows) = tables.get(entity.table_name()) else {
                return Ok(Vec::new());
            };
            rows.iter()
                .filter(|(id, _)| {
                    query
                        .get_record_id()
                        .map_or(true, |wanted| wanted.to_int() == **id)
                })
                .filter(|(_, row)| match (query.parent_link_id(), &link_field) {
                    (Some(parent_id), Some(link)) => {
                        row.get(link).and_then(FieldValue::as_i32) == Some(parent_id.to_int())
                    }
                    _ => true,
                })
                .map(|(id, row)| (*id, row.clone()))
                .collect()
        };

        let mut documents = Vec::with_capacity(matches.len());
        for (id, row) in matches {
            let mut document = Document::from_values(
                Arc::clone(entity),
                DocumentId::of(id),
                &row,
                query.get_parent(),
            )?;
            document.mark_saved(Some(version_of(&row)?));
            documents.push(document);
        }
        debug!(query = %query, count = documents.len(), "retrieved documents");
        Ok(documents)
    }

    fn retrieve_version(
        &self,
        entity: &EntityDescriptor,
        id: DocumentId,
    ) -> Result<Option<VersionToken>> {
        let tables = self.tables.read();
        tables
            .get(entity.table_name())
            .and_then(|rows| rows.get(&id.to_int()))
            .map(version_of)
            .transpose()
    }

    fn save(&self, document: &mut Document) -> Result<SaveResult> {
        let row = row_of(document);
        let version = version_of(&row)?;
        let table_name = document.entity().table_name().to_string();

        let id = if document.is_new() {
            self.allocate_id()
        } else {
            document.id().to_int()
        };
        self.tables
            .write()
            .entry(table_name)
            .or_default()
            .insert(id, row);

        debug!(document = %document.path(), id, "saved");
        Ok(SaveResult {
            id: DocumentId::of(id),
            version: Some(version),
        })
    }

    fn delete(&self, document: &Document) -> Result<()> {
        let mut tables = self.tables.write();
        let removed = tables
            .get_mut(document.entity().table_name())
            .and_then(|rows| rows.remove(&document.id().to_int()));
        match removed {
            Some(_) => Ok(()),
            None => Err(DocumentError::DocumentNotFound {
                path: document.path().clone(),
            }),
        }
    }
}
