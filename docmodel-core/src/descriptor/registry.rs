//! Process-wide descriptor cache

use super::entity::EntityDescriptor;
use crate::error::DescriptorError;
use dashmap::DashMap;
use docmodel_types::{DocumentId, DocumentPath};
use std::sync::Arc;
use tracing::debug;

/// Caches entity descriptors by window id.
///
/// Descriptors are immutable once built, so the registry only ever grows
/// (or is cleared wholesale). A secondary `table name -> window ids` index
/// answers "which open documents may show this record" for record-changed
/// notifications.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    by_window: DashMap<String, Arc<EntityDescriptor>>,
    windows_by_table: DashMap<String, Vec<String>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, window_id: &str) -> Option<Arc<EntityDescriptor>> {
        self.by_window.get(window_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the cached descriptor or builds it with `loader`.
    ///
    /// A loader failure is returned and nothing is cached.
    pub fn get_or_load<F>(
        &self,
        window_id: &str,
        loader: F,
    ) -> Result<Arc<EntityDescriptor>, DescriptorError>
    where
        F: FnOnce() -> Result<Arc<EntityDescriptor>, DescriptorError>,
    {
        if let Some(descriptor) = self.get(window_id) {
            return Ok(descriptor);
        }

        let descriptor = loader()?;
        let descriptor = Arc::clone(
            self.by_window
                .entry(window_id.to_string())
                .or_insert(descriptor)
                .value(),
        );

        let mut windows = self
            .windows_by_table
            .entry(descriptor.table_name().to_string())
            .or_default();
        if !windows.iter().any(|w| w == window_id) {
            windows.push(window_id.to_string());
        }
        debug!(window_id, table = descriptor.table_name(), "descriptor loaded");

        Ok(descriptor)
    }

    /// Window ids whose root entity is stored in `table_name`.
    pub fn windows_for_table(&self, table_name: &str) -> Vec<String> {
        self.windows_by_table
            .get(table_name)
            .map(|windows| windows.clone())
            .unwrap_or_default()
    }

    /// Every document path under which the record `table_name/id` can be
    /// open. With an included table, paths point at the included row
    /// `included_id` below the root record instead.
    ///
    /// Paths are keyed by table name, like the paths documents carry; one
    /// path is returned per distinct detail even when several windows show
    /// the same table.
    pub fn document_paths(
        &self,
        table_name: &str,
        id: DocumentId,
        included: Option<(&str, DocumentId)>,
    ) -> Vec<DocumentPath> {
        let mut paths = Vec::new();
        for window_id in self.windows_for_table(table_name) {
            let Some(descriptor) = self.get(&window_id) else {
                continue;
            };
            let root = DocumentPath::root(descriptor.table_name(), id);
            let candidates: Vec<DocumentPath> = match included {
                None => vec![root],
                Some((included_table, row_id)) => descriptor
                    .included_entities_by_table_name(included_table)
                    .filter_map(|entity| entity.detail_id().cloned())
                    .map(|detail_id| root.create_child_path(detail_id, row_id))
                    .collect(),
            };
            for path in candidates {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        paths
    }

    pub fn len(&self) -> usize {
        self.by_window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_window.is_empty()
    }

    pub fn clear(&self) {
        self.by_window.clear();
        self.windows_by_table.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DocumentFieldDescriptor;
    use crate::repository::{DocumentsRepository, InMemoryDocumentsRepository};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn order_entity() -> Result<Arc<EntityDescriptor>, DescriptorError> {
        let repository: Arc<dyn DocumentsRepository> = Arc::new(InMemoryDocumentsRepository::new());
        EntityDescriptor::builder("C_Order", Arc::clone(&repository))
            .field(DocumentFieldDescriptor::builder("DocumentNo"))
            .included(
                "lines",
                EntityDescriptor::builder("C_OrderLine", repository)
                    .field(DocumentFieldDescriptor::builder("Line")),
            )
            .build()
    }

    #[test]
    fn test_get_or_load_caches() {
        let registry = DescriptorRegistry::new();
        let loads = AtomicUsize::new(0);
        let load = || {
            loads.fetch_add(1, Ordering::SeqCst);
            order_entity()
        };

        let first = registry.get_or_load("143", load).unwrap();
        let second = registry.get_or_load("143", load).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(registry.windows_for_table("C_Order"), vec!["143".to_string()]);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let registry = DescriptorRegistry::new();
        let result = registry.get_or_load("1", || Err(DescriptorError::MissingTableName));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_document_paths() {
        let registry = DescriptorRegistry::new();
        registry.get_or_load("143", order_entity).unwrap();
        registry.get_or_load("181", order_entity).unwrap();

        let roots = registry.document_paths("C_Order", DocumentId::of(1000), None);
        let rendered: Vec<String> = roots.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["C_Order/1000"]);

        let lines = registry.document_paths(
            "C_Order",
            DocumentId::of(1000),
            Some(("C_OrderLine", DocumentId::of(7))),
        );
        let rendered: Vec<String> = lines.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["C_Order/1000/lines/7"]);

        assert!(registry.document_paths("M_Product", DocumentId::of(1), None).is_empty());
    }
}
