//! Entity descriptors

use super::field::{DocumentFieldDescriptor, DocumentFieldDescriptorBuilder};
use crate::dependency::{DependencyType, FieldDependencyMap};
use crate::error::DescriptorError;
use crate::logic::{ConstantLogic, LogicExpression, SharedLogic};
use crate::repository::DocumentsRepository;
use docmodel_types::DetailId;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

const DEFAULT_LINE_NO_FIELD: &str = "Line";
const DEFAULT_LINE_NO_INCREMENT: i32 = 10;

/// Immutable metadata of an entity: its fields, logic and included entities.
///
/// Built once through [`EntityDescriptor::builder`] and shared as
/// `Arc<EntityDescriptor>` for the rest of the process lifetime.
#[derive(Debug)]
pub struct EntityDescriptor {
    table_name: String,
    detail_id: Option<DetailId>,
    fields: Vec<Arc<DocumentFieldDescriptor>>,
    field_index: HashMap<String, usize>,
    readonly_logic: SharedLogic,
    allow_create_logic: SharedLogic,
    allow_delete_logic: SharedLogic,
    included: Vec<Arc<EntityDescriptor>>,
    high_volume: bool,
    line_no_field: String,
    line_no_increment: i32,
    dependencies: FieldDependencyMap,
    repository: Arc<dyn DocumentsRepository>,
}

impl EntityDescriptor {
    pub fn builder(
        table_name: impl Into<String>,
        repository: Arc<dyn DocumentsRepository>,
    ) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder::new(table_name, repository)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Detail id under which this entity is included; `None` for a root.
    pub fn detail_id(&self) -> Option<&DetailId> {
        self.detail_id.as_ref()
    }

    pub fn is_detail(&self) -> bool {
        self.detail_id.is_some()
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Arc<DocumentFieldDescriptor>] {
        &self.fields
    }

    pub fn field(&self, field_name: &str) -> Option<&Arc<DocumentFieldDescriptor>> {
        self.field_index(field_name).map(|idx| &self.fields[idx])
    }

    pub fn field_index(&self, field_name: &str) -> Option<usize> {
        self.field_index.get(field_name).copied()
    }

    pub fn has_field(&self, field_name: &str) -> bool {
        self.field_index.contains_key(field_name)
    }

    pub fn key_field(&self) -> Option<&Arc<DocumentFieldDescriptor>> {
        self.fields.iter().find(|f| f.is_key())
    }

    pub fn parent_link_field(&self) -> Option<&Arc<DocumentFieldDescriptor>> {
        self.fields.iter().find(|f| f.is_parent_link())
    }

    pub fn readonly_logic(&self) -> &SharedLogic {
        &self.readonly_logic
    }

    pub fn allow_create_logic(&self) -> &SharedLogic {
        &self.allow_create_logic
    }

    pub fn allow_delete_logic(&self) -> &SharedLogic {
        &self.allow_delete_logic
    }

    pub fn included_entities(&self) -> &[Arc<EntityDescriptor>] {
        &self.included
    }

    pub fn included_entity(&self, detail_id: &DetailId) -> Option<&Arc<EntityDescriptor>> {
        self.included
            .iter()
            .find(|entity| entity.detail_id.as_ref() == Some(detail_id))
    }

    /// Included entities stored in `table_name`.
    pub fn included_entities_by_table_name<'a>(
        &'a self,
        table_name: &'a str,
    ) -> impl Iterator<Item = &'a Arc<EntityDescriptor>> + 'a {
        self.included
            .iter()
            .filter(move |entity| entity.table_name == table_name)
    }

    /// Children of this entity are too many to cache and are always queried.
    pub fn is_high_volume(&self) -> bool {
        self.high_volume
    }

    pub fn line_no_field(&self) -> &str {
        &self.line_no_field
    }

    pub fn line_no_increment(&self) -> i32 {
        self.line_no_increment
    }

    pub fn dependencies(&self) -> &FieldDependencyMap {
        &self.dependencies
    }

    /// Data binding: where documents of this entity are loaded from and
    /// saved to.
    pub fn repository(&self) -> &Arc<dyn DocumentsRepository> {
        &self.repository
    }
}

#[derive(Debug)]
pub struct EntityDescriptorBuilder {
    table_name: String,
    fields: Vec<DocumentFieldDescriptorBuilder>,
    readonly_logic: SharedLogic,
    allow_create_logic: SharedLogic,
    allow_delete_logic: SharedLogic,
    included: Vec<(DetailId, EntityDescriptorBuilder)>,
    high_volume: bool,
    line_no_field: String,
    line_no_increment: i32,
    repository: Arc<dyn DocumentsRepository>,
}

impl EntityDescriptorBuilder {
    fn new(table_name: impl Into<String>, repository: Arc<dyn DocumentsRepository>) -> Self {
        Self {
            table_name: table_name.into(),
            fields: Vec::new(),
            readonly_logic: ConstantLogic::shared(false),
            allow_create_logic: ConstantLogic::shared(true),
            allow_delete_logic: ConstantLogic::shared(true),
            included: Vec::new(),
            high_volume: false,
            line_no_field: DEFAULT_LINE_NO_FIELD.to_string(),
            line_no_increment: DEFAULT_LINE_NO_INCREMENT,
            repository,
        }
    }

    pub fn field(mut self, field: DocumentFieldDescriptorBuilder) -> Self {
        self.fields.push(field);
        self
    }

    pub fn readonly_logic(mut self, logic: SharedLogic) -> Self {
        self.readonly_logic = logic;
        self
    }

    pub fn allow_create_logic(mut self, logic: SharedLogic) -> Self {
        self.allow_create_logic = logic;
        self
    }

    pub fn allow_delete_logic(mut self, logic: SharedLogic) -> Self {
        self.allow_delete_logic = logic;
        self
    }

    pub fn included(
        mut self,
        detail_id: impl Into<DetailId>,
        entity: EntityDescriptorBuilder,
    ) -> Self {
        self.included.push((detail_id.into(), entity));
        self
    }

    pub fn high_volume(mut self, high_volume: bool) -> Self {
        self.high_volume = high_volume;
        self
    }

    pub fn line_no_field(mut self, field_name: impl Into<String>) -> Self {
        self.line_no_field = field_name.into();
        self
    }

    pub fn line_no_increment(mut self, increment: i32) -> Self {
        self.line_no_increment = increment;
        self
    }

    pub fn build(self) -> Result<Arc<EntityDescriptor>, DescriptorError> {
        self.build_with_detail_id(None).map(Arc::new)
    }

    fn build_with_detail_id(
        self,
        detail_id: Option<DetailId>,
    ) -> Result<EntityDescriptor, DescriptorError> {
        if self.table_name.trim().is_empty() {
            return Err(DescriptorError::MissingTableName);
        }
        let is_detail = detail_id.is_some();

        let mut fields = Vec::with_capacity(self.fields.len());
        let mut field_index = HashMap::with_capacity(self.fields.len());
        for builder in self.fields {
            let field = builder.build(&self.readonly_logic, is_detail);
            if field_index
                .insert(field.field_name().to_string(), fields.len())
                .is_some()
            {
                return Err(DescriptorError::DuplicateField {
                    table_name: self.table_name,
                    field_name: field.field_name().to_string(),
                });
            }
            fields.push(Arc::new(field));
        }

        let dependencies = build_dependencies(&self.table_name, &fields, &field_index)?;

        let mut seen_details = BTreeSet::new();
        let mut included = Vec::with_capacity(self.included.len());
        for (child_detail_id, child) in self.included {
            if !seen_details.insert(child_detail_id.clone()) {
                return Err(DescriptorError::DuplicateDetail {
                    table_name: self.table_name,
                    detail_id: child_detail_id,
                });
            }
            included.push(Arc::new(child.build_with_detail_id(Some(child_detail_id))?));
        }

        Ok(EntityDescriptor {
            table_name: self.table_name,
            detail_id,
            fields,
            field_index,
            readonly_logic: self.readonly_logic,
            allow_create_logic: self.allow_create_logic,
            allow_delete_logic: self.allow_delete_logic,
            included,
            high_volume: self.high_volume,
            line_no_field: self.line_no_field,
            line_no_increment: self.line_no_increment,
            dependencies,
            repository: self.repository,
        })
    }
}

fn build_dependencies(
    table_name: &str,
    fields: &[Arc<DocumentFieldDescriptor>],
    field_index: &HashMap<String, usize>,
) -> Result<FieldDependencyMap, DescriptorError> {
    let mut builder = FieldDependencyMap::builder();
    for field in fields {
        let name = field.field_name();
        builder = builder
            .add(name, field.readonly_logic().parameters(), DependencyType::ReadonlyLogic)
            .add(name, field.display_logic().parameters(), DependencyType::DisplayLogic)
            .add(name, field.mandatory_logic().parameters(), DependencyType::MandatoryLogic);

        if let Some(lookup) = field.lookup() {
            builder = builder.add(name, &lookup.depends_on, DependencyType::LookupValues);
        }

        if let Some(provider) = field.value_provider() {
            let depends_on = provider.depends_on();
            if let Some(unknown) = depends_on.iter().find(|p| !field_index.contains_key(*p)) {
                return Err(DescriptorError::UnknownField {
                    table_name: table_name.to_string(),
                    field_name: unknown.clone(),
                });
            }
            builder = builder.add(name, depends_on, DependencyType::FieldValue);
        }
    }

    let dependencies = builder.build();
    if let Some(path) = dependencies.find_value_cycle() {
        return Err(DescriptorError::CyclicDependency {
            table_name: table_name.to_string(),
            path,
        });
    }
    Ok(dependencies)
}
