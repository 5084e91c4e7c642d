//! # docmodel-core
//!
//! Document model and field dependency engine.
//!
//! This crate provides the in-memory representation of business documents:
//! typed fields whose readonly, mandatory and displayed state and derived
//! values follow declarative logic, included child documents, and the
//! per-session caches that track staleness against a repository.

pub mod cache;
pub mod collection;
pub mod config;
pub mod convert;
pub mod dependency;
pub mod descriptor;
pub mod document;
pub mod error;
pub mod field;
pub mod logic;
pub mod repository;
pub mod root;
pub mod status;
pub mod telemetry;
pub mod values;

pub use cache::{CacheStats, DocumentsCache};
pub use collection::{
    CachedIncludedDocumentsCollection, HighVolumeIncludedDocumentsCollection,
    IncludedDocumentsCollection,
};
pub use config::{ConfigError, DocumentsConfig, EngineConfig, LoggingConfig};
pub use convert::{convert_to_value_class, to_boolean};
pub use dependency::{DependencyType, FieldDependency, FieldDependencyMap};
pub use descriptor::{
    DescriptorRegistry, DocumentFieldDescriptor, DocumentFieldDescriptorBuilder, EntityDescriptor,
    EntityDescriptorBuilder,
};
pub use document::{CopyMode, Document, DocumentParent, DocumentValidStatus};
pub use error::{ConversionError, DescriptorError, DocumentError, ExpressionError, Result};
pub use field::DocumentField;
pub use logic::{
    ConstantDefault, ConstantLogic, DefaultValueExpression, Evaluatee, FieldValueProvider,
    FnLogic, FnValueProvider, LogicExpression, LogicResult, LookupDescriptor, SharedLogic,
};
pub use repository::{
    DocumentQuery, DocumentsRepository, InMemoryDocumentsRepository, SaveResult, VersionToken,
};
pub use root::RootDocumentsCollection;
pub use status::DocumentRepositoryStatus;
pub use values::{
    FieldValue, IntegerLookupValue, LookupId, LookupValue, LookupValueByIdSupplier,
    StringLookupValue, ValueClass, WidgetType,
};

pub use docmodel_types::{DetailId, DocumentId, DocumentPath, WindowNo};

/// Commonly used types for building descriptors and working with documents
pub mod prelude {
    pub use crate::{
        ConstantDefault, ConstantLogic, CopyMode, DescriptorRegistry, DetailId, Document,
        DocumentError, DocumentFieldDescriptor, DocumentId, DocumentPath, DocumentsConfig,
        DocumentsRepository, EntityDescriptor, Evaluatee, FieldValue, FnLogic, FnValueProvider,
        InMemoryDocumentsRepository, IncludedDocumentsCollection, RootDocumentsCollection,
        WidgetType,
    };
}
