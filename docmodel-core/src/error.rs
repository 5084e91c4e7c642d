//! Error types for the document engine

use crate::values::{ValueClass, WidgetType};
use docmodel_types::{DetailId, DocumentPath, IdError};
use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T, E = DocumentError> = std::result::Result<T, E>;

/// Engine-wide error: policy violations, missing documents, conversion and
/// repository failures.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("document {path} is processed and cannot be changed")]
    DocumentProcessed { path: DocumentPath },

    #[error("document {path} is a read-only snapshot")]
    NotWritable { path: DocumentPath },

    #[error("invalid state for {path}: {reason}")]
    InvalidDocumentState { path: DocumentPath, reason: String },

    #[error("document not found: {path}")]
    DocumentNotFound { path: DocumentPath },

    #[error("operation not allowed: {operation}")]
    OperationNotAllowed { operation: String },

    #[error("more than one row ({count}) found for {query}")]
    TooManyRowsFound { query: String, count: usize },

    #[error("field {field_name} not found in {path}")]
    FieldNotFound {
        path: DocumentPath,
        field_name: String,
    },

    #[error("field {field_name} of {path} is read-only")]
    FieldReadonly {
        path: DocumentPath,
        field_name: String,
    },

    #[error("no included entity {detail_id} in {path}")]
    DetailNotFound {
        path: DocumentPath,
        detail_id: DetailId,
    },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error("repository error: {message}")]
    Repository { message: String },
}

impl DocumentError {
    pub fn operation_not_allowed(operation: impl Into<String>) -> Self {
        DocumentError::OperationNotAllowed {
            operation: operation.into(),
        }
    }

    pub fn repository(message: impl Into<String>) -> Self {
        DocumentError::Repository {
            message: message.into(),
        }
    }
}

/// A raw value could not be turned into a field's declared value class
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error(
        "cannot convert {field_name}'s value '{value}' ({from_type}) to {to_type} \
         (widget: {widget_type}): {reason}"
    )]
    UnconvertibleValue {
        field_name: String,
        value: String,
        from_type: String,
        to_type: ValueClass,
        widget_type: WidgetType,
        reason: String,
    },
}

/// Descriptor metadata is inconsistent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("entity descriptor has no table name")]
    MissingTableName,

    #[error("duplicate field {field_name} in {table_name}")]
    DuplicateField {
        table_name: String,
        field_name: String,
    },

    #[error("unknown field {field_name} in {table_name}")]
    UnknownField {
        table_name: String,
        field_name: String,
    },

    #[error("duplicate included entity {detail_id} in {table_name}")]
    DuplicateDetail {
        table_name: String,
        detail_id: DetailId,
    },

    #[error("cyclic field value dependency in {table_name}: {path:?}")]
    CyclicDependency {
        table_name: String,
        path: Vec<String>,
    },
}

/// A default-value expression or virtual field provider failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("variable not found: {0}")]
    VariableNotFound(String),

    #[error("evaluation failed: {0}")]
    Failed(String),
}
