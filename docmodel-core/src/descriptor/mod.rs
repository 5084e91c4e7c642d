//! Entity and field metadata
//!
//! Descriptors are built once (usually at metadata load time), validated,
//! and then shared read-only between every document of the entity.

mod entity;
mod field;
mod registry;

pub use entity::{EntityDescriptor, EntityDescriptorBuilder};
pub use field::{DocumentFieldDescriptor, DocumentFieldDescriptorBuilder, CREATED_UPDATED_FIELDS};
pub use registry::DescriptorRegistry;
