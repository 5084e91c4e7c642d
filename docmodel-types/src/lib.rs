//! Shared types for docmodel
//!
//! This crate provides the identifier types used across the docmodel
//! ecosystem: document ids (persisted, new and temporary), detail (tab)
//! ids, document paths and session window numbers.

mod id;
mod path;
mod window;

pub use id::{is_new, DocumentId, IdError};
pub use path::{DetailId, DocumentPath};
pub use window::WindowNo;
