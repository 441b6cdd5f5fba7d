//! Block storage tier.
//!
//! Hierarchical path → bytes storage for asset payloads that are too large to
//! keep inline in the cache database. Every backend writes atomically (a
//! temporary file is committed by rename) so a reader never observes a
//! partially written payload.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::{MIN_NESTING_DEPTH, validate as validate_path, validate_nested as validate_file_path};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
