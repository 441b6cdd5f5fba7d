//! SQLite metadata store for cached assets.
//!
//! One record per canonical asset URL, holding the HTTP validators the asset
//! was cached under (`ETag`, `Last-Modified`), the payload size, and the
//! payload itself when it is cached inline in the database tier. Payloads
//! cached in the block store tier only keep their record here.
//!
//! The database is a cache, not a source of truth. Deleting it costs one
//! redundant download per asset, nothing more.

mod db;
mod entry;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::entry::{CacheEntry, EntrySummary};
pub use crate::repo::Repository;
