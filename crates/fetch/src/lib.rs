//! Asset fetch-and-cache.
//!
//! Resolves large binary assets (emulator cores, ROMs, runtime packages)
//! through a conditional HTTP fetch: a `HEAD` request yields the server's
//! current validators, and a cached copy is only reused when both the
//! validator and the expected size match. Misses are downloaded with
//! byte-granular progress and written back to the preferred storage tier.
//!
//! # Tiers
//! - **Database**: the payload is stored inline in the
//!   [cache database](retrocache_cache).
//! - **Block store**: the payload is stored as a file in a
//!   [storage backend](retrocache_storage), and the database only keeps its
//!   validators.
//!
//! The block store is optional. It is probed once at startup by
//! [`select_block_store`] and, when it doesn't work, the database tier takes
//! over unless configuration demands otherwise.

mod asset;
pub mod error;
mod fetcher;
mod mount;
mod progress;
mod tier;
pub mod transport;
mod validators;

pub use crate::asset::AssetRecord;
pub use crate::fetcher::Fetcher;
pub use crate::mount::{Mount, mount_directories};
pub use crate::progress::{Progress, Renderer, Snapshot};
pub use crate::tier::{BlockStoreMode, Tier, select_block_store};
pub use crate::validators::Validators;
pub use reqwest::Url;
