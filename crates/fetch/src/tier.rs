use crate::error::{ErrorKind, Result};
use derive_more::Display;
use exn::ResultExt;
use retrocache_storage::BackendHandle;
use serde::{Deserialize, Serialize};

/// Where a cached payload lives.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Inline in the cache database.
    #[display("database")]
    Database,
    /// As a file in the block store, with validators in the database.
    #[display("block store")]
    BlockStore,
}

/// How the block store tier is used.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStoreMode {
    /// Never use the block store, even when one is configured.
    #[display("disabled")]
    Disabled,
    /// Use the block store when it works, fall back to the database otherwise.
    #[default]
    #[display("preferred")]
    Preferred,
    /// Refuse to start without a working block store.
    #[display("required")]
    Required,
}

/// Decide, once per session, whether the block store tier is in use.
///
/// `candidate` is the configured backend: `None` when there isn't one, or the
/// result of opening it. A backend is only selected after passing its
/// [probe](retrocache_storage::StorageBackend::probe); the caller then hands
/// the outcome to the [`Fetcher`](crate::Fetcher), which never probes again.
///
/// Only [`BlockStoreMode::Required`] turns an unusable block store into an
/// error ([`ErrorKind::BlockStoreRequired`]).
pub async fn select_block_store(
    mode: BlockStoreMode,
    candidate: Option<retrocache_storage::error::Result<BackendHandle>>,
) -> Result<Option<BackendHandle>> {
    let candidate = match (mode, candidate) {
        (BlockStoreMode::Disabled, _) => {
            tracing::debug!("Block store disabled; caching in the database only");
            return Ok(None);
        },
        (BlockStoreMode::Required, None) => exn::bail!(ErrorKind::BlockStoreRequired),
        (BlockStoreMode::Preferred, None) => {
            tracing::debug!("No block store configured; caching in the database only");
            return Ok(None);
        },
        (_, Some(candidate)) => candidate,
    };
    let probed = match candidate {
        Ok(backend) => backend.probe().await.map(|()| backend),
        Err(err) => Err(err),
    };
    match (mode, probed) {
        (_, Ok(backend)) => {
            tracing::info!(backend = backend.name(), "Block store available");
            Ok(Some(backend))
        },
        (BlockStoreMode::Required, Err(err)) => Err(err).or_raise(|| ErrorKind::BlockStoreRequired),
        (_, Err(err)) => {
            tracing::warn!(error = ?err, "Block store unavailable; caching in the database only");
            Ok(None)
        },
    }
}
