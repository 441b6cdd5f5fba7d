use crate::asset::AssetRecord;
use crate::error::{ErrorKind, Result};
use crate::progress::Progress;
use crate::tier::Tier;
use crate::transport::TransportHandle;
use crate::validators::Validators;
use bytes::{Bytes, BytesMut};
use derive_more::Display;
use exn::ResultExt;
use futures::TryStreamExt;
use futures::future::try_join_all;
use retrocache_cache::{CacheEntry, Repository};
use retrocache_storage::BackendHandle;
use std::collections::HashSet;
use tracing::instrument;

/// Upper bound on the buffer reserved up front for a download, so a bogus
/// expected size can't trigger a huge allocation before any byte arrives.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

enum Lookup {
    Hit { blob: Bytes, tier: Tier },
    Miss(MissReason),
}

#[derive(Debug, Display)]
enum MissReason {
    #[display("server sent no validators")]
    Uncacheable,
    #[display("not cached")]
    Absent,
    #[display("validators changed")]
    Stale,
    #[display("size mismatch")]
    SizeMismatch,
    #[display("payload unreadable")]
    Unreadable,
}

/// Resolves assets through the cache, falling back to the network.
///
/// The block store passed in is the outcome of
/// [`select_block_store`](crate::select_block_store): present only when it
/// passed its probe. The fetcher never probes it again, and any read or
/// write failure against it later on only costs a cache miss or a skipped
/// write.
#[derive(Clone)]
pub struct Fetcher {
    transport: TransportHandle,
    cache: Repository,
    block_store: Option<BackendHandle>,
}

impl Fetcher {
    pub fn new(transport: TransportHandle, cache: Repository, block_store: Option<BackendHandle>) -> Self {
        Self {
            transport,
            cache,
            block_store,
        }
    }

    pub fn block_store(&self) -> Option<&BackendHandle> {
        self.block_store.as_ref()
    }

    /// The tier an asset's payload should end up in.
    pub fn preferred_tier(&self, asset: &AssetRecord) -> Tier {
        match (&self.block_store, asset.path_hint()) {
            (Some(_), Some(_)) => Tier::BlockStore,
            _ => Tier::Database,
        }
    }

    /// Resolve one asset, from the cache when its validators and size still
    /// match, or from the network otherwise.
    ///
    /// The asset's expected size is added to `progress` before anything is
    /// awaited. A cache hit then advances `progress` by the whole expected
    /// size at once; a download advances it chunk by chunk.
    ///
    /// Only network failures are returned as errors. Cache reads that fail
    /// are treated as misses, and failed writes are logged and skipped.
    pub async fn fetch_with_cache(&self, asset: &AssetRecord, progress: &Progress) -> Result<Bytes> {
        progress.register(asset.expected_size());
        self.resolve(asset, progress).await
    }

    /// Resolve every asset concurrently, all or nothing.
    ///
    /// All expected sizes are registered with `progress` before the first
    /// request goes out, so the aggregate percentage only ever grows. The
    /// first fatal error drops every other in-flight fetch and is returned
    /// wrapped in [`ErrorKind::Aborted`]. Blobs are returned in the order of
    /// `assets`.
    ///
    /// Assets sharing a block store path are rejected with
    /// [`ErrorKind::InvalidPath`] before anything is fetched: one would
    /// otherwise be served the other's payload.
    #[instrument(skip_all, fields(assets = assets.len()))]
    pub async fn load_all(&self, assets: &[AssetRecord], progress: &Progress) -> Result<Vec<Bytes>> {
        let mut claimed = HashSet::new();
        for asset in assets {
            if let Some(path) = asset.path_hint()
                && !claimed.insert(path)
            {
                exn::bail!(ErrorKind::InvalidPath(format!(
                    "{} shares block store path `{}` with another asset",
                    asset.canonical_url(),
                    path.display()
                )));
            }
        }
        for asset in assets {
            progress.register(asset.expected_size());
        }
        let fetches = assets.iter().map(|asset| self.resolve(asset, progress));
        try_join_all(fetches).await.or_raise(|| ErrorKind::Aborted)
    }

    #[instrument(skip_all, fields(url = %asset.url(), size = asset.expected_size()))]
    async fn resolve(&self, asset: &AssetRecord, progress: &Progress) -> Result<Bytes> {
        let validators = self.transport.head(asset.url()).await?;
        let (blob, served_from) = match self.lookup(asset, &validators).await {
            Lookup::Hit { blob, tier } => {
                tracing::debug!(%tier, "Cache hit");
                progress.advance(asset.expected_size());
                (blob, Some(tier))
            },
            Lookup::Miss(reason) => {
                tracing::debug!(%reason, "Cache miss");
                (self.download(asset, progress).await?, None)
            },
        };
        let preferred = self.preferred_tier(asset);
        if blob.len() as u64 != asset.expected_size() {
            // It would only ever be read back as a size mismatch.
            tracing::debug!(received = blob.len(), "Not caching payload of unexpected size");
        } else if validators.is_cacheable() && served_from != Some(preferred) {
            self.persist(asset, &validators, &blob, preferred).await;
        }
        Ok(blob)
    }

    async fn lookup(&self, asset: &AssetRecord, validators: &Validators) -> Lookup {
        if !validators.is_cacheable() {
            return Lookup::Miss(MissReason::Uncacheable);
        }
        let entry = match self.cache.get(asset.canonical_url()).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Lookup::Miss(MissReason::Absent),
            Err(err) => {
                tracing::warn!(error = ?err, "Failed to read cache entry");
                return Lookup::Miss(MissReason::Unreadable);
            },
        };
        if !validators.matches(&entry) {
            return Lookup::Miss(MissReason::Stale);
        }
        if entry.size != asset.expected_size() {
            return Lookup::Miss(MissReason::SizeMismatch);
        }
        if let Some(blob) = entry.blob {
            return match blob.len() as u64 == asset.expected_size() {
                true => Lookup::Hit {
                    blob: Bytes::from(blob),
                    tier: Tier::Database,
                },
                false => Lookup::Miss(MissReason::SizeMismatch),
            };
        }
        let (Some(block_store), Some(path)) = (&self.block_store, asset.path_hint()) else {
            return Lookup::Miss(MissReason::Unreadable);
        };
        match block_store.stat(path).await {
            Ok(info) if info.size == asset.expected_size() => {},
            Ok(_) => return Lookup::Miss(MissReason::SizeMismatch),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = ?err, "Block store file unavailable");
                return Lookup::Miss(MissReason::Unreadable);
            },
        }
        match block_store.read(path).await {
            Ok(data) if data.len() as u64 == asset.expected_size() => Lookup::Hit {
                blob: Bytes::from(data),
                tier: Tier::BlockStore,
            },
            Ok(_) => Lookup::Miss(MissReason::SizeMismatch),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = ?err, "Failed to read from block store");
                Lookup::Miss(MissReason::Unreadable)
            },
        }
    }

    async fn download(&self, asset: &AssetRecord, progress: &Progress) -> Result<Bytes> {
        let mut stream = self.transport.get(asset.url()).await?;
        let capacity = asset.expected_size().min(MAX_PREALLOCATION);
        let mut buffer = BytesMut::with_capacity(usize::try_from(capacity).unwrap_or_default());
        while let Some(chunk) = stream.try_next().await? {
            progress.advance(chunk.len() as u64);
            buffer.extend_from_slice(&chunk);
        }
        if buffer.len() as u64 != asset.expected_size() {
            tracing::warn!(received = buffer.len(), "Downloaded size differs from expected size");
        }
        Ok(buffer.freeze())
    }

    /// Write `blob` to `tier` and record it under `validators`.
    ///
    /// When the block store write fails, the record is left untouched so it
    /// never points at a payload that isn't there.
    async fn persist(&self, asset: &AssetRecord, validators: &Validators, blob: &Bytes, tier: Tier) {
        let entry = CacheEntry::new(asset.canonical_url(), blob.len() as u64)
            .with_etag(validators.etag.as_deref())
            .with_last_modified(validators.last_modified.as_deref());
        let entry = match (tier, &self.block_store, asset.path_hint()) {
            (Tier::BlockStore, Some(block_store), Some(path)) => {
                if let Err(err) = block_store.write(path, blob).await {
                    tracing::warn!(path = %path.display(), error = ?err, "Failed to write to block store; not caching");
                    return;
                }
                entry
            },
            _ => entry.with_blob(blob.to_vec()),
        };
        match self.cache.put(&entry).await {
            Ok(()) => tracing::debug!(%tier, "Cached"),
            Err(err) => tracing::warn!(error = ?err, "Failed to write cache entry"),
        }
    }
}
