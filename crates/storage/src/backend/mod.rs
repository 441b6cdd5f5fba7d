//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface for block storage operations across backends (local filesystem,
//! in-memory for tests).

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use async_trait::async_trait;
use exn::ResultExt;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Location of the file written and removed by [`StorageBackend::probe`].
pub const PROBE_PATH: &str = ".retrocache/probe";
const PROBE_PAYLOAD: &[u8] = b"retrocache capability probe";

/// Unified interface for block storage backends.
///
/// All storage operations are asynchronous so that file I/O is a suspension
/// point rather than a blocking call on the loader's scheduler.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) (directories) or
/// [`validate_file_path`](crate::validate_file_path) (files) before use.
/// Implementations enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use retrocache_storage::{backend::StorageBackend, error::Result};
///
/// async fn cached_size(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("mkxp-z/core/mkxp-z_libretro.wasm");
///     if backend.exists(path).await? {
///         Ok(backend.stat(path).await?.size)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Check that this backend actually works in the current environment.
    ///
    /// Writes, reads back and deletes a small file at [`PROBE_PATH`]. Any
    /// failure is reported as [`Unavailable`](ErrorKind::Unavailable); this is
    /// an expected outcome on locked-down systems, not a bug.
    async fn probe(&self) -> Result<()> {
        let path = Path::new(PROBE_PATH);
        let unavailable = || ErrorKind::Unavailable(self.name().to_string());
        self.write(path, PROBE_PAYLOAD).await.or_raise(unavailable)?;
        let read = self.read(path).await.or_raise(unavailable)?;
        if read != PROBE_PAYLOAD {
            exn::bail!(ErrorKind::Unavailable(format!("{}: probe payload mismatch", self.name())));
        }
        self.delete(path).await.or_raise(unavailable)
    }

    /// List all files matching an optional prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata matching an optional prefix.
    ///
    /// If a prefix is provided, only files whose paths start with the prefix
    /// (component-wise) are returned. Asking for a prefix that does not exist
    /// yields an empty stream, not an error.
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents, replacing any existing file wholesale.
    ///
    /// # Notes
    /// - Implementations must create parent directories as needed.
    /// - Implementations must be atomic: either the complete new contents
    ///   are visible afterwards, or the previous file (if any) is untouched.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Get file metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;

    /// Create a directory (and all of its parents) if it does not exist yet.
    async fn create_dir(&self, path: &Path) -> Result<()>;
}
