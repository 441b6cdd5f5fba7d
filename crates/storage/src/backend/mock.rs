//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::{validate as validate_path, validate_nested};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use time::UtcDateTime;
use tokio::sync::RwLock;

use crate::StorageBackend;

/// In-memory storage backend for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Ideal for unit
/// tests that need a [`StorageBackend`] without filesystem dependencies.
///
/// A backend built with [`unavailable`](Self::unavailable) rejects every
/// operation, which is how a locked-down environment looks to the loader.
///
/// # Examples
///
/// ```
/// use retrocache_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([
///     ("mkxp-z/core/mkxp-z_libretro.js", b"console.log(1)"),
/// ]);
/// assert!(backend.exists(Path::new("mkxp-z/core/mkxp-z_libretro.js")).await?);
///
/// backend.write(Path::new("roms/game.zip"), b"PK...").await?;
/// assert!(backend.exists(Path::new("roms/game.zip")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    available: bool,
    storage: RwLock<HashMap<PathBuf, (UtcDateTime, Vec<u8>)>>,
    directories: RwLock<BTreeSet<PathBuf>>,
    writes: AtomicUsize,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = UtcDateTime::now();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_nested(&path) else {
                // The panic here is DELIBERATE. MockBackend is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            available: true,
            storage: RwLock::new(map),
            directories: RwLock::new(BTreeSet::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// A backend whose every operation fails with `PermissionDenied`.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of successful writes performed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Directories created through [`StorageBackend::create_dir`].
    pub async fn directories(&self) -> Vec<PathBuf> {
        self.directories.read().await.iter().cloned().collect()
    }

    fn guard(&self, path: &Path) -> Result<()> {
        match self.available {
            true => Ok(()),
            false => exn::bail!(ErrorKind::PermissionDenied(path.to_path_buf())),
        }
    }

    fn file_info(&self, path: &Path, size: u64, inserted: UtcDateTime) -> FileInfo {
        FileInfo::new(path, size, inserted)
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        if let Err(e) = self.guard(prefix.unwrap_or(Path::new("."))) {
            return Box::pin(futures::stream::once(async { Err(e) }));
        }

        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<(PathBuf, (UtcDateTime, u64))> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .map(|(path, (inserted, data))| (path.clone(), (*inserted, data.len() as u64)))
                    .collect()
            };
            for (path, (inserted, size)) in entries {
                yield Ok(self.file_info(&path, size, inserted));
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.guard(path)?;
        let path = validate_nested(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.guard(path)?;
        let path = validate_nested(path)?;
        let (_inserted, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.guard(path)?;
        let path = validate_nested(path)?;
        self.storage.write().await.insert(path, (UtcDateTime::now(), data.to_vec()));
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.guard(path)?;
        let path = validate_nested(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.guard(path)?;
        let path = validate_nested(path)?;
        let guard = self.storage.read().await;
        let (inserted, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(self.file_info(&path, data.len() as u64, *inserted))
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        self.guard(path)?;
        let path = validate_path(path)?;
        self.directories.write().await.insert(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let backend = MockBackend::default();
        backend.write(Path::new("dir/test.txt"), b"hello").await.unwrap();
        let data = backend.read(Path::new("dir/test.txt")).await.unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn test_with_files() {
        let backend = MockBackend::with_files([
            ("a/core.wasm", Vec::from(*b"wasm")),
            ("b/game.zip", Vec::from(*b"zip")),
        ]);
        assert!(backend.exists(Path::new("a/core.wasm")).await.unwrap());
        assert!(backend.exists(Path::new("b/game.zip")).await.unwrap());
        assert!(!backend.exists(Path::new("c/nope")).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let backend = MockBackend::default();
        let err = backend.read(Path::new("dir/missing.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MockBackend::default();
        backend.write(Path::new("dir/file.txt"), b"data").await.unwrap();
        backend.delete(Path::new("dir/file.txt")).await.unwrap();
        assert!(!backend.exists(Path::new("dir/file.txt")).await.unwrap());
        let err = backend.delete(Path::new("dir/file.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stat() {
        let backend = MockBackend::default();
        backend.write(Path::new("roms/game.zip"), b"12345").await.unwrap();
        let info = backend.stat(Path::new("roms/game.zip")).await.unwrap();
        assert_eq!(info.path, PathBuf::from("roms/game.zip"));
        assert_eq!(info.size, 5);
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let backend = MockBackend::with_files([
            ("mkxp-z/saves/slot1.srm", Vec::from(*b"a")),
            ("mkxp-z/saves/slot2.srm", Vec::from(*b"b")),
            ("mkxp-z/states/slot1.state", Vec::from(*b"c")),
        ]);
        let files = backend.list(Some(Path::new("mkxp-z/saves"))).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_create_dir() {
        let backend = MockBackend::default();
        backend.create_dir(Path::new("/mkxp-z/saves")).await.unwrap();
        assert_eq!(backend.directories().await, vec![PathBuf::from("mkxp-z/saves")]);
    }

    #[tokio::test]
    async fn test_probe() {
        let backend = MockBackend::default();
        backend.probe().await.unwrap();
        assert!(backend.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let backend = MockBackend::unavailable();
        let err = backend.probe().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unavailable(_)));
        let err = backend.read(Path::new("dir/file.bin")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
        assert!(backend.write(Path::new("dir/file.bin"), b"data").await.is_err());
        assert!(backend.list(None).await.is_err());
    }

    #[tokio::test]
    async fn test_path_validation() {
        let backend = MockBackend::default();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape"), b"bad").await.is_err());
        assert!(backend.write(Path::new("shallow.bin"), b"bad").await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", Vec::from(*b"bad"))]);
    }
}
