//! Local filesystem storage backend.
//!
//! This module provides a storage backend implementation for the local filesystem.
//! Files are stored in a configured directory and accessed using standard filesystem
//! operations via `tokio::fs` for async I/O.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::path::{validate as validate_path, validate_nested};
use crate::{FileInfo, StorageBackend, error::Result};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

/// Prefix of in-flight temporary files; never reported by listings.
const TEMP_PREFIX: &str = ".retrocache-";

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// Stores files in a directory on the local filesystem. All paths are relative
/// to the configured root directory.
///
/// # Examples
///
/// ```no_run
/// use retrocache_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("blocks", "/var/cache/retrocache/blocks")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory of the block store
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Arguments
    /// * `root` - Absolute path to the block store root directory
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, is not a directory, or
    /// cannot be created.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }

        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Use non-async here; it'll only happen once on startup and it's
            // not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }

        Ok(Self { name: name.into(), root })
    }

    /// Root directory on the local filesystem.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the absolute path for a relative storage path naming a directory.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Get the absolute path for a relative storage path naming a file.
    fn absolute_file_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_nested(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Convert an absolute path back to a relative storage path.
    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        if !absolute.is_absolute() {
            exn::bail!(ErrorKind::BackendError(format!(
                "attempting to get relative path of non-absolute path `{:?}`",
                absolute
            )))
        }
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        Ok(validate_path(relative)?)
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(path, metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::ReadOnlyFilesystem => {
                ErrorKind::PermissionDenied(path.to_path_buf())
            },
            _ => ErrorKind::Io(e),
        }
    }

    fn is_temporary(path: &Path) -> bool {
        path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with(TEMP_PREFIX))
    }

    /// Writes `data` to a temporary sibling of `target`, then renames it into
    /// place. The temporary file is removed if any step fails.
    fn write_atomic(target: &Path, data: &[u8]) -> std::io::Result<()> {
        let parent = target.parent().unwrap_or(Path::new("."));
        let mut temp = tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(parent)?;
        temp.write_all(data)?;
        temp.as_file().sync_all()?;
        temp.persist(target).map_err(|e| e.error)?;
        Ok(())
    }

    /// Keeps the stream loop in `list_stream` free of error plumbing: convert
    /// everything here, then let the loop yield it.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if metadata.is_file() && !Self::is_temporary(&relative) {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Note: silently drop in-flight temporary files and what is most
        // likely a broken symlink.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };

        let start_dir = validated_prefix
            .as_ref()
            // Walk from the parent directory of the prefix path. Avoids
            // erroring on prefixes where the leaf component doesn't exist yet
            // or is a file. So the prefix "mkxp-z/saves" would become a
            // starting directory of "mkxp-z" and match:
            // - [MATCH] "mkxp-z/saves/slot1.srm"
            // - [NOT MATCH] "mkxp-z/savestates/slot1.state" (Path::starts_with is component-based)
            .map(|prefix| self.root.join(prefix).parent().unwrap_or(&self.root).to_path_buf())
            .unwrap_or_else(|| self.root.clone());
        let mut stack = vec![start_dir];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Asking for the contents of a directory that doesn't
                    // exist results in an empty list, not an error.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_file_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_file_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    #[tracing::instrument(level = "trace", skip(self, data), fields(backend = %self.name, bytes = data.len()))]
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_file_path(path)?;
        // Intermediate directories are created lazily, on first write.
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        let data = data.to_vec();
        let written = tokio::task::spawn_blocking(move || Self::write_atomic(&abs_path, &data))
            .await
            .or_raise(|| ErrorKind::BackendError(format!("write task for `{}` did not complete", path.display())))?;
        Ok(written.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_file_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let abs_path = self.absolute_file_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        Self::metadata(path, metadata)
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::create_dir_all(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
        assert!(LocalBackend::new("name", "./relative").is_err());
    }

    #[test]
    fn test_new_creates_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("not/yet/there");
        LocalBackend::new("name", &root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_new_rejects_file_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("file");
        std::fs::write(&file, b"data").unwrap();
        let err = LocalBackend::new("name", &file).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[test]
    fn test_absolute_path() {
        let (temp_dir, backend) = backend();
        let expected = temp_dir.path().join("mkxp-z/core.wasm");
        assert_eq!(backend.absolute_file_path(Path::new("mkxp-z/core.wasm")).unwrap(), expected);
        // Path traversal is prevented
        assert!(backend.absolute_file_path(Path::new("../etc/passwd")).is_err());
        // Files must be nested
        assert!(backend.absolute_file_path(Path::new("core.wasm")).is_err());
    }

    #[test]
    fn test_relative_path() {
        let (temp_dir, backend) = backend();
        let abs = temp_dir.path().join("mkxp-z/core.wasm");
        assert_eq!(backend.relative_path(&abs).unwrap(), Path::new("mkxp-z/core.wasm"));
        let outside = PathBuf::from("/other/file.bin");
        assert!(backend.relative_path(&outside).is_err());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_temp_dir, backend) = backend();
        let data = b"Hello, world!";
        backend.write(Path::new("dir/test.txt"), data).await.unwrap();
        let read_data = backend.read(Path::new("dir/test.txt")).await.unwrap();
        assert_eq!(read_data, data);
    }

    #[tokio::test]
    async fn test_write_replaces_wholesale() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("dir/rom.zip"), b"0123456789").await.unwrap();
        backend.write(Path::new("dir/rom.zip"), b"abc").await.unwrap();
        assert_eq!(backend.read(Path::new("dir/rom.zip")).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_write_leaves_no_temporary_files() {
        let (temp_dir, backend) = backend();
        backend.write(Path::new("dir/file.bin"), b"data").await.unwrap();
        let names: Vec<_> = std::fs::read_dir(temp_dir.path().join("dir"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["file.bin".to_string()]);
    }

    #[test]
    fn test_failed_write_leaves_no_temporary_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        // The target is an existing directory, so the final rename fails.
        let target = temp_dir.path().join("occupied");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"data").unwrap();
        assert!(LocalBackend::write_atomic(&target, b"half").is_err());
        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["occupied".to_string()]);
    }

    #[tokio::test]
    async fn test_list_skips_temporary_files() {
        let (temp_dir, backend) = backend();
        backend.write(Path::new("dir/file.bin"), b"data").await.unwrap();
        std::fs::write(temp_dir.path().join(format!("dir/{TEMP_PREFIX}abc123")), b"half").unwrap();
        let listed = backend.list(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, PathBuf::from("dir/file.bin"));
    }

    #[test]
    fn test_debug_names_root() {
        let (temp_dir, backend) = backend();
        assert!(format!("{backend:?}").contains(&temp_dir.path().display().to_string()));
    }

    #[tokio::test]
    async fn test_write_rejects_shallow_paths() {
        let (_temp_dir, backend) = backend();
        let err = backend.write(Path::new("rom.zip"), b"data").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_write_creates_directories() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("a/b/c/file.txt"), b"data").await.unwrap();
        assert!(backend.exists(Path::new("a/b/c/file.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists() {
        let (_temp_dir, backend) = backend();
        assert!(!backend.exists(Path::new("dir/nonexistent.txt")).await.unwrap());
        backend.write(Path::new("dir/exists.txt"), b"data").await.unwrap();
        assert!(backend.exists(Path::new("dir/exists.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let (_temp_dir, backend) = backend();
        let err = backend.read(Path::new("dir/missing.bin")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("dir/file.txt"), b"data").await.unwrap();
        backend.delete(Path::new("dir/file.txt")).await.unwrap();
        assert!(!backend.exists(Path::new("dir/file.txt")).await.unwrap());
        let err = backend.delete(Path::new("dir/nonexistent.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stat() {
        let (_temp_dir, backend) = backend();
        let data = b"Hello, world!";
        backend.write(Path::new("dir/file.txt"), data).await.unwrap();
        let info = backend.stat(Path::new("dir/file.txt")).await.unwrap();
        assert_eq!(info.path, PathBuf::from("dir/file.txt"));
        assert_eq!(info.size, data.len() as u64);
    }

    #[tokio::test]
    async fn test_create_dir() {
        let (temp_dir, backend) = backend();
        backend.create_dir(Path::new("/mkxp-z/saves")).await.unwrap();
        assert!(temp_dir.path().join("mkxp-z/saves").is_dir());
        // Idempotent
        backend.create_dir(Path::new("mkxp-z/saves")).await.unwrap();
        assert!(backend.create_dir(Path::new("../outside")).await.is_err());
    }

    #[tokio::test]
    async fn test_probe() {
        let (temp_dir, backend) = backend();
        backend.probe().await.unwrap();
        assert!(!temp_dir.path().join(crate::backend::PROBE_PATH).exists());
    }

    #[tokio::test]
    async fn test_list_empty_directory() {
        let (_temp_dir, backend) = backend();
        assert!(backend.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("mkxp-z/saves/slot1.srm"), b"data").await.unwrap();
        backend.write(Path::new("mkxp-z/saves/slot2.srm"), b"data").await.unwrap();
        backend.write(Path::new("mkxp-z/savestates/slot1.state"), b"data").await.unwrap();
        backend.write(Path::new("mkxp-z/core/core.wasm"), b"data").await.unwrap();
        assert_eq!(backend.list(None).await.unwrap().len(), 4);
        let saves = backend.list(Some(Path::new("mkxp-z/saves/"))).await.unwrap();
        assert_eq!(saves.len(), 2);
        let paths: Vec<_> = saves.iter().map(|f| &f.path).collect();
        assert!(paths.contains(&&PathBuf::from("mkxp-z/saves/slot1.srm")));
        assert!(paths.contains(&&PathBuf::from("mkxp-z/saves/slot2.srm")));
    }

    #[tokio::test]
    async fn test_list_nonexistent_prefix() {
        let (_temp_dir, backend) = backend();
        assert!(backend.list(Some(Path::new("nonexistent/"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_temp_dir, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.read(Path::new("etc/../../passwd")).await.is_err());
        assert!(backend.write(Path::new("../etc/passwd"), b"data").await.is_err());
        assert!(backend.delete(Path::new("../../file")).await.is_err());
    }
}
