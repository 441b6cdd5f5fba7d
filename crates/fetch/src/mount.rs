use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use retrocache_storage::{BackendHandle, FileInfo, validate_path};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// A persistent directory made ready for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Normalised relative directory within the block store.
    pub dir: PathBuf,
    /// Files already present, from earlier sessions.
    pub files: Vec<FileInfo>,
}

/// Create each persistent directory (saves, states) in the block store and
/// report what it already holds.
///
/// Failure here is fatal: the session would otherwise start without access
/// to its save data.
#[instrument(skip_all, fields(backend = block_store.name(), dirs = dirs.len()))]
pub async fn mount_directories(block_store: &BackendHandle, dirs: &[impl AsRef<Path>]) -> Result<Vec<Mount>> {
    let mut mounts = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let dir = validate_path(dir.as_ref()).or_raise(|| ErrorKind::InvalidPath(dir.as_ref().display().to_string()))?;
        block_store.create_dir(&dir).await.or_raise(|| ErrorKind::Storage)?;
        let files = block_store.list(Some(&dir)).await.or_raise(|| ErrorKind::Storage)?;
        tracing::debug!(dir = %dir.display(), files = files.len(), "Mounted");
        mounts.push(Mount { dir, files });
    }
    Ok(mounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrocache_storage::backend::{LocalBackend, MockBackend};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mount_creates_and_lists() {
        let mock = Arc::new(MockBackend::with_files([
            ("mkxp-z/saves/slot1.srm", vec![1; 8]),
            ("mkxp-z/core/mkxp-z_libretro.js", vec![2; 8]),
        ]));
        let handle: BackendHandle = mock.clone();
        let mounts = mount_directories(&handle, &["mkxp-z/saves", "/mkxp-z/states/"]).await.unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].dir, PathBuf::from("mkxp-z/saves"));
        assert_eq!(mounts[0].files.len(), 1);
        assert_eq!(mounts[0].files[0].path, PathBuf::from("mkxp-z/saves/slot1.srm"));
        assert_eq!(mounts[1].dir, PathBuf::from("mkxp-z/states"));
        assert!(mounts[1].files.is_empty());
        assert_eq!(
            mock.directories().await,
            vec![PathBuf::from("mkxp-z/saves"), PathBuf::from("mkxp-z/states")]
        );
    }

    #[tokio::test]
    async fn test_mount_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let handle: BackendHandle = Arc::new(LocalBackend::new("local", dir.path()).unwrap());
        mount_directories(&handle, &["mkxp-z/saves"]).await.unwrap();
        assert!(dir.path().join("mkxp-z/saves").is_dir());
    }

    #[tokio::test]
    async fn test_mount_failure_is_fatal() {
        let handle: BackendHandle = Arc::new(MockBackend::unavailable());
        let err = mount_directories(&handle, &["mkxp-z/saves"]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Storage));
        let handle: BackendHandle = Arc::new(MockBackend::default());
        let err = mount_directories(&handle, &["../outside"]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }
}
