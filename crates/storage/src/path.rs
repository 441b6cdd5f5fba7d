//! Path validation and security utilities.
//!
//! This module provides functions to validate storage paths and prevent
//! security issues like path traversal attacks.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Minimum number of path components a stored file must have.
///
/// Files directly in the storage root are rejected so that every payload
/// lives inside a directory that can be mounted on its own.
pub const MIN_NESTING_DEPTH: usize = 2;

/// Validates a storage path for security and correctness.
/// Ensures that paths don't escape the storage root (no `..` traversal).
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use retrocache_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("mkxp-z/core.wasm").is_ok());
/// assert!(validate_path("a/../rom.zip").is_ok()); // (never leaves storage root)
/// // Invalid paths
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("wrong/../still-wrong/.././correct//./core.js/").unwrap(),
///     Path::new("correct/core.js")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    // Use Rust's built-in path component parser for robust handling of
    // separators and `.`/`..` segments.
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls, reject them explicitly.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Validates a path that names a stored *file*.
///
/// Same rules as [`validate`], plus the normalized path must have at least
/// [`MIN_NESTING_DEPTH`] components.
///
/// ```
/// use retrocache_storage::validate_file_path;
/// assert!(validate_file_path("mkxp-z/core/mkxp-z_libretro.wasm").is_ok());
/// assert!(validate_file_path("saves/slot1.srm").is_ok());
/// assert!(validate_file_path("rom.zip").is_err());
/// assert!(validate_file_path("saves/../rom.zip").is_err());
/// ```
pub fn validate_nested(path: impl AsRef<Path>) -> Result<PathBuf> {
    let validated = validate(path.as_ref())?;
    if validated.components().count() < MIN_NESTING_DEPTH {
        exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
    }
    Ok(validated)
}
