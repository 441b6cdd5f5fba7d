//! Fetch Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Only two kinds ever reach a user: [`ErrorKind::Network`] (wrapped in
//! [`ErrorKind::Aborted`] when it ends a loading phase) and
//! [`ErrorKind::BlockStoreRequired`]. Storage read/write problems during a
//! fetch are logged and absorbed; validator or size mismatches are ordinary
//! cache misses and never errors.

use derive_more::{Display, Error};

/// A fetch error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A `HEAD` or `GET` request failed, or the server answered with an
    /// error status.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The asset URL could not be parsed or is not HTTP(S).
    #[display("invalid asset url: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// The asset's block store path is not a valid nested storage path, or
    /// another asset in the same load already uses it.
    #[display("invalid block store path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// Configuration mandates the block store, but it failed its probe.
    #[display("block storage is required but unavailable")]
    BlockStoreRequired,
    /// A block store operation the caller depends on (mounting) failed.
    #[display("block storage error")]
    Storage,
    /// One asset failed fatally, so the whole loading phase was abandoned.
    #[display("asset loading aborted")]
    Aborted,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Aborted)
    }
}
