use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An explicitly requested configuration file does not exist.
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// A source could not be read, parsed or merged.
    #[display("invalid configuration")]
    Invalid,
    /// An asset entry does not resolve to a usable asset.
    #[display("invalid asset: {_0}")]
    Asset(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Configuration errors never go away without the user fixing something.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
