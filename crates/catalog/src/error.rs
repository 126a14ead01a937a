//! Catalog Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally. The kinds are `Clone` so downstream crates can embed them in
/// their own error trees while preserving the retryability verdict.
#[derive(Debug, Clone, Display, Error)]
pub enum ErrorKind {
    /// Transport failure talking to the remote catalog.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The catalog asked us to slow down.
    #[display("rate limited by catalog")]
    RateLimited,
    /// The catalog answered but the response made no sense.
    #[display("unparseable catalog response: {_0}")]
    Parse(#[error(not(source))] String),
    /// No album with the given catalog id.
    #[display("album not found in catalog: {_0}")]
    NotFound(#[error(not(source))] u64),
    /// The archive file cannot be opened as an archive. Retrying cannot help.
    #[display("corrupt archive: {}", _0.display())]
    CorruptArchive(#[error(not(source))] PathBuf),
    /// Local I/O failure (cover extraction, cache persistence).
    #[display("I/O error: {_0}")]
    Io(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited | Self::Io(_))
    }
}
