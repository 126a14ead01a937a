//! Config Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Clone, Display, Error)]
pub enum ErrorKind {
    /// The platform gave us no home/cache/data directories to default into.
    #[display("could not determine platform directories")]
    ProjectDirs,
    /// The merged configuration failed to deserialize or validate.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
}
