//! Ledger Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A ledger error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Losing the ledger breaks the at-most-once processing guarantee, which is
/// why none of these are retryable: a batch run treats any of them as fatal
/// to the session rather than soldiering on with broken accounting.
#[derive(Debug, Clone, Display, Error)]
pub enum ErrorKind {
    #[display("ledger database error")]
    Database,
    #[display("ledger migration error")]
    Migration,
    #[display("session not found: {_0}")]
    SessionNotFound(#[error(not(source))] i64),
    /// A value read from or written to the ledger doesn't fit its column.
    #[display("invalid ledger data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
