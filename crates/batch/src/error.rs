//! Batch Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;
use tome_catalog::error::{Error as CatalogError, ErrorKind as CatalogErrorKind};
use tome_ledger::SessionStatus;
use tome_ledger::error::{Error as LedgerError, ErrorKind as LedgerErrorKind};

/// A batch orchestration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for batch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally.
#[derive(Debug, Clone, Display, Error)]
pub enum ErrorKind {
    /// A catalog or archive operation failed.
    #[display("catalog error: {_0}")]
    Catalog(CatalogErrorKind),
    /// The ledger rejected a read or write. Fatal to the session.
    #[display("ledger error: {_0}")]
    Ledger(LedgerErrorKind),
    /// The session is not in a state that allows the requested transition.
    #[display("session {session} is {status}, cannot {action}")]
    InvalidSessionState {
        #[error(not(source))]
        session: i64,
        #[error(not(source))]
        status: SessionStatus,
        #[error(not(source))]
        action: &'static str,
    },
    /// Writing the run summary report failed.
    #[display("failed to write run summary: {}", _0.display())]
    Report(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Convert a catalog error into a batch error, preserving the catalog
    /// crate's `Exn` frame (error tree) as a child in its own error tree.
    #[track_caller]
    pub fn catalog(err: CatalogError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Catalog(inner))
    }

    /// Convert a ledger error into a batch error, preserving the ledger
    /// crate's `Exn` frame as a child in its own error tree.
    #[track_caller]
    pub fn ledger(err: LedgerError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Ledger(inner))
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Catalog(kind) => kind.is_retryable(),
            Self::Ledger(kind) => kind.is_retryable(),
            Self::InvalidSessionState { .. } | Self::Report(_) => false,
        }
    }
}
