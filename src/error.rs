//! CLI Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;
use tome_batch::error::{Error as BatchError, ErrorKind as BatchErrorKind};
use tome_config::error::{Error as ConfigError, ErrorKind as ConfigErrorKind};
use tome_ledger::error::{Error as LedgerError, ErrorKind as LedgerErrorKind};

/// A CLI error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error: {_0}")]
    Config(ConfigErrorKind),
    #[display("ledger error: {_0}")]
    Ledger(LedgerErrorKind),
    #[display("batch error: {_0}")]
    Batch(BatchErrorKind),
    /// The target directory cannot be scanned for archives.
    #[display("cannot scan directory: {}", _0.display())]
    Scan(#[error(not(source))] PathBuf),
    /// The data directory for the ledger cannot be created.
    #[display("cannot prepare data directory: {}", _0.display())]
    DataDir(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Wrap a configuration error, preserving its `Exn` frame as a child.
    #[track_caller]
    pub fn config(err: ConfigError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Config(inner))
    }

    /// Wrap a ledger error, preserving its `Exn` frame as a child.
    #[track_caller]
    pub fn ledger(err: LedgerError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Ledger(inner))
    }

    /// Wrap a batch error, preserving its `Exn` frame as a child.
    #[track_caller]
    pub fn batch(err: BatchError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Batch(inner))
    }
}
