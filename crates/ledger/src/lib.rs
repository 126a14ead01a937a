//! SQLite ledger for batch tagging runs.
//!
//! This crate owns the durable record of what has been done to a library:
//! which archives were processed and with what result, which sessions ran
//! them, which catalog albums are cached, and the audit trail of metadata
//! changes. Unlike a throwaway cache, the ledger *is* the source of truth
//! for deduplication and resume: losing it means re-tagging everything.
//!
//! # Architecture
//! Four tables, one repository:
//! - **Sessions**: one row per dispatch run, with live counters and an
//!   optional `parent_id` link forming the resume chain.
//! - **Files**: one row per archive path (unique), updated in place when a
//!   file is re-processed. `pending` rows are pre-registered at dispatch
//!   start so a resume can see files the interrupted run never reached.
//! - **Albums**: a TTL'd cache of catalog records, keyed by album id.
//! - **History**: append-only audit rows for metadata changes.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::{
    CachedAlbum, ChangeSource, FileOutcome, FileRecord, FileStatus, HistoryEntry, MatchedAlbum, RunMode, Session,
    SessionConfig, SessionCounters, SessionDelta, SessionStatus,
};
pub use crate::repo::{DEFAULT_ALBUM_TTL, Ledger, LedgerStats};
