//! Batch orchestration: retry, resume and the worker pool.
//!
//! This crate ties the seams together. [`JobDispatcher`] fans archive files
//! out over a bounded pool of workers, each running the match pipeline from
//! `tome-match` against the backends from `tome-catalog` under a
//! [`RetryPolicy`]; every result is persisted to the `tome-ledger` session
//! as it completes. [`ResumeManager`] owns the session state machine, so an
//! interrupted run can pick up exactly the files it still owes.

mod dispatch;
pub mod error;
mod report;
mod resume;
mod retry;
mod worker;

pub use crate::dispatch::JobDispatcher;
pub use crate::report::RunSummary;
pub use crate::resume::ResumeManager;
pub use crate::retry::{RetryPolicy, Retryable};
pub use crate::worker::{WorkerContext, WorkerReport};
