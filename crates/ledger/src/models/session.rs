use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use time::UtcDateTime;

/// How the acceptance step treats a top candidate that misses the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Collect low-confidence matches into a deferred review list.
    #[display("batch")]
    Batch,
    /// Reject low-confidence matches outright (marked skipped).
    #[display("strict")]
    Strict,
    /// Defer to a human. The UI itself lives outside this codebase, so at
    /// dispatch time this behaves like `Batch`.
    #[display("interactive")]
    Interactive,
}

impl FromStr for RunMode {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch" => Ok(Self::Batch),
            "strict" => Ok(Self::Strict),
            "interactive" => Ok(Self::Interactive),
            _ => Err(exn::Exn::from(ErrorKind::InvalidData("run mode"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[display("running")]
    Running,
    #[display("paused")]
    Paused,
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
}

impl SessionStatus {
    /// Terminal states never transition again; `ended_at` is stamped when
    /// one is entered.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl FromStr for SessionStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(exn::Exn::from(ErrorKind::InvalidData("session status"))),
        }
    }
}

/// Configuration snapshot stored with each session. A child session created
/// by resume copies its parent's snapshot verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub directory: PathBuf,
    pub mode: RunMode,
    pub num_workers: u32,
    pub force: bool,
}

/// Counters for a session. Monotonically non-decreasing while the session
/// runs; only [`Ledger::apply_delta`](crate::Ledger::apply_delta) changes
/// them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub total: u32,
    pub processed: u32,
    pub successful: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// Increments applied atomically to a session's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionDelta {
    pub total: u32,
    pub processed: u32,
    pub successful: u32,
    pub failed: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: i64,
    pub config: SessionConfig,
    pub parent_id: Option<i64>,
    pub status: SessionStatus,
    pub counters: SessionCounters,
    pub started_at: UtcDateTime,
    pub ended_at: Option<UtcDateTime>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct SessionRow {
    id: i64,
    directory: String,
    run_mode: String,
    num_workers: i64,
    force_reprocess: i64,
    parent_id: Option<i64>,
    status: String,
    total_files: i64,
    files_processed: i64,
    files_successful: i64,
    files_failed: i64,
    files_skipped: i64,
    started_at: i64,
    ended_at: Option<i64>,
}

fn counter(value: i64, what: &'static str) -> Result<u32, Error> {
    u32::try_from(value).or_raise(|| ErrorKind::InvalidData(what))
}

impl TryFrom<SessionRow> for Session {
    type Error = Error;
    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            config: SessionConfig {
                directory: PathBuf::from(row.directory),
                mode: row.run_mode.parse::<RunMode>()?,
                num_workers: counter(row.num_workers, "worker count")?,
                force: row.force_reprocess != 0,
            },
            parent_id: row.parent_id,
            status: row.status.parse::<SessionStatus>()?,
            counters: SessionCounters {
                total: counter(row.total_files, "total counter")?,
                processed: counter(row.files_processed, "processed counter")?,
                successful: counter(row.files_successful, "successful counter")?,
                failed: counter(row.files_failed, "failed counter")?,
                skipped: counter(row.files_skipped, "skipped counter")?,
            },
            started_at: UtcDateTime::from_unix_timestamp(row.started_at)
                .or_raise(|| ErrorKind::InvalidData("session start date"))?,
            ended_at: row
                .ended_at
                .map(|ts| UtcDateTime::from_unix_timestamp(ts).or_raise(|| ErrorKind::InvalidData("session end date")))
                .transpose()?,
        })
    }
}
