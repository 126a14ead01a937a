//! Fan-out of archive files over a bounded worker pool.
//!
//! The dispatcher owns every ledger write a run makes. Workers are spawned
//! tasks that hand back serializable [`WorkerReport`] values; their results
//! are consumed in completion order and persisted immediately, so a crash
//! loses at most the files that were in flight. Cancellation stops intake,
//! drains what is already running, and leaves the session `paused` for a
//! later resume.

use crate::error::{ErrorKind, Result};
use crate::report::RunSummary;
use crate::worker::{WorkerContext, WorkerReport, process_file};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tome_ledger::{ChangeSource, FileOutcome, FileStatus, Ledger, SessionConfig, SessionDelta, SessionStatus};

/// Orchestrates one batch run end to end.
pub struct JobDispatcher {
    ledger: Ledger,
    context: Arc<WorkerContext>,
    output_dir: Option<PathBuf>,
    cancel: CancellationToken,
}

impl JobDispatcher {
    pub fn new(ledger: Ledger, context: Arc<WorkerContext>) -> Self {
        Self {
            ledger,
            context,
            output_dir: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Also write `batch_<timestamp>.json` / `.csv` reports into `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Token that pauses the run when cancelled. Hand a clone to a ctrl-c
    /// handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the pool over `files`.
    ///
    /// With `resume_into` set the dispatcher adopts that session (a resume
    /// child) instead of opening a new one. Files already processed are
    /// filtered out first unless the config says `force`.
    pub async fn run(&self, files: Vec<PathBuf>, config: &SessionConfig, resume_into: Option<i64>) -> Result<RunSummary> {
        // A resume hands us the exact owed set (which includes previously
        // failed files), so only fresh runs dedup against the ledger.
        let mut remaining = Vec::with_capacity(files.len());
        if resume_into.is_some() || config.force {
            remaining = files;
        } else {
            for path in files {
                if self.ledger.is_processed(&path, None).await.map_err(ErrorKind::ledger)? {
                    tracing::debug!(path = %path.display(), "already processed, skipping");
                } else {
                    remaining.push(path);
                }
            }
        }

        let session = match resume_into {
            Some(id) => id,
            None => self.ledger.start_session(config, None).await.map_err(ErrorKind::ledger)?,
        };
        tracing::info!(session, files = remaining.len(), workers = config.num_workers, "dispatching");

        let summary = self.pump(session, remaining, config).await;
        let mut summary = match summary {
            Ok(summary) => summary,
            // The run itself is already lost; the best we can do is make
            // sure the session row says so before propagating.
            Err(err) => {
                _ = self.ledger.set_status(session, SessionStatus::Failed).await;
                return Err(err);
            },
        };

        summary.close();
        if let Some(dir) = &self.output_dir {
            summary.write(dir).await?;
        }
        Ok(summary)
    }

    /// The intake/drain loop. Every ledger failure aborts the run.
    async fn pump(&self, session: i64, files: Vec<PathBuf>, config: &SessionConfig) -> Result<RunSummary> {
        let total = u32::try_from(files.len()).unwrap_or(u32::MAX);
        self.ledger.register_pending(session, &files).await.map_err(ErrorKind::ledger)?;
        self.ledger
            .apply_delta(session, &SessionDelta { total, ..Default::default() })
            .await
            .map_err(ErrorKind::ledger)?;

        let workers = config.num_workers.max(1) as usize;
        let mut summary = RunSummary::new(session, total);
        let mut queue = files.into_iter();
        let mut inflight = FuturesUnordered::new();

        loop {
            // Top up the pool, unless we've been asked to stop taking work.
            while !self.cancel.is_cancelled() && inflight.len() < workers {
                let Some(path) = queue.next() else { break };
                let context = self.context.clone();
                inflight.push(async move {
                    let handle = tokio::spawn(process_file(context, path.clone()));
                    (path, handle.await)
                });
            }

            let Some((path, joined)) = inflight.next().await else { break };
            let report = match joined {
                Ok(report) => report,
                // A panicking worker must not take the pool down with it.
                Err(err) => {
                    tracing::error!(path = %path.display(), error = %err, "worker panicked");
                    WorkerReport {
                        outcome: FileOutcome {
                            path,
                            hash: String::new(),
                            size: None,
                            status: FileStatus::Failed,
                            album: None,
                            confidence: None,
                            error: Some(format!("worker panicked: {err}")),
                            attempts: 1,
                            duration_ms: 0,
                        },
                        metadata: None,
                    }
                },
            };
            self.persist(session, &report, &mut summary).await?;
        }

        let paused = self.cancel.is_cancelled() && summary.files.len() < summary.total as usize;
        let status = if paused { SessionStatus::Paused } else { SessionStatus::Completed };
        self.ledger.set_status(session, status).await.map_err(ErrorKind::ledger)?;
        tracing::info!(session, %status, processed = summary.files.len(), "dispatch finished");
        Ok(summary)
    }

    /// Record one worker report: file row, counter delta, album cache and
    /// audit trail.
    async fn persist(&self, session: i64, report: &WorkerReport, summary: &mut RunSummary) -> Result<()> {
        let outcome = &report.outcome;
        let file_id = self.ledger.record_processing(session, outcome).await.map_err(ErrorKind::ledger)?;
        self.ledger.apply_delta(session, &delta_for(outcome.status)).await.map_err(ErrorKind::ledger)?;

        if let Some(record) = &report.metadata {
            self.ledger.cache_album(record).await.map_err(ErrorKind::ledger)?;
            self.ledger
                .append_history(file_id, "album", None, Some(&record.title), ChangeSource::Auto)
                .await
                .map_err(ErrorKind::ledger)?;
        }
        summary.record(outcome);
        Ok(())
    }
}

fn delta_for(status: FileStatus) -> SessionDelta {
    SessionDelta {
        total: 0,
        // Success and manual both consumed the file; skipped and failed
        // leave it owed to a future resume.
        processed: u32::from(status.is_processed()),
        successful: u32::from(status == FileStatus::Success),
        failed: u32::from(status == FileStatus::Failed),
        skipped: u32::from(status == FileStatus::Skipped),
    }
}
