//! Command definitions and execution.

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand, ValueEnum};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::UtcDateTime;
use time::format_description::well_known::Rfc3339;
use tome_batch::{JobDispatcher, ResumeManager, RetryPolicy, RunSummary, WorkerContext};
use tome_catalog::IndexCache;
use tome_catalog::mock::{MockArchive, MockCatalog};
use tome_config::Settings;
use tome_ledger::{Database, FileRecord, Ledger, RunMode, Session, SessionConfig};

/// Batch metadata tagger for comic-book (BD) archives.
#[derive(Parser)]
#[command(name = "tome", version, about)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tag every archive under a directory.
    Run {
        directory: PathBuf,
        /// Worker pool size.
        #[arg(long)]
        workers: Option<u32>,
        /// How to treat matches under the acceptance threshold.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Re-process files the ledger already knows.
        #[arg(long)]
        force: bool,
        /// Catalog/archive backend. Only the in-memory mock pair ships with
        /// this binary; real scrapers plug in through the tome-catalog traits.
        #[arg(long, value_enum, default_value_t = BackendArg::Mock)]
        backend: BackendArg,
    },
    /// List every recorded session.
    Sessions,
    /// Show one session and its files.
    Session { id: i64 },
    /// Resume a paused or failed session.
    Resume { id: i64 },
    /// List files deferred for human review.
    Review {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Aggregate statistics over recently processed files.
    Stats {
        /// Look-back window in days.
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Batch,
    Strict,
    Interactive,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Batch => Self::Batch,
            ModeArg::Strict => Self::Strict,
            ModeArg::Interactive => Self::Interactive,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Mock,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::load(self.config.as_deref()).map_err(ErrorKind::config)?;
        if let Some(parent) = settings.ledger_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .or_raise(|| ErrorKind::DataDir(parent.to_path_buf()))?;
        }
        let db = Database::connect(&settings.ledger_path).await.map_err(ErrorKind::ledger)?;
        let ledger = Ledger::with_album_ttl(&db, time::Duration::days(i64::from(settings.album_ttl_days)));

        let result = match self.command {
            Command::Run { directory, workers, mode, force, backend: BackendArg::Mock } => {
                let config = SessionConfig {
                    directory: directory.clone(),
                    mode: mode.map(RunMode::from).unwrap_or(settings.mode),
                    num_workers: workers.unwrap_or(settings.num_workers),
                    force,
                };
                let files = scan_archives(&directory)?;
                tracing::info!(files = files.len(), directory = %directory.display(), "archives found");
                let dispatcher = dispatcher(&settings, &ledger, config.mode).await;
                let summary = dispatcher.run(files, &config, None).await.map_err(ErrorKind::batch)?;
                print_summary(&summary);
                Ok(())
            },
            Command::Sessions => {
                for session in ledger.list_sessions().await.map_err(ErrorKind::ledger)? {
                    print_session_line(&session);
                }
                Ok(())
            },
            Command::Session { id } => {
                let session = ledger.get_session(id).await.map_err(ErrorKind::ledger)?;
                print_session_line(&session);
                for file in ledger.get_session_files(id).await.map_err(ErrorKind::ledger)? {
                    print_file_line(&file);
                }
                Ok(())
            },
            Command::Resume { id } => {
                let manager = ResumeManager::new(ledger.clone());
                let (child, remaining) = manager.resume(id).await.map_err(ErrorKind::batch)?;
                println!("session {id} resumed as session {child}: {} file(s) remaining", remaining.len());
                let config = ledger.get_session(child).await.map_err(ErrorKind::ledger)?.config;
                let dispatcher = dispatcher(&settings, &ledger, config.mode).await;
                let summary = dispatcher.run(remaining, &config, Some(child)).await.map_err(ErrorKind::batch)?;
                print_summary(&summary);
                Ok(())
            },
            Command::Review { limit } => {
                for file in ledger.files_needing_review(limit).await.map_err(ErrorKind::ledger)? {
                    print_file_line(&file);
                }
                Ok(())
            },
            Command::Stats { days } => {
                let stats = ledger.statistics(days).await.map_err(ErrorKind::ledger)?;
                println!("last {days} day(s):");
                println!("  files:       {}", stats.total_files);
                println!("  successful:  {}", stats.files_successful);
                println!("  manual:      {}", stats.files_manual);
                println!("  failed:      {}", stats.files_failed);
                println!("  skipped:     {}", stats.files_skipped);
                println!("  series:      {}", stats.unique_series);
                println!("  publishers:  {}", stats.unique_publishers);
                println!("  avg time:    {}ms", stats.avg_duration_ms);
                Ok(())
            },
        };
        db.close().await;
        result
    }
}

/// Build the dispatcher with the mock backend pair wired in.
async fn dispatcher(settings: &Settings, ledger: &Ledger, mode: RunMode) -> JobDispatcher {
    let context = Arc::new(WorkerContext {
        catalog: Arc::new(MockCatalog::new()),
        archive: Arc::new(MockArchive::new()),
        index: Arc::new(
            IndexCache::load(
                settings.index_cache_path.clone(),
                time::Duration::hours(i64::from(settings.index_ttl_hours)),
            )
            .await,
        ),
        scorer: settings.scorer,
        mode,
        retry: settings.retry,
    });
    let dispatcher = JobDispatcher::new(ledger.clone(), context).with_output_dir(settings.output_dir.clone());

    // First ctrl-c pauses the run once in-flight files drain; the session
    // can be picked up later with `tome resume`.
    let token = dispatcher.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("pausing: waiting for in-flight files to finish");
            token.cancel();
        }
    });
    dispatcher
}

/// Collect comic archives under `dir`, recursively, in stable order.
/// Symlinks are skipped: a looping link would otherwise recurse forever.
fn scan_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let meta = std::fs::symlink_metadata(&path)?;
            if meta.is_symlink() {
                tracing::debug!(path = %path.display(), "skipping symlink");
            } else if meta.is_dir() {
                walk(&path, found)?;
            } else if matches!(
                path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
                Some("cbz" | "cbr")
            ) {
                found.push(path);
            }
        }
        Ok(())
    }
    let mut found = Vec::new();
    walk(dir, &mut found).or_raise(|| ErrorKind::Scan(dir.to_path_buf()))?;
    found.sort();
    Ok(found)
}

fn when(ts: UtcDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| "-".to_string())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "session {}: {} total, {} successful, {} for review, {} skipped, {} failed",
        summary.session_id, summary.total, summary.successful, summary.low_confidence, summary.skipped, summary.failed,
    );
}

fn print_session_line(session: &Session) {
    println!(
        "#{:<5} {:<10} {:<11} {:>4}/{:<4} started {} {}",
        session.id,
        session.status,
        session.config.mode,
        session.counters.processed,
        session.counters.total,
        when(session.started_at),
        session.parent_id.map(|p| format!("(resumes #{p})")).unwrap_or_default(),
    );
}

fn print_file_line(file: &FileRecord) {
    let title = file.album.as_ref().map(|a| a.title.as_str()).unwrap_or("-");
    let confidence = file.confidence.map(|c| format!("{c:.2}")).unwrap_or_else(|| "-".to_string());
    println!("{:<9} {} {} ({})", file.status.to_string(), file.path.display(), title, confidence);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_finds_archives_recursively_in_order() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("thorgal")).unwrap();
        std::fs::write(dir.path().join("thorgal/Tome 03.cbz"), b"a").unwrap();
        std::fs::write(dir.path().join("Alix - Tome 05.CBR"), b"b").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"c").unwrap();

        let found = scan_archives(dir.path()).unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("Alix - Tome 05.CBR"), dir.path().join("thorgal/Tome 03.cbz")],
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_survives_symlink_loops() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("shelf")).unwrap();
        std::fs::write(dir.path().join("shelf/Tome 01.cbz"), b"a").unwrap();
        // A link back to the scan root would recurse forever if followed.
        std::os::unix::fs::symlink(dir.path(), dir.path().join("shelf/loop")).unwrap();

        let found = scan_archives(dir.path()).unwrap();
        assert_eq!(found, vec![dir.path().join("shelf/Tome 01.cbz")]);
    }
}
