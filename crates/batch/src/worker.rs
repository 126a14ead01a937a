//! Per-file matching pipeline.
//!
//! A worker takes one archive path and produces a [`WorkerReport`]. The
//! whole pipeline is infallible from the dispatcher's point of view: every
//! error, including a corrupt archive or an exhausted retry budget, is
//! folded into a `failed` outcome rather than surfaced as an `Err`. Workers
//! exchange plain serializable values with the dispatcher and never touch
//! the ledger themselves.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tome_catalog::{ArchiveBackend, CatalogBackend, IndexCache, MetadataRecord};
use tome_ledger::{FileOutcome, FileStatus, MatchedAlbum, RunMode};
use tome_match::{FilenameHints, ScoredCandidate, ScorerConfig, rank};

/// Everything a worker needs, shared across the pool.
pub struct WorkerContext {
    pub catalog: Arc<dyn CatalogBackend>,
    pub archive: Arc<dyn ArchiveBackend>,
    pub index: Arc<IndexCache>,
    pub scorer: ScorerConfig,
    pub mode: RunMode,
    pub retry: RetryPolicy,
}

/// The message a worker sends back to the dispatcher.
///
/// `metadata` rides alongside the outcome so the dispatcher (the sole
/// ledger writer) can populate the album cache after a successful match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub outcome: FileOutcome,
    pub metadata: Option<MetadataRecord>,
}

/// What one pass over the matching pipeline concluded.
enum Resolution {
    /// The top candidate cleared the acceptance threshold and its metadata
    /// has been embedded into the archive.
    Matched { scored: ScoredCandidate, record: MetadataRecord },
    /// No candidate cleared the threshold (or none matched at all).
    Unmatched { best: Option<ScoredCandidate> },
}

fn matched_album(scored: &ScoredCandidate) -> MatchedAlbum {
    MatchedAlbum {
        album_id: scored.candidate.album_id,
        title: scored.candidate.title.clone(),
        series: scored.candidate.series.clone(),
        volume: scored.candidate.volume,
        publisher: scored.candidate.publisher.clone(),
        year: scored.candidate.year,
    }
}

/// Content fingerprint used for change detection on re-runs. Archives run to
/// hundreds of megabytes, so the file is hashed in chunks rather than read
/// whole.
async fn fingerprint(path: &Path) -> std::io::Result<(String, u64)> {
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        size += read as u64;
    }
    Ok((hasher.finalize().to_hex().to_string(), size))
}

/// Run the full matching pipeline for one archive.
pub async fn process_file(ctx: Arc<WorkerContext>, path: PathBuf) -> WorkerReport {
    let started = Instant::now();
    let outcome = |status, album, confidence, error, attempts| FileOutcome {
        path: path.clone(),
        hash: String::new(),
        size: None,
        status,
        album,
        confidence,
        error,
        attempts,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    let (hash, size) = match fingerprint(&path).await {
        Ok(pair) => pair,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "cannot read archive");
            return WorkerReport {
                outcome: outcome(FileStatus::Failed, None, None, Some(format!("unreadable file: {err}")), 1),
                metadata: None,
            };
        },
    };

    let hints = FilenameHints::parse(&path);
    let term = hints.search_term(&path).to_string();

    // One retried unit per file: transient failures rewind the whole
    // pipeline, not just the step that tripped.
    let (resolved, attempts) = ctx
        .retry
        .run(|| {
            let ctx = ctx.clone();
            let path = path.clone();
            let term = term.clone();
            let hints = hints.clone();
            async move {
                let catalog = ctx.catalog.clone();
                let index = ctx.index.get_or_build(|| { let c = catalog.clone(); async move { c.build_index().await } }).await?;
                let cover = ctx.archive.extract_cover(&path).await?;
                let candidates = ctx.catalog.search(&index, &term).await?;
                let mut compared = Vec::with_capacity(candidates.len());
                for candidate in candidates {
                    let similarity = match &candidate.cover_url {
                        Some(url) => ctx.catalog.compare_cover(&cover, url).await?,
                        None => 0.0,
                    };
                    compared.push((candidate, similarity));
                }
                let mut ranked = rank(compared, &hints, &ctx.scorer);
                let acceptable = ranked.first().is_some_and(|best| ctx.scorer.is_acceptable(best.score));
                if acceptable {
                    let best = ranked.swap_remove(0);
                    let record = ctx.catalog.fetch_metadata(best.candidate.album_id).await?;
                    ctx.archive.embed_metadata(&path, &record).await?;
                    Ok::<_, tome_catalog::error::Error>(Resolution::Matched { scored: best, record })
                } else {
                    Ok(Resolution::Unmatched { best: ranked.into_iter().next() })
                }
            }
        })
        .await;

    let (mut report_outcome, metadata) = match resolved {
        Ok(Resolution::Matched { scored, record }) => {
            tracing::info!(path = %path.display(), album = scored.candidate.album_id, score = scored.score, "matched");
            (
                outcome(FileStatus::Success, Some(matched_album(&scored)), Some(scored.score), None, attempts),
                Some(record),
            )
        },
        Ok(Resolution::Unmatched { best }) => {
            let status = match ctx.mode {
                // Interactive defers just like batch; the review UI lives
                // outside this codebase.
                RunMode::Batch | RunMode::Interactive => FileStatus::Manual,
                RunMode::Strict => FileStatus::Skipped,
            };
            tracing::info!(path = %path.display(), %status, "no acceptable match");
            let album = best.as_ref().map(matched_album);
            let confidence = best.map(|b| b.score);
            (outcome(status, album, confidence, None, attempts), None)
        },
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %*err, attempts, "file failed");
            (outcome(FileStatus::Failed, None, None, Some((*err).to_string()), attempts), None)
        },
    };
    report_outcome.hash = hash;
    report_outcome.size = Some(size);
    WorkerReport { outcome: report_outcome, metadata }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tome_catalog::mock::{MockArchive, MockCatalog, candidate};
    use tome_catalog::{Candidate, DEFAULT_INDEX_TTL};

    fn archive_file(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"fake cbz bytes").unwrap();
        path
    }

    fn context(catalog: MockCatalog, archive: MockArchive, cache_dir: &TempDir) -> Arc<WorkerContext> {
        Arc::new(WorkerContext {
            catalog: Arc::new(catalog),
            archive: Arc::new(archive),
            index: Arc::new(IndexCache::new(cache_dir.path().join("index.json"), DEFAULT_INDEX_TTL)),
            scorer: ScorerConfig::default(),
            mode: RunMode::Batch,
            retry: RetryPolicy::default(),
        })
    }

    fn strong_candidate(album_id: u64, title: &str) -> Candidate {
        Candidate { volume: Some(3), year: Some(1982), ..candidate(album_id, title) }
    }

    #[tokio::test]
    async fn test_fingerprint_hashes_across_chunk_boundaries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.cbz");
        // Larger than the read buffer so several chunks feed the hasher.
        let bytes: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &bytes).unwrap();

        let (hash, size) = fingerprint(&path).await.unwrap();
        assert_eq!(size, bytes.len() as u64);
        assert_eq!(hash, blake3::hash(&bytes).to_hex().to_string());
    }

    #[tokio::test]
    async fn test_accepts_confident_match() {
        let dir = TempDir::new().unwrap();
        let path = archive_file(&dir, "Thorgal - Tome 03 (1982).cbz");
        let catalog = MockCatalog::new().with_album(strong_candidate(42, "Thorgal"), 95.0);
        let archive = MockArchive::new().with_cover(&path, b"cover".to_vec());
        let ctx = context(catalog, archive, &dir);

        let report = process_file(ctx.clone(), path.clone()).await;
        assert_eq!(report.outcome.status, FileStatus::Success);
        assert_eq!(report.outcome.album.as_ref().unwrap().album_id, 42);
        assert_eq!(report.outcome.attempts, 1);
        assert!(!report.outcome.hash.is_empty());
        assert_eq!(report.metadata.as_ref().unwrap().album_id, 42);
    }

    #[tokio::test]
    async fn test_low_confidence_defers_in_batch_mode() {
        let dir = TempDir::new().unwrap();
        let path = archive_file(&dir, "Thorgal - Tome 03.cbz");
        // Cover similarity below the floor scores zero, dragging the total
        // under the acceptance threshold.
        let catalog = MockCatalog::new().with_album(strong_candidate(42, "Thorgal"), 10.0);
        let archive = MockArchive::new().with_cover(&path, b"cover".to_vec());
        let ctx = context(catalog, archive, &dir);

        let report = process_file(ctx, path).await;
        assert_eq!(report.outcome.status, FileStatus::Manual);
        assert!(report.outcome.confidence.unwrap() < 0.70);
        // The best candidate is preserved for the review queue.
        assert_eq!(report.outcome.album.as_ref().unwrap().album_id, 42);
        assert_eq!(report.metadata, None);
    }

    #[tokio::test]
    async fn test_corrupt_archive_fails_without_retry() {
        let dir = TempDir::new().unwrap();
        let path = archive_file(&dir, "broken.cbz");
        let catalog = MockCatalog::new();
        let archive = MockArchive::new().with_corrupt(&path);
        let ctx = context(catalog, archive, &dir);

        let report = process_file(ctx, path).await;
        assert_eq!(report.outcome.status, FileStatus::Failed);
        assert_eq!(report.outcome.attempts, 1, "corruption must not be retried");
        assert!(report.outcome.error.as_ref().unwrap().contains("corrupt"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_search_failure_is_retried() {
        let dir = TempDir::new().unwrap();
        let path = archive_file(&dir, "Thorgal - Tome 03 (1982).cbz");
        let catalog = MockCatalog::new().with_album(strong_candidate(42, "Thorgal"), 95.0).fail_searches(2);
        let archive = MockArchive::new().with_cover(&path, b"cover".to_vec());
        let ctx = context(catalog, archive, &dir);

        let report = process_file(ctx, path).await;
        assert_eq!(report.outcome.status, FileStatus::Success);
        assert_eq!(report.outcome.attempts, 3);
    }
}
