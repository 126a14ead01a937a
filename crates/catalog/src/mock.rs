//! In-memory catalog and archive backends for testing.
//!
//! Everything sits behind async locks so the trait methods operate on
//! `&self`, and failure injection is scripted up front. The panics in the
//! builder methods are deliberate: these types only appear in tests and
//! demos, where a wrong setup should not pass.

use crate::backend::{ArchiveBackend, CatalogBackend};
use crate::error::{ErrorKind, Result};
use crate::models::{Candidate, CatalogIndex, CoverImage, IndexEntry, MetadataRecord};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// Scripted catalog backend.
///
/// Candidates are matched by case-insensitive substring against the title
/// hint. Cover similarities are keyed by cover URL. `fail_searches(n)` makes
/// the next `n` search calls fail with a (retryable) network error before
/// recovering, which is exactly the shape the retry tests need.
pub struct MockCatalog {
    candidates: Vec<Candidate>,
    records: HashMap<u64, MetadataRecord>,
    similarities: HashMap<String, f64>,
    failing_searches: AtomicU32,
    search_calls: AtomicU32,
    index_builds: AtomicU32,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            candidates: Vec::new(),
            records: HashMap::new(),
            similarities: HashMap::new(),
            failing_searches: AtomicU32::new(0),
            search_calls: AtomicU32::new(0),
            index_builds: AtomicU32::new(0),
        }
    }

    /// Register an album: one candidate, its full record, and the similarity
    /// any cover comparison against it should report.
    pub fn with_album(mut self, candidate: Candidate, similarity: f64) -> Self {
        let cover_url = candidate
            .cover_url
            .clone()
            .unwrap_or_else(|| panic!("MockCatalog::with_album: candidate {} has no cover url", candidate.album_id));
        self.similarities.insert(cover_url, similarity);
        self.records.insert(candidate.album_id, record_from(&candidate));
        self.candidates.push(candidate);
        self
    }

    /// Make the next `n` search calls fail with a network error.
    pub fn fail_searches(self, n: u32) -> Self {
        self.failing_searches.store(n, Ordering::SeqCst);
        self
    }

    /// Total number of `search` invocations, including failed ones.
    pub fn search_calls(&self) -> u32 {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// Total number of `build_index` invocations.
    pub fn index_builds(&self) -> u32 {
        self.index_builds.load(Ordering::SeqCst)
    }
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn record_from(candidate: &Candidate) -> MetadataRecord {
    MetadataRecord {
        album_id: candidate.album_id,
        title: candidate.title.clone(),
        series: candidate.series.clone(),
        volume: candidate.volume,
        publisher: candidate.publisher.clone(),
        year: candidate.year,
        isbn: None,
        pages: None,
        writers: Vec::new(),
        artists: Vec::new(),
        summary: None,
        url: candidate.url.clone(),
        cover_url: candidate.cover_url.clone(),
    }
}

/// Convenience constructor for test candidates.
pub fn candidate(album_id: u64, title: &str) -> Candidate {
    Candidate {
        album_id,
        title: title.to_string(),
        series: None,
        volume: None,
        publisher: None,
        year: None,
        url: format!("https://catalog.example/album/{album_id}"),
        cover_url: Some(format!("https://catalog.example/cover/{album_id}.jpg")),
        cached_at: UtcDateTime::now(),
    }
}

#[async_trait]
impl CatalogBackend for MockCatalog {
    fn name(&self) -> &str {
        "mock"
    }

    async fn build_index(&self) -> Result<CatalogIndex> {
        self.index_builds.fetch_add(1, Ordering::SeqCst);
        Ok(CatalogIndex::new(
            self.candidates
                .iter()
                .map(|c| IndexEntry { title: c.title.clone(), url: c.url.clone() })
                .collect(),
        ))
    }

    async fn search(&self, _index: &CatalogIndex, title_hint: &str) -> Result<Vec<Candidate>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_searches.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_searches.store(remaining - 1, Ordering::SeqCst);
            exn::bail!(ErrorKind::Network("mock: scripted search failure".to_string()));
        }
        let needle = title_hint.to_lowercase();
        Ok(self
            .candidates
            .iter()
            .filter(|c| c.title.to_lowercase().contains(&needle) || needle.contains(&c.title.to_lowercase()))
            .cloned()
            .collect())
    }

    async fn fetch_metadata(&self, album_id: u64) -> Result<MetadataRecord> {
        self.records
            .get(&album_id)
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(album_id)))
    }

    async fn compare_cover(&self, _local: &CoverImage, cover_url: &str) -> Result<f64> {
        Ok(self.similarities.get(cover_url).copied().unwrap_or(0.0))
    }
}

/// In-memory archive backend: scripted covers, scripted corruption, and a
/// log of every embed so tests can assert what was written where.
pub struct MockArchive {
    covers: HashMap<PathBuf, CoverImage>,
    corrupt: HashSet<PathBuf>,
    embedded: RwLock<Vec<(PathBuf, MetadataRecord)>>,
}

impl MockArchive {
    pub fn new() -> Self {
        Self {
            covers: HashMap::new(),
            corrupt: HashSet::new(),
            embedded: RwLock::new(Vec::new()),
        }
    }

    /// Give `path` an extractable cover.
    pub fn with_cover(mut self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        self.covers.insert(path.into(), CoverImage::new(bytes));
        self
    }

    /// Mark `path` as unreadable; cover extraction will report it corrupt.
    pub fn with_corrupt(mut self, path: impl Into<PathBuf>) -> Self {
        self.corrupt.insert(path.into());
        self
    }

    /// Every `(path, record)` pair embedded so far, in call order.
    pub async fn embedded(&self) -> Vec<(PathBuf, MetadataRecord)> {
        self.embedded.read().await.clone()
    }
}

impl Default for MockArchive {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArchiveBackend for MockArchive {
    async fn extract_cover(&self, path: &Path) -> Result<CoverImage> {
        if self.corrupt.contains(path) {
            exn::bail!(ErrorKind::CorruptArchive(path.to_path_buf()));
        }
        self.covers
            .get(path)
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::Io(format!("mock: no cover scripted for {}", path.display()))))
    }

    async fn embed_metadata(&self, path: &Path, record: &MetadataRecord) -> Result<()> {
        if self.corrupt.contains(path) {
            exn::bail!(ErrorKind::CorruptArchive(path.to_path_buf()));
        }
        self.embedded.write().await.push((path.to_path_buf(), record.clone()));
        Ok(())
    }
}
