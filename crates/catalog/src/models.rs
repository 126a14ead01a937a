//! Plain data shapes exchanged with the catalog and archive collaborators.
//!
//! Everything here is `Serialize`/`Deserialize`: candidates and records cross
//! the worker boundary as messages, and the index is persisted to disk by the
//! [`IndexCache`](crate::IndexCache).

use serde::{Deserialize, Serialize};
use time::UtcDateTime;

/// One album proposed by the catalog as a possible match for a file.
///
/// The fields mirror what a catalog listing page exposes; anything the
/// catalog doesn't know is `None` rather than a sentinel value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Catalog-assigned album identifier.
    pub album_id: u64,
    pub title: String,
    pub series: Option<String>,
    pub volume: Option<u32>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub url: String,
    pub cover_url: Option<String>,
    /// When the catalog entry this candidate came from was cached.
    /// Used as the final tie-breaker when ranking (most recent first).
    pub cached_at: UtcDateTime,
}

/// The full metadata record for a chosen album.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub album_id: u64,
    pub title: String,
    pub series: Option<String>,
    pub volume: Option<u32>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub isbn: Option<String>,
    pub pages: Option<u32>,
    pub writers: Vec<String>,
    pub artists: Vec<String>,
    pub summary: Option<String>,
    pub url: String,
    pub cover_url: Option<String>,
}

/// One entry of the catalog index: enough to go from a fuzzy title to an
/// album page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub title: String,
    pub url: String,
}

/// The expensive shared resource: a flattened index of every album title the
/// catalog publishes. Built once per TTL window, read by every worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogIndex {
    pub entries: Vec<IndexEntry>,
    pub built_at: UtcDateTime,
}

impl CatalogIndex {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self { entries, built_at: UtcDateTime::now() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A cover image extracted from an archive. Opaque bytes; decoding and
/// similarity are the collaborator's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverImage {
    pub bytes: Vec<u8>,
}

impl CoverImage {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }
}
