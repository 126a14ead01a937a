//! Collaborator traits for the external catalog and for archive I/O.
//!
//! The batch core never scrapes HTML, decodes images or unpacks zip/rar
//! itself; it talks to implementations of these two traits. The only
//! implementation living in this repository is the in-memory mock pair
//! (feature `mock`), used by tests and demos. Real scraper and archive
//! crates plug in from outside.

use crate::error::Result;
use crate::models::{Candidate, CatalogIndex, CoverImage, MetadataRecord};
use async_trait::async_trait;
use std::path::Path;

/// Remote catalog operations.
///
/// `search` operates over a [`CatalogIndex`] passed in by the caller rather
/// than one the backend fetches itself: index construction is expensive and
/// shared across workers, so its lifetime is managed by
/// [`IndexCache`](crate::IndexCache), not by each backend call.
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Build a fresh catalog index. Expensive; call through
    /// [`IndexCache::get_or_build`](crate::IndexCache::get_or_build).
    async fn build_index(&self) -> Result<CatalogIndex>;

    /// Fuzzy-match a title hint against the index. May be empty.
    async fn search(&self, index: &CatalogIndex, title_hint: &str) -> Result<Vec<Candidate>>;

    /// Fetch the full record for a candidate album.
    async fn fetch_metadata(&self, album_id: u64) -> Result<MetadataRecord>;

    /// Visual similarity between a local cover and a remote one, in
    /// `[0, 100]`.
    async fn compare_cover(&self, local: &CoverImage, cover_url: &str) -> Result<f64>;
}

/// Archive container operations (cbz/cbr).
#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    /// Pull the first page image out of an archive.
    ///
    /// Returns [`ErrorKind::CorruptArchive`](crate::ErrorKind::CorruptArchive)
    /// when the file is not readable as an archive at all.
    async fn extract_cover(&self, path: &Path) -> Result<CoverImage>;

    /// Write the metadata record into the archive (ComicInfo.xml style).
    async fn embed_metadata(&self, path: &Path, record: &MetadataRecord) -> Result<()>;
}
