//! Time-bounded, single-flight cache for the catalog index.
//!
//! The index is rebuilt at most once per TTL window no matter how many
//! workers ask for it. The policy when an entry goes stale:
//!
//! - the first caller to notice staleness takes the rebuild lock and blocks
//!   on the builder;
//! - concurrent callers keep receiving the last good (possibly stale) index
//!   until the rebuild lands;
//! - callers that find *no* index at all wait for the in-flight build;
//! - a failed rebuild falls back to the previous index when one exists,
//!   otherwise the error propagates.
//!
//! The entry is persisted to a JSON file next to the cache directory, so a
//! process restart inside the TTL window skips the rebuild entirely.

use crate::error::{ErrorKind, Result};
use crate::models::CatalogIndex;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use time::{Duration, UtcDateTime};
use tokio::sync::{Mutex, RwLock};

/// Default index lifetime: re-fetch the catalog sitemaps after 24 hours.
pub const DEFAULT_INDEX_TTL: Duration = Duration::hours(24);

#[derive(Clone)]
struct Entry {
    cached_at: UtcDateTime,
    valid_until: UtcDateTime,
    index: Arc<CatalogIndex>,
}

impl Entry {
    fn is_fresh(&self, now: UtcDateTime) -> bool {
        now <= self.valid_until
    }
}

/// On-disk representation of a cache entry.
#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    cached_at: UtcDateTime,
    valid_until: UtcDateTime,
    index: CatalogIndex,
}

/// Shared, TTL-bounded holder for the catalog index.
///
/// Cheap to clone via [`Arc`] wrapping by the caller; internally all state
/// sits behind async locks so `get_or_build` takes `&self`.
pub struct IndexCache {
    store: PathBuf,
    ttl: Duration,
    state: RwLock<Option<Entry>>,
    rebuild: Mutex<()>,
}

impl std::fmt::Debug for IndexCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCache")
            .field("store", &self.store)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl IndexCache {
    /// Create an empty cache that persists to `store`.
    pub fn new(store: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            store: store.into(),
            ttl,
            state: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    /// Create a cache seeded from the persisted entry at `store`, if that
    /// entry exists, parses, and is still inside its TTL window. Anything
    /// else silently starts empty; the cache file is disposable.
    pub async fn load(store: impl Into<PathBuf>, ttl: Duration) -> Self {
        let cache = Self::new(store, ttl);
        match tokio::fs::read(&cache.store).await {
            Ok(bytes) => match serde_json::from_slice::<PersistedEntry>(&bytes) {
                Ok(persisted) if UtcDateTime::now() <= persisted.valid_until => {
                    tracing::debug!(
                        path = %cache.store.display(),
                        entries = persisted.index.len(),
                        "loaded catalog index from disk"
                    );
                    let entry = Entry {
                        cached_at: persisted.cached_at,
                        valid_until: persisted.valid_until,
                        index: Arc::new(persisted.index),
                    };
                    *cache.state.write().await = Some(entry);
                },
                Ok(_) => tracing::debug!(path = %cache.store.display(), "persisted catalog index is stale"),
                Err(err) => {
                    tracing::warn!(path = %cache.store.display(), %err, "discarding unreadable index cache file");
                },
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
            Err(err) => tracing::warn!(path = %cache.store.display(), %err, "could not read index cache file"),
        }
        cache
    }

    /// When the entry currently held was cached, if any.
    pub async fn cached_at(&self) -> Option<UtcDateTime> {
        self.state.read().await.as_ref().map(|e| e.cached_at)
    }

    /// Return the cached index, rebuilding it through `build` when missing
    /// or expired. See the module docs for the exact staleness policy.
    pub async fn get_or_build<F, Fut>(&self, build: F) -> Result<Arc<CatalogIndex>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<CatalogIndex>>,
    {
        if let Some(index) = self.fresh().await {
            return Ok(index);
        }
        let _guard = match self.rebuild.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                // A rebuild is in flight. Stale-but-usable beats blocking,
                // but with no index at all there is nothing to hand out.
                if let Some(stale) = self.any().await {
                    return Ok(stale);
                }
                self.rebuild.lock().await
            },
        };
        // Whoever held the lock before us may have already rebuilt.
        if let Some(index) = self.fresh().await {
            return Ok(index);
        }
        match build().await {
            Ok(index) => {
                let now = UtcDateTime::now();
                let entry = Entry {
                    cached_at: now,
                    valid_until: now + self.ttl,
                    index: Arc::new(index),
                };
                self.persist(&entry).await;
                let index = Arc::clone(&entry.index);
                *self.state.write().await = Some(entry);
                tracing::info!(entries = index.len(), "catalog index rebuilt");
                Ok(index)
            },
            Err(err) => match self.any().await {
                Some(stale) => {
                    tracing::warn!(error = %*err, "index rebuild failed; serving previous index");
                    Ok(stale)
                },
                None => Err(err),
            },
        }
    }

    async fn fresh(&self) -> Option<Arc<CatalogIndex>> {
        let state = self.state.read().await;
        match state.as_ref() {
            Some(entry) if entry.is_fresh(UtcDateTime::now()) => Some(Arc::clone(&entry.index)),
            _ => None,
        }
    }

    async fn any(&self) -> Option<Arc<CatalogIndex>> {
        self.state.read().await.as_ref().map(|e| Arc::clone(&e.index))
    }

    /// Best-effort write-through; a failed persist only costs the next
    /// process start a rebuild.
    async fn persist(&self, entry: &Entry) {
        let result: Result<()> = async {
            if let Some(parent) = self.store.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .or_raise(|| ErrorKind::Io(format!("creating {}", parent.display())))?;
            }
            let persisted = PersistedEntry {
                cached_at: entry.cached_at,
                valid_until: entry.valid_until,
                index: (*entry.index).clone(),
            };
            let json = serde_json::to_vec(&persisted)
                .or_raise(|| ErrorKind::Io("encoding index cache".to_string()))?;
            tokio::fs::write(&self.store, json)
                .await
                .or_raise(|| ErrorKind::Io(format!("writing {}", self.store.display())))?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            tracing::warn!(path = %self.store.display(), error = %*err, "could not persist catalog index");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexEntry;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn index_of(titles: &[&str]) -> CatalogIndex {
        CatalogIndex::new(
            titles
                .iter()
                .map(|t| IndexEntry {
                    title: (*t).to_string(),
                    url: format!("https://catalog.example/{t}"),
                })
                .collect(),
        )
    }

    fn scratch_store(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("index_cache.json")
    }

    #[tokio::test]
    async fn test_fresh_entry_never_invokes_builder() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(scratch_store(&dir), Duration::hours(24));
        let builds = AtomicU32::new(0);

        for _ in 0..3 {
            let index = cache
                .get_or_build(|| async {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(index_of(&["Astérix le Gaulois"]))
                })
                .await
                .unwrap();
            assert_eq!(index.len(), 1);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_rebuilds_once() {
        let dir = tempfile::tempdir().unwrap();
        // Zero-width window: every entry is born expired.
        let cache = IndexCache::new(scratch_store(&dir), Duration::seconds(-1));
        let builds = AtomicU32::new(0);

        for _ in 0..2 {
            cache
                .get_or_build(|| async {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(index_of(&["Tintin au Tibet"]))
                })
                .await
                .unwrap();
        }
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_flight_under_concurrent_callers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = std::sync::Arc::new(IndexCache::new(scratch_store(&dir), Duration::hours(24)));
        let builds = std::sync::Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = std::sync::Arc::clone(&cache);
            let builds = std::sync::Arc::clone(&builds);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build(|| {
                        let builds = std::sync::Arc::clone(&builds);
                        async move {
                            builds.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            Ok(index_of(&["Lucky Luke"]))
                        }
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            let index = handle.await.unwrap();
            assert_eq!(index.len(), 1);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_builder_failure_surfaces_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(scratch_store(&dir), Duration::seconds(-1));

        cache
            .get_or_build(|| async { Ok(index_of(&["Blake et Mortimer"])) })
            .await
            .unwrap();
        // Entry is already expired (negative TTL); the failed rebuild must
        // fall back to it instead of erroring.
        let index = cache
            .get_or_build(|| async { Err(exn::Exn::from(ErrorKind::Network("catalog down".to_string()))) })
            .await
            .unwrap();
        assert_eq!(index.entries[0].title, "Blake et Mortimer");
    }

    #[tokio::test]
    async fn test_builder_failure_with_no_previous_index_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(scratch_store(&dir), Duration::hours(24));

        let result = cache
            .get_or_build(|| async { Err(exn::Exn::from(ErrorKind::Network("catalog down".to_string()))) })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_restart_within_ttl_skips_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let store = scratch_store(&dir);

        let first = IndexCache::new(&store, Duration::hours(24));
        first
            .get_or_build(|| async { Ok(index_of(&["Thorgal", "Spirou"])) })
            .await
            .unwrap();

        // "Restart": a brand new cache seeded from the same file.
        let second = IndexCache::load(&store, Duration::hours(24)).await;
        let index = second
            .get_or_build(|| async { panic!("builder must not run inside the TTL window") })
            .await
            .unwrap();
        assert_eq!(index.len(), 2);
    }
}
