//! Collaborator seams for the external BD catalog and for archive I/O.
//!
//! The batch orchestration core (tome-batch) depends on abstract contracts,
//! not on any concrete scraper: [`CatalogBackend`] covers index building,
//! fuzzy search, record fetching and cover comparison; [`ArchiveBackend`]
//! covers cover extraction and metadata embedding. This crate also owns
//! [`IndexCache`], the time-bounded single-flight holder for the expensive
//! shared catalog index.
//!
//! Real scraper/archive implementations live outside this repository; the
//! `mock` feature provides in-memory backends for tests and demos.

mod backend;
pub mod error;
mod index_cache;
#[cfg(feature = "mock")]
pub mod mock;
mod models;

pub use crate::backend::{ArchiveBackend, CatalogBackend};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::index_cache::{DEFAULT_INDEX_TTL, IndexCache};
pub use crate::models::{Candidate, CatalogIndex, CoverImage, IndexEntry, MetadataRecord};
