//! Disambiguation for ambiguous catalog matches.
//!
//! Two pieces, both pure: [`FilenameHints`] recovers title/volume/year hints
//! from an archive filename, and [`scorer`](crate::scorer) turns a set of
//! candidates plus cover similarities into a deterministic ranking with a
//! confidence score in `[0, 1]` per candidate.

mod hints;
mod scorer;

pub use crate::hints::FilenameHints;
pub use crate::scorer::{ScoredCandidate, ScorerConfig, rank, score};
