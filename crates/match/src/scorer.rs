//! Multi-criteria disambiguation scoring.
//!
//! Each candidate gets a weighted sum of four independently normalised
//! sub-scores (cover similarity, volume, publisher, year), nudged by a fuzzy
//! title comparison when both sides have a usable title. Weights, the cover
//! floor, the year tolerance and the acceptance threshold are configuration,
//! not constants: the defaults below work well in practice but nobody has
//! derived them from first principles.

use crate::hints::FilenameHints;
use serde::{Deserialize, Serialize};
use tome_catalog::Candidate;

/// Tunable knobs for scoring and acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub cover_weight: f64,
    pub volume_weight: f64,
    pub publisher_weight: f64,
    pub year_weight: f64,
    /// Raw similarity (in percent) below this is treated as "different
    /// book" and contributes nothing.
    pub cover_floor: f64,
    /// Years further apart than this score zero.
    pub year_tolerance: i32,
    /// Top score at or above this is auto-acceptable.
    pub accept_threshold: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            cover_weight: 0.40,
            volume_weight: 0.30,
            publisher_weight: 0.15,
            year_weight: 0.15,
            cover_floor: 30.0,
            year_tolerance: 2,
            accept_threshold: 0.70,
        }
    }
}

impl ScorerConfig {
    /// Whether a top score clears the auto-accept bar.
    pub fn is_acceptable(&self, score: f64) -> bool {
        score >= self.accept_threshold
    }
}

/// A candidate together with the evidence it was ranked on.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    /// Raw cover similarity in `[0, 100]`, before the floor was applied.
    pub cover_similarity: f64,
    /// Final weighted score in `[0, 1]`.
    pub score: f64,
}

/// Similarity below the floor clamps to zero; above it, linear rescale from
/// `[floor, 100]` to `[0, 1]`.
fn cover_score(similarity: f64, config: &ScorerConfig) -> f64 {
    if similarity < config.cover_floor {
        return 0.0;
    }
    let span = 100.0 - config.cover_floor;
    // A floor at (or past) 100 degenerates the rescale window; anything that
    // cleared the floor is a full match rather than 0/0.
    if span <= 0.0 {
        return 1.0;
    }
    ((similarity - config.cover_floor) / span).clamp(0.0, 1.0)
}

/// Exact match or nothing; an absent filename volume is neutral, not a
/// penalty.
fn volume_score(hint: Option<u32>, candidate: Option<u32>) -> f64 {
    match (hint, candidate) {
        (None, _) => 0.5,
        (Some(h), Some(c)) if h == c => 1.0,
        _ => 0.0,
    }
}

fn publisher_score(hint: Option<&str>, candidate: Option<&str>) -> f64 {
    match (hint, candidate) {
        (None, _) | (_, None) => 0.5,
        (Some(h), Some(c)) if h.eq_ignore_ascii_case(c) => 1.0,
        _ => 0.0,
    }
}

/// Full marks at the exact year, degrading inside the tolerance window
/// (Δ = tolerance still scores 0.7), zero beyond it.
fn year_score(hint: Option<i32>, candidate: Option<i32>, config: &ScorerConfig) -> f64 {
    let (Some(h), Some(c)) = (hint, candidate) else {
        return 0.5;
    };
    let delta = (h - c).abs();
    // The exact year is full marks even at tolerance 0, where the falloff
    // division would be 0/0.
    if delta == 0 {
        1.0
    } else if delta <= config.year_tolerance {
        1.0 - (f64::from(delta) / f64::from(config.year_tolerance) * 0.3)
    } else {
        0.0
    }
}

fn full_title(candidate: &Candidate) -> String {
    match &candidate.series {
        Some(series) => format!("{series} {}", candidate.title),
        None => candidate.title.clone(),
    }
}

/// Score one candidate against the filename hints. Result is in `[0, 1]` by
/// construction of the weights; the title adjustment is clamped back in.
pub fn score(candidate: &Candidate, hints: &FilenameHints, cover_similarity: f64, config: &ScorerConfig) -> f64 {
    let base = cover_score(cover_similarity, config) * config.cover_weight
        + volume_score(hints.volume, candidate.volume) * config.volume_weight
        + publisher_score(hints.publisher.as_deref(), candidate.publisher.as_deref()) * config.publisher_weight
        + year_score(hints.year, candidate.year, config) * config.year_weight;

    // Title similarity is a tiebreaker on top of the base criteria, applied
    // only when both sides actually have a title to compare.
    let adjusted = match &hints.title {
        Some(hint_title) if !hint_title.is_empty() => {
            let candidate_title = full_title(candidate);
            let similarity = strsim::jaro_winkler(&hint_title.to_lowercase(), &candidate_title.to_lowercase());
            base + 0.2 * (similarity - 0.5)
        },
        _ => base,
    };
    adjusted.clamp(0.0, 1.0)
}

/// Score and rank candidates, best first.
///
/// Ordering is deterministic: score descending, ties broken by raw cover
/// similarity, then by candidate cache recency.
pub fn rank(
    candidates: Vec<(Candidate, f64)>,
    hints: &FilenameHints,
    config: &ScorerConfig,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|(candidate, cover_similarity)| {
            let score = score(&candidate, hints, cover_similarity, config);
            ScoredCandidate { candidate, cover_similarity, score }
        })
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.cover_similarity.total_cmp(&a.cover_similarity))
            .then_with(|| b.candidate.cached_at.cmp(&a.candidate.cached_at))
    });
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::UtcDateTime;

    fn candidate(volume: Option<u32>, publisher: Option<&str>, year: Option<i32>) -> Candidate {
        Candidate {
            album_id: 1,
            title: "Les Trois Vieillards du pays d'Aran".to_string(),
            series: Some("Thorgal".to_string()),
            volume,
            publisher: publisher.map(str::to_string),
            year,
            url: "https://catalog.example/album/1".to_string(),
            cover_url: None,
            cached_at: UtcDateTime::now(),
        }
    }

    fn no_hints() -> FilenameHints {
        FilenameHints::default()
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(20.0, 0.0)] // below the floor: clamped, regardless of how close
    #[case(30.0, 0.0)] // exactly the floor rescales to zero
    #[case(65.0, 0.5)]
    #[case(100.0, 1.0)]
    fn test_cover_score(#[case] similarity: f64, #[case] expected: f64) {
        let config = ScorerConfig::default();
        assert!((cover_score(similarity, &config) - expected).abs() < 1e-9);
    }

    #[rstest]
    #[case(None, Some(3), 0.5)]
    #[case(Some(3), Some(3), 1.0)]
    #[case(Some(3), Some(4), 0.0)]
    #[case(Some(3), None, 0.0)]
    fn test_volume_score(#[case] hint: Option<u32>, #[case] cand: Option<u32>, #[case] expected: f64) {
        assert_eq!(volume_score(hint, cand), expected);
    }

    #[rstest]
    #[case(Some("Dargaud"), Some("dargaud"), 1.0)]
    #[case(Some("Dargaud"), Some("Dupuis"), 0.0)]
    #[case(None, Some("Dupuis"), 0.5)]
    #[case(Some("Dargaud"), None, 0.5)]
    fn test_publisher_score(#[case] hint: Option<&str>, #[case] cand: Option<&str>, #[case] expected: f64) {
        assert_eq!(publisher_score(hint, cand), expected);
    }

    #[test]
    fn test_cover_floor_at_100_keeps_scores_finite() {
        let config = ScorerConfig { cover_floor: 100.0, ..ScorerConfig::default() };
        assert_eq!(cover_score(100.0, &config), 1.0);
        assert_eq!(cover_score(99.9, &config), 0.0);

        let cand = candidate(Some(3), Some("Le Lombard"), Some(1982));
        let s = score(&cand, &no_hints(), 100.0, &config);
        assert!(s.is_finite(), "perfect cover at floor 100 scored {s}");
    }

    #[test]
    fn test_zero_year_tolerance_exact_match_is_full_marks() {
        let config = ScorerConfig { year_tolerance: 0, ..ScorerConfig::default() };
        assert_eq!(year_score(Some(1982), Some(1982), &config), 1.0);
        assert_eq!(year_score(Some(1982), Some(1983), &config), 0.0);
    }

    #[rstest]
    #[case(Some(1982), Some(1982), 1.0)]
    #[case(Some(1982), Some(1983), 0.85)]
    #[case(Some(1982), Some(1984), 0.7)]
    #[case(Some(1982), Some(1986), 0.0)]
    #[case(None, Some(1982), 0.5)]
    fn test_year_score(#[case] hint: Option<i32>, #[case] cand: Option<i32>, #[case] expected: f64) {
        let config = ScorerConfig::default();
        assert!((year_score(hint, cand, &config) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_monotone_in_cover_similarity() {
        let config = ScorerConfig::default();
        let cand = candidate(Some(3), Some("Le Lombard"), Some(1982));
        let hints = FilenameHints {
            title: Some("Thorgal".to_string()),
            volume: Some(3),
            year: Some(1982),
            publisher: None,
        };
        let mut previous = 0.0;
        for similarity in (0..=100).map(f64::from) {
            let s = score(&cand, &hints, similarity, &config);
            assert!(s >= previous, "score dropped from {previous} to {s} at similarity {similarity}");
            previous = s;
        }
    }

    #[test]
    fn test_sub_floor_cover_contributes_nothing() {
        let config = ScorerConfig::default();
        let cand = candidate(Some(3), Some("Le Lombard"), Some(1982));
        let at_zero = score(&cand, &no_hints(), 0.0, &config);
        let below_floor = score(&cand, &no_hints(), 20.0, &config);
        assert_eq!(at_zero, below_floor);
    }

    #[test]
    fn test_everything_unknown_scores_half_of_non_cover_weight() {
        let config = ScorerConfig::default();
        let cand = Candidate {
            volume: None,
            publisher: None,
            year: None,
            ..candidate(None, None, None)
        };
        // No hints, no cover: each non-cover criterion is neutral (0.5).
        let s = score(&cand, &no_hints(), 0.0, &config);
        let expected = 0.5 * (config.volume_weight + config.publisher_weight + config.year_weight);
        assert!((s - expected).abs() < 1e-9);
    }

    #[test]
    fn test_perfect_match_clears_threshold() {
        let config = ScorerConfig::default();
        let cand = candidate(Some(3), Some("Le Lombard"), Some(1982));
        let hints = FilenameHints {
            title: Some("Thorgal Les Trois Vieillards du pays d'Aran".to_string()),
            volume: Some(3),
            year: Some(1982),
            publisher: Some("Le Lombard".to_string()),
        };
        let s = score(&cand, &hints, 95.0, &config);
        assert!(config.is_acceptable(s), "expected acceptance, got {s}");
    }

    #[test]
    fn test_rank_breaks_ties_on_cover_then_recency() {
        let config = ScorerConfig::default();
        let older = Candidate {
            cached_at: UtcDateTime::now() - time::Duration::hours(2),
            ..candidate(None, None, None)
        };
        let newer = candidate(None, None, None);

        // Identical inputs except cover similarity.
        let ranked = rank(vec![(older.clone(), 40.0), (newer.clone(), 80.0)], &no_hints(), &config);
        assert_eq!(ranked[0].cover_similarity, 80.0);

        // Identical inputs entirely: newest cache entry wins.
        let ranked = rank(vec![(older.clone(), 40.0), (newer.clone(), 40.0)], &no_hints(), &config);
        assert_eq!(ranked[0].candidate.cached_at, newer.cached_at);
    }
}
