//! Candidate scoring and the resolve/ambiguous/no-match decision.
//!
//! A candidate's score is `0.8 * title + 0.2 * year`:
//!
//! | Component | Value |
//! |-----------|-------|
//! | title | 1.0 on an exact [`match_form`] match, else Jaro-Winkler similarity |
//! | year (hint within ±1) | 1.0 |
//! | year (hint further off, or candidate undated) | 0.0 |
//! | year (no hint) | 0.5 |
//!
//! A candidate whose media type contradicts the entry's type hint is dropped
//! before scoring.

use tracing::debug;

use crate::config::ConfigError;
use crate::model::{CandidateMatch, RawEntry, ResolutionStatus, UnresolvedReason};
use crate::provider::ProviderCandidate;
use crate::title::match_form;

use super::Verdict;

const TITLE_WEIGHT: f64 = 0.8;
const YEAR_WEIGHT: f64 = 0.2;
const YEAR_TOLERANCE: i32 = 1;
const YEAR_UNKNOWN: f64 = 0.5;

/// Tunable decision thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchThresholds {
    /// Candidates scoring below this are discarded.
    pub min_score: f64,
    /// The best candidate must reach this to be auto-resolved.
    pub high_confidence: f64,
    /// A runner-up within this distance of the best makes the entry ambiguous.
    pub ambiguity_delta: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            high_confidence: 0.75,
            ambiguity_delta: 0.05,
        }
    }
}

impl MatchThresholds {
    /// Checks ranges: every value in `0.0..=1.0` and `min_score <= high_confidence`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("min_score", self.min_score),
            ("high_confidence", self.high_confidence),
            ("ambiguity_delta", self.ambiguity_delta),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, value, "a number between 0 and 1"));
            }
        }
        if self.min_score > self.high_confidence {
            return Err(ConfigError::invalid(
                "min_score",
                self.min_score,
                "a value not above high_confidence",
            ));
        }
        Ok(())
    }
}

/// Scores one provider result against the entry it was searched for.
///
/// Returns `None` when the entry's type hint rules the candidate out.
#[must_use]
pub fn score_candidate(entry: &RawEntry, candidate: ProviderCandidate) -> Option<CandidateMatch> {
    if entry.type_hint.is_some_and(|hint| hint != candidate.media_type) {
        return None;
    }

    let wanted = match_form(&entry.title);
    let title = std::iter::once(candidate.title.as_str())
        .chain(candidate.original_title.as_deref())
        .map(|t| title_similarity(&wanted, t))
        .fold(0.0_f64, f64::max);
    let year = year_component(entry.year_hint, candidate.year);

    Some(CandidateMatch {
        tmdb_id: candidate.id,
        media_type: candidate.media_type,
        canonical_title: candidate.title,
        release_year: candidate.year,
        score: TITLE_WEIGHT * title + YEAR_WEIGHT * year,
    })
}

fn title_similarity(wanted: &str, candidate: &str) -> f64 {
    let candidate = match_form(candidate);
    if wanted.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    if wanted == candidate {
        1.0
    } else {
        strsim::jaro_winkler(wanted, &candidate)
    }
}

fn year_component(hint: Option<i32>, year: Option<i32>) -> f64 {
    match (hint, year) {
        (None, _) => YEAR_UNKNOWN,
        (Some(hint), Some(year)) if (hint - year).abs() <= YEAR_TOLERANCE => 1.0,
        (Some(_), _) => 0.0,
    }
}

/// Applies the decision policy to scored candidates.
///
/// - nothing at or above `min_score`: unresolved, no match
/// - best below `high_confidence`, or runner-up within `ambiguity_delta`: ambiguous
/// - otherwise: resolved to the best candidate
///
/// Surviving candidates are kept on the verdict, best first. Ties keep provider order.
#[must_use]
pub fn decide(scored: Vec<CandidateMatch>, thresholds: &MatchThresholds) -> Verdict {
    let mut survivors: Vec<CandidateMatch> = scored
        .into_iter()
        .filter(|c| c.score >= thresholds.min_score)
        .collect();
    survivors.sort_by(|a, b| b.score.total_cmp(&a.score));

    let Some(best) = survivors.first() else {
        debug!("no candidate above minimum score");
        return Verdict::new(ResolutionStatus::Unresolved(UnresolvedReason::NoMatch));
    };
    let confidence = best.score;
    let runner_up = survivors.get(1).map(|c| c.score);

    let too_weak = confidence < thresholds.high_confidence;
    let too_close = runner_up.is_some_and(|second| confidence - second <= thresholds.ambiguity_delta);

    if too_weak || too_close {
        debug!(confidence, ?runner_up, too_weak, too_close, "ambiguous");
        return Verdict {
            confidence,
            candidates: survivors,
            ..Verdict::new(ResolutionStatus::Ambiguous)
        };
    }

    let chosen = best.clone();
    debug!(tmdb_id = chosen.tmdb_id, confidence, "resolved");
    Verdict {
        chosen: Some(chosen),
        confidence,
        candidates: survivors,
        ..Verdict::new(ResolutionStatus::Resolved)
    }
}
