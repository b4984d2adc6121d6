//! Cross-source merge of resolution records.
//!
//! The [`Reconciler`] keys resolved records purely on [`CanonicalEntity`], so
//! `Heat (1995) [movie:949]`, `heat` and `Heat [1995]` collapse into one list entry
//! no matter how each source formatted the title. Everything that did not resolve
//! is routed into an [`ErrorReport`].
//!
//! # Merge policy
//!
//! When several records share an entity, the survivor is the one with:
//! 1. the highest confidence, then
//! 2. a year hint on its raw entry, then
//! 3. the earliest position in processing order (existing records first).
//!
//! The output keeps the position of the first record seen for each entity, so
//! reconciling the same input twice yields the same list.

mod report;

pub use report::{ErrorEntry, ErrorReport};

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::model::{CacheKey, CanonicalEntity, ErrorReason, ResolutionRecord};
use crate::title::split_trailing_year;

/// One line of the final list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListEntry {
    /// Identity on the provider.
    pub entity: CanonicalEntity,
    /// Display title: the raw title without any trailing year.
    pub title: String,
    /// Release year from the chosen candidate, else the entry's year hint.
    pub year: Option<i32>,
    /// Confidence of the surviving record.
    pub confidence: f64,
    /// Source of the surviving record.
    pub source_id: String,
}

/// Output of [`Reconciler::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reconciliation {
    /// Deduplicated resolved entries.
    pub final_list: Vec<ListEntry>,
    /// Entries needing manual attention.
    pub error_report: ErrorReport,
    /// Records merged away as duplicates (resolved or not).
    pub duplicates_dropped: usize,
}

/// Merges resolution records into a duplicate-free list.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

struct Survivor {
    record: ResolutionRecord,
    entity: CanonicalEntity,
}

impl Reconciler {
    /// Creates a reconciler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Merges `existing` (processed first) and `records` into a final list and
    /// an error report.
    ///
    /// Error entries are deduplicated by [`CacheKey`]; an error whose key also
    /// resolved somewhere in the input is dropped.
    #[instrument(skip_all, fields(records = records.len(), existing = existing.as_ref().map_or(0, Vec::len)))]
    pub fn reconcile(
        &self,
        records: Vec<ResolutionRecord>,
        existing: Option<Vec<ResolutionRecord>>,
    ) -> Reconciliation {
        let ordered: Vec<ResolutionRecord> = existing.into_iter().flatten().chain(records).collect();

        let resolved_keys: HashSet<CacheKey> = ordered
            .iter()
            .filter(|r| r.canonical().is_some())
            .map(|r| CacheKey::for_entry(&r.raw_entry))
            .collect();

        let mut survivors: Vec<Survivor> = Vec::new();
        let mut slots: HashMap<CanonicalEntity, usize> = HashMap::new();
        let mut error_keys: HashSet<CacheKey> = HashSet::new();
        let mut error_report = ErrorReport::new();
        let mut duplicates_dropped = 0;

        for record in ordered {
            if let Some(entity) = record.canonical() {
                match slots.get(&entity) {
                    Some(&idx) => {
                        duplicates_dropped += 1;
                        if outranks(&record, &survivors[idx].record) {
                            debug!(%entity, source = %record.raw_entry.source_id, "replacing duplicate");
                            survivors[idx].record = record;
                        } else {
                            debug!(%entity, source = %record.raw_entry.source_id, "dropping duplicate");
                        }
                    }
                    None => {
                        slots.insert(entity, survivors.len());
                        survivors.push(Survivor { record, entity });
                    }
                }
                continue;
            }

            let key = CacheKey::for_entry(&record.raw_entry);
            if resolved_keys.contains(&key) || !error_keys.insert(key) {
                duplicates_dropped += 1;
                continue;
            }
            let reason = record.error_reason().unwrap_or(ErrorReason::NoMatch);
            error_report.push(reason, ErrorEntry::from(record));
        }

        let final_list: Vec<ListEntry> = survivors.into_iter().map(list_entry).collect();

        info!(
            final_entries = final_list.len(),
            errors = error_report.len(),
            duplicates_dropped,
            "reconciliation complete"
        );

        Reconciliation {
            final_list,
            error_report,
            duplicates_dropped,
        }
    }
}

/// Whether `challenger` should replace `incumbent`. Equal records keep the incumbent.
fn outranks(challenger: &ResolutionRecord, incumbent: &ResolutionRecord) -> bool {
    match challenger.confidence.total_cmp(&incumbent.confidence) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => {
            challenger.raw_entry.year_hint.is_some() && incumbent.raw_entry.year_hint.is_none()
        }
    }
}

fn list_entry(survivor: Survivor) -> ListEntry {
    let Survivor { record, entity } = survivor;
    let (title, _) = split_trailing_year(&record.raw_entry.title);
    let year = record
        .chosen
        .as_ref()
        .and_then(|c| c.release_year)
        .or(record.raw_entry.year_hint);
    ListEntry {
        entity,
        title,
        year,
        confidence: record.confidence,
        source_id: record.raw_entry.source_id,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{
        CandidateMatch, MediaType, RawEntry, ResolutionStatus, UnresolvedReason,
    };

    fn resolved(title: &str, source: &str, id: u64, confidence: f64) -> ResolutionRecord {
        ResolutionRecord {
            raw_entry: RawEntry::new(title, source),
            status: ResolutionStatus::Resolved,
            chosen: Some(CandidateMatch {
                tmdb_id: id,
                media_type: MediaType::Movie,
                canonical_title: title.to_string(),
                release_year: Some(1995),
                score: confidence,
            }),
            confidence,
            candidates: Vec::new(),
            detail: None,
            resolved_at: Utc::now(),
        }
    }

    fn failed(title: &str, status: ResolutionStatus) -> ResolutionRecord {
        ResolutionRecord {
            raw_entry: RawEntry::new(title, "list"),
            status,
            chosen: None,
            confidence: 0.0,
            candidates: Vec::new(),
            detail: None,
            resolved_at: Utc::now(),
        }
    }

    #[test]
    fn test_higher_confidence_wins() {
        let result = Reconciler::new().reconcile(
            vec![
                resolved("Heat", "a", 949, 0.8),
                resolved("HEAT", "b", 949, 0.95),
            ],
            None,
        );
        assert_eq!(result.final_list.len(), 1);
        assert_eq!(result.final_list[0].source_id, "b");
        assert!((result.final_list[0].confidence - 0.95).abs() < 1e-9);
        assert_eq!(result.duplicates_dropped, 1);
    }

    #[test]
    fn test_tie_prefers_year_hint() {
        let mut with_year = resolved("Heat", "b", 949, 0.9);
        with_year.raw_entry.year_hint = Some(1995);
        let result = Reconciler::new()
            .reconcile(vec![resolved("Heat", "a", 949, 0.9), with_year], None);
        assert_eq!(result.final_list[0].source_id, "b");
    }

    #[test]
    fn test_full_tie_keeps_first_seen() {
        let result = Reconciler::new().reconcile(
            vec![
                resolved("Heat", "a", 949, 0.9),
                resolved("Heat", "b", 949, 0.9),
            ],
            None,
        );
        assert_eq!(result.final_list[0].source_id, "a");
    }

    #[test]
    fn test_existing_records_are_seen_first() {
        let result = Reconciler::new().reconcile(
            vec![resolved("Heat", "new", 949, 1.0)],
            Some(vec![resolved("Heat", "existing", 949, 1.0)]),
        );
        assert_eq!(result.final_list.len(), 1);
        assert_eq!(result.final_list[0].source_id, "existing");
    }

    #[test]
    fn test_formatting_variants_collapse() {
        let result = Reconciler::new().reconcile(
            vec![
                resolved("Heat (1995)", "a", 949, 0.9),
                resolved("Heat [1995]", "b", 949, 0.9),
                resolved("heat", "c", 949, 0.9),
            ],
            None,
        );
        assert_eq!(result.final_list.len(), 1);
        assert_eq!(result.final_list[0].title, "Heat");
        assert_eq!(result.final_list[0].year, Some(1995));
    }

    #[test]
    fn test_same_id_different_type_are_distinct() {
        let mut show = resolved("Heat", "b", 949, 0.9);
        show.chosen.as_mut().unwrap().media_type = MediaType::Show;
        let result = Reconciler::new().reconcile(vec![resolved("Heat", "a", 949, 0.9), show], None);
        assert_eq!(result.final_list.len(), 2);
    }

    #[test]
    fn test_errors_grouped_and_excluded_from_list() {
        let mut office = failed("The Office", ResolutionStatus::Ambiguous);
        office.candidates = vec![
            resolved("The Office", "x", 2316, 0.9).chosen.unwrap(),
            resolved("The Office", "x", 2996, 0.9).chosen.unwrap(),
        ];
        let result = Reconciler::new().reconcile(
            vec![
                resolved("Heat", "a", 949, 1.0),
                office,
                failed(
                    "Nothing",
                    ResolutionStatus::Unresolved(UnresolvedReason::NoMatch),
                ),
                failed(
                    "Flaky",
                    ResolutionStatus::Unresolved(UnresolvedReason::ProviderError),
                ),
                failed("Cached Miss", ResolutionStatus::CacheHit),
            ],
            None,
        );

        assert_eq!(result.final_list.len(), 1);
        let report = &result.error_report;
        assert_eq!(report.entries(ErrorReason::Ambiguous).len(), 1);
        assert_eq!(report.entries(ErrorReason::Ambiguous)[0].candidates.len(), 2);
        assert_eq!(report.entries(ErrorReason::NoMatch).len(), 2);
        assert_eq!(report.entries(ErrorReason::ProviderError).len(), 1);
    }

    #[test]
    fn test_error_entries_deduplicated_by_key() {
        let result = Reconciler::new().reconcile(
            vec![
                failed("The Office", ResolutionStatus::Ambiguous),
                failed("the  office", ResolutionStatus::Ambiguous),
            ],
            None,
        );
        assert_eq!(result.error_report.len(), 1);
        assert_eq!(result.duplicates_dropped, 1);
    }

    #[test]
    fn test_error_dropped_when_same_key_resolved() {
        let result = Reconciler::new().reconcile(
            vec![resolved("Heat", "new", 949, 1.0)],
            Some(vec![failed(
                "Heat",
                ResolutionStatus::Unresolved(UnresolvedReason::ProviderError),
            )]),
        );
        assert_eq!(result.final_list.len(), 1);
        assert!(result.error_report.is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let input = vec![
            resolved("Heat", "a", 949, 0.8),
            resolved("Inception", "a", 27205, 1.0),
            resolved("Heat", "b", 949, 0.8),
            failed("The Office", ResolutionStatus::Ambiguous),
        ];
        let first = Reconciler::new().reconcile(input.clone(), None);
        let second = Reconciler::new().reconcile(input, None);
        assert_eq!(first, second);
        assert_eq!(
            first
                .final_list
                .iter()
                .map(|e| e.entity.tmdb_id)
                .collect::<Vec<_>>(),
            vec![949, 27205]
        );
    }
}
