//! Error report: entries that need manual attention, grouped by reason.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{CandidateMatch, ErrorReason, RawEntry, ResolutionRecord};

/// One entry that did not make it into the final list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    /// The entry as scraped.
    pub raw: RawEntry,
    /// Candidates to choose from (ambiguous entries only).
    pub candidates: Vec<CandidateMatch>,
    /// Provider failure description, if any.
    pub detail: Option<String>,
}

impl From<ResolutionRecord> for ErrorEntry {
    fn from(record: ResolutionRecord) -> Self {
        Self {
            raw: record.raw_entry,
            candidates: record.candidates,
            detail: record.detail,
        }
    }
}

/// Unresolved and ambiguous entries grouped by [`ErrorReason`].
///
/// Groups iterate in a fixed order (no match, ambiguous, provider error); entries
/// keep the order they were added in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorReport {
    groups: BTreeMap<ErrorReason, Vec<ErrorEntry>>,
}

impl ErrorReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry under `reason`.
    pub fn push(&mut self, reason: ErrorReason, entry: ErrorEntry) {
        self.groups.entry(reason).or_default().push(entry);
    }

    /// Entries filed under `reason`.
    #[must_use]
    pub fn entries(&self, reason: ErrorReason) -> &[ErrorEntry] {
        self.groups.get(&reason).map_or(&[], Vec::as_slice)
    }

    /// All entries with their reason, grouped.
    pub fn iter(&self) -> impl Iterator<Item = (ErrorReason, &ErrorEntry)> {
        self.groups
            .iter()
            .flat_map(|(reason, entries)| entries.iter().map(move |e| (*reason, e)))
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Returns `true` when nothing needs attention.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw entries to feed back into the pool after manual correction.
    #[must_use]
    pub fn resubmit(&self) -> Vec<RawEntry> {
        self.iter().map(|(_, entry)| entry.raw.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str) -> ErrorEntry {
        ErrorEntry {
            raw: RawEntry::new(title, "list"),
            candidates: Vec::new(),
            detail: None,
        }
    }

    #[test]
    fn test_groups_are_ordered_by_reason() {
        let mut report = ErrorReport::new();
        report.push(ErrorReason::ProviderError, entry("Flaky"));
        report.push(ErrorReason::NoMatch, entry("Nothing"));
        report.push(ErrorReason::Ambiguous, entry("The Office"));
        report.push(ErrorReason::NoMatch, entry("Nothing Else"));

        let order: Vec<_> = report
            .iter()
            .map(|(reason, e)| (reason, e.raw.title.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (ErrorReason::NoMatch, "Nothing"),
                (ErrorReason::NoMatch, "Nothing Else"),
                (ErrorReason::Ambiguous, "The Office"),
                (ErrorReason::ProviderError, "Flaky"),
            ]
        );
        assert_eq!(report.len(), 4);
        assert_eq!(report.entries(ErrorReason::NoMatch).len(), 2);
    }

    #[test]
    fn test_empty_report() {
        let report = ErrorReport::new();
        assert!(report.is_empty());
        assert!(report.entries(ErrorReason::Ambiguous).is_empty());
        assert!(report.resubmit().is_empty());
    }

    #[test]
    fn test_resubmit_returns_raw_entries() {
        let mut report = ErrorReport::new();
        report.push(ErrorReason::Ambiguous, entry("The Office"));
        let raw = report.resubmit();
        assert_eq!(raw, vec![RawEntry::new("The Office", "list")]);
    }
}
