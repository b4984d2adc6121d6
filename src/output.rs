//! Human-readable run summaries printed to stdout.

use std::fmt::Write as _;
use std::path::Path;

use titlesync_core::{ErrorReason, ErrorReport, PoolOutcome, Reconciliation};

/// Summary printed after `resolve` and `fix-errors`.
pub(crate) fn print_run_summary(list: &Path, run: &RunCounts, reconciliation: &Reconciliation) {
    println!("{}", render_run_summary(list, run, reconciliation));
}

/// Entry counts of one run, before reconciliation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RunCounts {
    /// Entries that went through the pool.
    pub(crate) looked_up: usize,
    /// Entries left undispatched by an interrupt.
    pub(crate) pending: usize,
    /// Input titles already present in the list.
    pub(crate) skipped: usize,
}

impl RunCounts {
    pub(crate) fn from_outcome(outcome: &PoolOutcome, skipped: usize) -> Self {
        Self {
            looked_up: outcome.records.len(),
            pending: outcome.pending.len(),
            skipped,
        }
    }
}

fn render_run_summary(list: &Path, run: &RunCounts, reconciliation: &Reconciliation) -> String {
    let mut out = format!(
        "Wrote {} ({} titles, {} need attention)",
        list.display(),
        reconciliation.final_list.len(),
        reconciliation.error_report.len()
    );
    let _ = write!(out, "\n  looked up: {}", run.looked_up);
    if run.skipped > 0 {
        let _ = write!(out, "\n  already listed: {}", run.skipped);
    }
    if reconciliation.duplicates_dropped > 0 {
        let _ = write!(
            out,
            "\n  duplicates dropped: {}",
            reconciliation.duplicates_dropped
        );
    }
    if run.pending > 0 {
        let _ = write!(
            out,
            "\n  interrupted: {} titles kept unresolved for the next run",
            run.pending
        );
    }
    out.push_str(&render_error_report(&reconciliation.error_report));
    out
}

/// Per-reason breakdown of the entries needing attention.
pub(crate) fn render_error_report(report: &ErrorReport) -> String {
    let mut out = String::new();
    for reason in [
        ErrorReason::Ambiguous,
        ErrorReason::NoMatch,
        ErrorReason::ProviderError,
    ] {
        let entries = report.entries(reason);
        if entries.is_empty() {
            continue;
        }
        let _ = write!(out, "\n  {} ({}):", label(reason), entries.len());
        for entry in entries {
            let _ = write!(out, "\n    {}", entry.raw.title);
            if reason == ErrorReason::Ambiguous {
                for candidate in &entry.candidates {
                    let year = candidate
                        .release_year
                        .map_or_else(String::new, |y| format!(" ({y})"));
                    let _ = write!(
                        out,
                        "\n      {:.2} {}{year} [{}:{}]",
                        candidate.score,
                        candidate.canonical_title,
                        candidate.media_type,
                        candidate.tmdb_id
                    );
                }
            }
            if let Some(detail) = &entry.detail {
                let _ = write!(out, "\n      {detail}");
            }
        }
    }
    out
}

fn label(reason: ErrorReason) -> &'static str {
    match reason {
        ErrorReason::Ambiguous => "ambiguous",
        ErrorReason::NoMatch => "no match",
        ErrorReason::ProviderError => "provider errors, retried next run",
    }
}
