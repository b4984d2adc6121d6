//! Dedupe command: identity-based duplicate removal, no lookups.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use titlesync_core::listfile::{self, ParsedList};
use titlesync_core::title::normalize_whitespace_lower;
use titlesync_core::{
    Reconciler, Reconciliation, ResolutionStatus, UnresolvedReason, Verdict,
};
use tracing::info;

use super::resolve::source_label;

pub fn run_dedupe_command(list: &Path, include_year: bool) -> Result<()> {
    let parsed = listfile::read_list(list, &source_label(list))?;
    let before = parsed.len();
    let (reconciliation, plain) = dedupe(parsed);

    let rendered = listfile::render_list(&reconciliation, include_year);
    let lines: Vec<&str> = rendered
        .lines()
        .chain(plain.iter().map(String::as_str))
        .collect();
    listfile::write_lines(list, &lines)?;

    let removed = before - lines.len();
    info!(before, after = lines.len(), removed, "list deduplicated");
    println!(
        "Wrote {} ({} lines, {removed} duplicates removed)",
        list.display(),
        lines.len()
    );
    Ok(())
}

/// Merges resolved lines by identity and error lines by lookup key. Untagged
/// lines are deduplicated by normalized title and dropped when the same title
/// already appears elsewhere in the list.
fn dedupe(parsed: ParsedList) -> (Reconciliation, Vec<String>) {
    let ParsedList {
        resolved,
        errors,
        plain,
    } = parsed;

    let mut seen: HashSet<String> = resolved
        .iter()
        .map(|record| &record.raw_entry)
        .chain(&errors)
        .map(|entry| normalize_whitespace_lower(&entry.title))
        .collect();

    let flagged = errors.into_iter().map(|raw| {
        Verdict::new(ResolutionStatus::Unresolved(UnresolvedReason::NoMatch)).into_record(raw)
    });
    let records = resolved.into_iter().chain(flagged).collect();
    let reconciliation = Reconciler::new().reconcile(records, None);

    let plain = plain
        .into_iter()
        .filter(|entry| seen.insert(normalize_whitespace_lower(&entry.title)))
        .map(|entry| match entry.year_hint {
            Some(year) => format!("{} ({year})", entry.title),
            None => entry.title,
        })
        .collect();

    (reconciliation, plain)
}
