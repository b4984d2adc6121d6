//! Resolve command: raw title files in, merged list out.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use titlesync_core::listfile::{self, ParsedList};
use titlesync_core::title::normalize_whitespace_lower;
use titlesync_core::{RawEntry, Reconciler, Reconciliation};
use tracing::{debug, info};

use super::pipeline::Pipeline;
use crate::ProcessExit;
use crate::app_config::AppConfig;
use crate::cli::ResolveArgs;
use crate::output::{self, RunCounts};

pub async fn run_resolve_command(
    args: &ResolveArgs,
    app: &AppConfig,
    interrupted: Arc<AtomicBool>,
    quiet: bool,
) -> Result<ProcessExit> {
    let existing = listfile::read_list(&args.output, &source_label(&args.output))?;
    let raw = read_inputs(&args.inputs)?;
    info!(inputs = raw.len(), existing = existing.len(), "resolve starting");

    if !app.resolver.matching_enabled {
        return write_verbatim(&args.output, &existing, raw);
    }

    let (fresh, skipped) = split_known(&existing, raw);
    let mut to_resolve = existing.unresolved();
    to_resolve.extend(fresh);
    debug!(to_resolve = to_resolve.len(), skipped, "titles queued for lookup");

    let pipeline = Pipeline::open(app).await?;
    let outcome = pipeline.resolve(to_resolve, interrupted, quiet).await?;
    pipeline.finish().await?;

    let counts = RunCounts::from_outcome(&outcome, skipped);
    let reconciliation = Reconciler::new().reconcile(outcome.records, Some(existing.resolved));
    write_merged(
        &args.output,
        &reconciliation,
        &outcome.pending,
        app.resolver.include_year,
    )?;
    output::print_run_summary(&args.output, &counts, &reconciliation);

    Ok(if outcome.interrupted {
        ProcessExit::Interrupted
    } else {
        ProcessExit::Success
    })
}

/// Reads every input file as one raw title per line.
fn read_inputs(paths: &[impl AsRef<Path>]) -> Result<Vec<RawEntry>> {
    let mut entries = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file '{}'", path.display()))?;
        let source = source_label(path);
        entries.extend(
            text.lines()
                .filter_map(|line| RawEntry::from_line(line, source.as_str())),
        );
    }
    Ok(entries)
}

/// Drops entries whose title is already resolved in the list.
///
/// Returns the entries left to resolve and how many were dropped.
fn split_known(existing: &ParsedList, raw: Vec<RawEntry>) -> (Vec<RawEntry>, usize) {
    let known: HashSet<String> = existing
        .resolved
        .iter()
        .map(|record| normalize_whitespace_lower(&record.raw_entry.title))
        .collect();
    let before = raw.len();
    let fresh: Vec<RawEntry> = raw
        .into_iter()
        .filter(|entry| !known.contains(&normalize_whitespace_lower(&entry.title)))
        .collect();
    let skipped = before - fresh.len();
    (fresh, skipped)
}

/// Matching disabled: append unseen titles to the list as they are.
fn write_verbatim(list: &Path, existing: &ParsedList, raw: Vec<RawEntry>) -> Result<ProcessExit> {
    let mut seen: HashSet<String> = existing
        .resolved
        .iter()
        .map(|record| &record.raw_entry)
        .chain(&existing.errors)
        .chain(&existing.plain)
        .map(|entry| normalize_whitespace_lower(&entry.title))
        .collect();

    let added: Vec<String> = raw
        .into_iter()
        .filter(|entry| seen.insert(normalize_whitespace_lower(&entry.title)))
        .map(|entry| plain_line(&entry))
        .collect();

    let mut lines = existing_lines(list)?;
    let count = added.len();
    lines.extend(added);
    listfile::write_lines(list, &lines)?;
    println!("Wrote {} ({count} new titles, matching disabled)", list.display());
    Ok(ProcessExit::Success)
}

fn existing_lines(list: &Path) -> Result<Vec<String>> {
    match fs::read_to_string(list) {
        Ok(text) => Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(error) => {
            Err(error).with_context(|| format!("Failed to read list '{}'", list.display()))
        }
    }
}

/// Writes the reconciled list; entries the run never reached are kept as
/// untagged lines so the next run picks them up.
pub(crate) fn write_merged(
    list: &Path,
    reconciliation: &Reconciliation,
    pending: &[RawEntry],
    include_year: bool,
) -> Result<()> {
    let rendered = listfile::render_list(reconciliation, include_year);
    let lines = rendered
        .lines()
        .map(str::to_string)
        .chain(pending.iter().map(plain_line));
    listfile::write_lines(list, lines)?;
    Ok(())
}

fn plain_line(entry: &RawEntry) -> String {
    match entry.year_hint {
        Some(year) => format!("{} ({year})", entry.title),
        None => entry.title.clone(),
    }
}

/// Source label for entries read from `path`: its file name.
pub(crate) fn source_label(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_split_known_skips_listed_titles() {
        let existing = listfile::parse_list("Inception (2010) [movie:27205]\n", "list");
        let raw = vec![
            RawEntry::new("inception", "a"),
            RawEntry::new("Heat", "a"),
        ];
        let (fresh, skipped) = split_known(&existing, raw);
        assert_eq!(skipped, 1);
        assert_eq!(fresh, vec![RawEntry::new("Heat", "a")]);
    }

    #[test]
    fn test_plain_line_keeps_year() {
        assert_eq!(
            plain_line(&RawEntry::new("Heat", "a").with_year(1995)),
            "Heat (1995)"
        );
        assert_eq!(plain_line(&RawEntry::new("Heat", "a")), "Heat");
    }

    #[test]
    fn test_source_label_is_file_name() {
        assert_eq!(source_label(&PathBuf::from("/tmp/lists/imdb.txt")), "imdb.txt");
    }

    #[test]
    fn test_read_inputs_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.txt");
        std::fs::write(&path, "Inception (2010)\n\n  Heat \n").unwrap();
        let entries = read_inputs(&[&path]).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].year_hint, Some(2010));
        assert_eq!(entries[1].title, "Heat");
        assert_eq!(entries[1].source_id, "raw.txt");
    }

    #[test]
    fn test_write_verbatim_appends_unseen_titles() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        std::fs::write(&list, "Heat (1995) [movie:949]\nSeverance\n").unwrap();
        let existing = listfile::read_list(&list, "list").unwrap();

        write_verbatim(
            &list,
            &existing,
            vec![
                RawEntry::new("severance", "a"),
                RawEntry::new("Dark", "a"),
                RawEntry::new("dark", "b"),
            ],
        )
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(&list).unwrap(),
            "Heat (1995) [movie:949]\nSeverance\nDark\n"
        );
    }
}
