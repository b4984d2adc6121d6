//! Search command: look one title up and show how it scores.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use titlesync_core::listfile::format_entry;
use titlesync_core::resolver::decide;
use titlesync_core::{CandidateMatch, ListEntry, MatchThresholds, RawEntry, Verdict};
use tracing::info;

use super::pipeline::Pipeline;
use crate::app_config::AppConfig;
use crate::cli::SearchArgs;

const SEARCH_SOURCE: &str = "search";

pub async fn run_search_command(args: &SearchArgs, app: &AppConfig) -> Result<()> {
    let entry = search_entry(args);
    let pipeline = Pipeline::open(app).await?;
    let resolver = pipeline.pool.resolver();

    let candidates = resolver
        .candidates(&entry)
        .await
        .with_context(|| format!("TMDB search for '{}' failed", entry.title))?;
    info!(title = %entry.title, found = candidates.len(), "search finished");

    let verdict = decide(candidates.clone(), resolver.thresholds());
    println!(
        "{}",
        render_search(&entry, &candidates, &verdict, resolver.thresholds(), app.resolver.include_year)
    );
    Ok(())
}

fn search_entry(args: &SearchArgs) -> RawEntry {
    let mut entry = RawEntry::new(args.title.trim(), SEARCH_SOURCE);
    if let Some(year) = args.year {
        entry = entry.with_year(year);
    }
    if let Some(media_type) = args.media_type() {
        entry = entry.with_type(media_type);
    }
    entry
}

fn render_search(
    entry: &RawEntry,
    candidates: &[CandidateMatch],
    verdict: &Verdict,
    thresholds: &MatchThresholds,
    include_year: bool,
) -> String {
    let mut out = format!("{}: {}", entry.title, verdict.status);
    if candidates.is_empty() {
        out.push_str("\n  no candidates");
        return out;
    }
    for candidate in candidates {
        let marker = if verdict
            .chosen
            .as_ref()
            .is_some_and(|chosen| chosen.entity() == candidate.entity())
        {
            '*'
        } else if candidate.score < thresholds.min_score {
            '-'
        } else {
            ' '
        };
        let line = format_entry(&as_list_entry(candidate, entry), include_year);
        let _ = write!(out, "\n{marker} {:.2}  {line}", candidate.score);
    }
    out
}

fn as_list_entry(candidate: &CandidateMatch, entry: &RawEntry) -> ListEntry {
    ListEntry {
        entity: candidate.entity(),
        title: candidate.canonical_title.clone(),
        year: candidate.release_year,
        confidence: candidate.score,
        source_id: entry.source_id.clone(),
    }
}
