//! Fix-errors command: re-resolve the `[Error]` and untagged lines of a list.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use titlesync_core::listfile;
use titlesync_core::{CacheKey, Reconciler};
use tracing::info;

use super::pipeline::Pipeline;
use super::resolve::{source_label, write_merged};
use crate::ProcessExit;
use crate::app_config::AppConfig;
use crate::output::{self, RunCounts};

pub async fn run_fix_errors_command(
    list: &std::path::Path,
    app: &AppConfig,
    interrupted: Arc<AtomicBool>,
    quiet: bool,
) -> Result<ProcessExit> {
    let parsed = listfile::read_list(list, &source_label(list))?;
    let retry = parsed.unresolved();
    if retry.is_empty() {
        println!("Nothing to fix in {}", list.display());
        return Ok(ProcessExit::Success);
    }
    info!(entries = retry.len(), "re-resolving list errors");

    let pipeline = Pipeline::open(app).await?;

    // Titles flagged in the list get a fresh lookup even if a no-match is cached.
    let mut forgotten = 0usize;
    for entry in &retry {
        if pipeline.cache.forget_unresolved(&CacheKey::for_entry(entry)).await {
            forgotten += 1;
        }
    }
    info!(forgotten, "cleared cached no-match verdicts for flagged titles");

    let outcome = pipeline.resolve(retry, interrupted, quiet).await?;
    pipeline.finish().await?;

    let counts = RunCounts::from_outcome(&outcome, 0);
    let reconciliation = Reconciler::new().reconcile(outcome.records, Some(parsed.resolved));
    write_merged(
        list,
        &reconciliation,
        &outcome.pending,
        app.resolver.include_year,
    )?;
    output::print_run_summary(list, &counts, &reconciliation);

    Ok(if outcome.interrupted {
        ProcessExit::Interrupted
    } else {
        ProcessExit::Success
    })
}
