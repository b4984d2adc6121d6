//! Progress UI for resolution runs.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use titlesync_core::PoolStats;

const REFRESH: Duration = Duration::from_millis(120);

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

pub(crate) fn should_show_progress(stderr_is_terminal: bool, quiet: bool, dumb_terminal: bool) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

/// Whether this process should draw a progress bar.
pub(crate) fn progress_enabled(quiet: bool) -> bool {
    should_show_progress(io::stderr().is_terminal(), quiet, is_dumb_terminal())
}

/// Spawns the progress bar when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `enabled` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    enabled: bool,
    stats: Arc<PoolStats>,
    total: usize,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !enabled {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_bar(stats, total, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_bar(
    stats: Arc<PoolStats>,
    total: usize,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            bar.set_position(stats.completed().min(total) as u64);
            bar.set_message(status_line(&stats));
            tokio::time::sleep(REFRESH).await;
        }

        bar.finish_and_clear();
    })
}

fn status_line(stats: &PoolStats) -> String {
    format!(
        "resolved {} | cached {} | ambiguous {} | no match {} | errors {}",
        stats.resolved(),
        stats.cache_hits(),
        stats.ambiguous(),
        stats.no_match(),
        stats.provider_error()
    )
}
