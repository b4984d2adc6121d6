//! CLI command handlers.

mod dedupe;
mod fix_errors;
mod pipeline;
mod purge;
mod resolve;
mod search;

pub use dedupe::run_dedupe_command;
pub use fix_errors::run_fix_errors_command;
pub(crate) use pipeline::install_interrupt_handler;
pub use purge::run_purge_cache_command;
pub use resolve::run_resolve_command;
pub use search::run_search_command;
