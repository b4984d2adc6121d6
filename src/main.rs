//! CLI entry point for titlesync.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use titlesync_core::ConfigError;
use tracing::debug;

mod app_config;
mod cli;
mod commands;
mod output;
mod progress;

use cli::{Cli, Command};

/// Exit code for configuration problems, raised before any lookup.
const EXIT_CONFIG: u8 = 2;
/// Exit code after Ctrl-C, following the shell's 128 + SIGINT convention.
const EXIT_INTERRUPTED: u8 = 130;

/// How a successful command run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    /// Ctrl-C stopped dispatch; the list holds what finished.
    Interrupted,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Interrupted => ExitCode::from(EXIT_INTERRUPTED),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.global.quiet {
        "error"
    } else {
        match cli.global.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    init_tracing(default_level);
    debug!(?cli, "CLI arguments parsed");

    let app = match app_config::load(&cli.global) {
        Ok(app) => app,
        Err(error) => {
            eprintln!("Error: {error:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Some(path) = &app.loaded_from {
        debug!(path = %path.display(), "config file loaded");
    }

    match dispatch(&cli, &app).await {
        Ok(exit) => exit.into(),
        Err(error) => {
            eprintln!("Error: {error:#}");
            exit_code_for(&error)
        }
    }
}

async fn dispatch(cli: &Cli, app: &app_config::AppConfig) -> Result<ProcessExit> {
    let quiet = cli.global.quiet;
    match &cli.command {
        Command::Resolve(args) => {
            let interrupted = commands::install_interrupt_handler();
            commands::run_resolve_command(args, app, interrupted, quiet).await
        }
        Command::FixErrors { list } => {
            let interrupted = commands::install_interrupt_handler();
            commands::run_fix_errors_command(list, app, interrupted, quiet).await
        }
        Command::Dedupe { list } => {
            commands::run_dedupe_command(list, app.resolver.include_year)?;
            Ok(ProcessExit::Success)
        }
        Command::Search(args) => {
            commands::run_search_command(args, app).await?;
            Ok(ProcessExit::Success)
        }
        Command::PurgeCache => {
            commands::run_purge_cache_command(app).await?;
            Ok(ProcessExit::Success)
        }
    }
}

fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    if error.downcast_ref::<ConfigError>().is_some() {
        ExitCode::from(EXIT_CONFIG)
    } else {
        ExitCode::FAILURE
    }
}

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_maps_to_exit_two() {
        let error = anyhow::Error::from(ConfigError::MissingApiKey);
        assert_eq!(exit_code_for(&error), ExitCode::from(EXIT_CONFIG));
    }

    #[test]
    fn test_other_errors_map_to_failure() {
        let error = anyhow::anyhow!("disk full");
        assert_eq!(exit_code_for(&error), ExitCode::FAILURE);
    }

    #[test]
    fn test_interrupted_maps_to_130() {
        assert_eq!(
            ExitCode::from(ProcessExit::Interrupted),
            ExitCode::from(EXIT_INTERRUPTED)
        );
    }
}
