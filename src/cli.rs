//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use titlesync_core::MediaType;

/// Resolve scraped movie and TV titles against TMDB.
///
/// Titlesync turns raw title lists into deduplicated lists of
/// `Title (Year) [ID]` / `Title (Year) [movie:ID]` lines.
#[derive(Parser, Debug)]
#[command(name = "titlesync")]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command. Unset values fall back to the environment,
/// then the config file, then built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Concurrent lookups (1-64)
    #[arg(short = 'w', long, global = true, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub workers: Option<u8>,

    /// Maximum TMDB requests per second (0 disables the limit)
    #[arg(long, global = true)]
    pub rps: Option<f64>,

    /// Retries after a failed provider call (0-10)
    #[arg(short = 'r', long, global = true, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: Option<u32>,

    /// Leave the year out of written list lines
    #[arg(long, global = true)]
    pub no_year: bool,

    /// Write titles verbatim without TMDB lookups
    #[arg(long, global = true)]
    pub no_match: bool,

    /// Lookup cache database path
    #[arg(long, global = true, value_name = "PATH")]
    pub cache: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve raw title files and merge them into a list
    Resolve(ResolveArgs),

    /// Re-resolve the [Error] and untagged lines of a list
    FixErrors {
        /// List file to repair in place
        list: PathBuf,
    },

    /// Remove duplicate titles from a list by TMDB identity
    Dedupe {
        /// List file to deduplicate in place
        list: PathBuf,
    },

    /// Look a single title up and print the scored candidates
    Search(SearchArgs),

    /// Drop cached no-match verdicts so those titles are looked up again
    PurgeCache,
}

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Raw title files, one title per line
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// List file to merge into (created when missing)
    #[arg(short, long, value_name = "LIST")]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Title to look up
    pub title: String,

    /// Release year hint
    #[arg(short, long)]
    pub year: Option<i32>,

    /// Only search films
    #[arg(long, conflicts_with = "show")]
    pub movie: bool,

    /// Only search TV series
    #[arg(long)]
    pub show: bool,
}

impl SearchArgs {
    /// Media type implied by `--movie` / `--show`.
    pub fn media_type(&self) -> Option<MediaType> {
        if self.movie {
            Some(MediaType::Movie)
        } else if self.show {
            Some(MediaType::Show)
        } else {
            None
        }
    }
}
