//! Application configuration loading: config file, environment, CLI flags.
//!
//! Precedence, lowest to highest:
//! 1. built-in defaults
//! 2. `$XDG_CONFIG_HOME/titlesync/config.toml` (or `~/.config/titlesync/config.toml`)
//! 3. `.env` file and process environment (`TMDB_API_KEY`, `ENABLE_TMDB`, `INCLUDE_YEAR`,
//!    `TMDB_BASE_URL`)
//! 4. CLI flags

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use titlesync_core::config::DEFAULT_CACHE_FILE;
use titlesync_core::{MatchThresholds, ResolverConfig};

use crate::cli::GlobalArgs;

const APP_DIR: &str = "titlesync";

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub tmdb_api_key: Option<String>,
    pub tmdb_base_url: Option<String>,
    pub enable_tmdb: Option<bool>,
    pub include_year: Option<bool>,
    pub workers: Option<usize>,
    pub requests_per_second: Option<f64>,
    pub max_retries: Option<u32>,
    pub min_score: Option<f64>,
    pub high_confidence: Option<f64>,
    pub ambiguity_delta: Option<f64>,
    pub cache_path: Option<PathBuf>,
    pub negative_cache_days: Option<u32>,
}

/// Settings read from the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub tmdb_api_key: Option<String>,
    pub tmdb_base_url: Option<String>,
    pub enable_tmdb: Option<bool>,
    pub include_year: Option<bool>,
}

impl EnvConfig {
    /// Reads the process environment, after loading a `.env` file if one exists.
    pub fn from_env() -> Result<Self> {
        // A missing .env is the normal case.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str| -> Result<Option<bool>> {
            non_empty(key)
                .map(|v| parse_env_bool(&v).with_context(|| format!("Invalid `{key}` value '{v}'")))
                .transpose()
        };
        Ok(Self {
            tmdb_api_key: non_empty("TMDB_API_KEY"),
            tmdb_base_url: non_empty("TMDB_BASE_URL"),
            enable_tmdb: flag("ENABLE_TMDB")?,
            include_year: flag("INCLUDE_YEAR")?,
        })
    }
}

fn parse_env_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("Expected one of: true, false, 1, 0, yes, no"),
    }
}

/// Fully merged configuration for one run.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub resolver: ResolverConfig,
    /// Overrides the TMDB API base URL.
    pub tmdb_base_url: Option<String>,
    /// Config file that was read, if any.
    pub loaded_from: Option<PathBuf>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/titlesync/config.toml`
/// 2. `$HOME/.config/titlesync/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join("config.toml"));
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

/// Default cache location: `$XDG_CACHE_HOME/titlesync/` or `~/.cache/titlesync/`,
/// falling back to the working directory.
#[must_use]
pub fn resolve_default_cache_path() -> PathBuf {
    let base = env_var_non_empty_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| env_var_non_empty_os("HOME").map(|home| PathBuf::from(home).join(".cache")));
    match base {
        Some(base) => base.join(APP_DIR).join(DEFAULT_CACHE_FILE),
        None => PathBuf::from(DEFAULT_CACHE_FILE),
    }
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file from its default path if present.
pub fn load_default_file_config() -> Result<(Option<PathBuf>, Option<FileConfig>)> {
    let Some(path) = resolve_default_config_path() else {
        return Ok((None, None));
    };
    if !path.exists() {
        return Ok((None, None));
    }
    let config = load_file_config(&path)?;
    Ok((Some(path), Some(config)))
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    Ok(toml::from_str(raw)?)
}

/// Loads file and environment configuration and merges CLI flags on top.
pub fn load(cli: &GlobalArgs) -> Result<AppConfig> {
    let (loaded_from, file) = load_default_file_config()?;
    let env = EnvConfig::from_env()?;
    let mut config = merge(cli, file.as_ref(), &env);
    config.loaded_from = loaded_from;
    Ok(config)
}

fn merge(cli: &GlobalArgs, file: Option<&FileConfig>, env: &EnvConfig) -> AppConfig {
    let file = file.cloned().unwrap_or_default();
    let defaults = ResolverConfig::default();
    let default_thresholds = MatchThresholds::default();

    let matching_enabled = if cli.no_match {
        false
    } else {
        env.enable_tmdb
            .or(file.enable_tmdb)
            .unwrap_or(defaults.matching_enabled)
    };
    let include_year = if cli.no_year {
        false
    } else {
        env.include_year
            .or(file.include_year)
            .unwrap_or(defaults.include_year)
    };

    let resolver = ResolverConfig {
        api_key: env.tmdb_api_key.clone().or(file.tmdb_api_key),
        matching_enabled,
        include_year,
        workers: cli
            .workers
            .map(usize::from)
            .or(file.workers)
            .unwrap_or(defaults.workers),
        requests_per_second: cli
            .rps
            .or(file.requests_per_second)
            .unwrap_or(defaults.requests_per_second),
        max_retries: cli
            .max_retries
            .or(file.max_retries)
            .unwrap_or(defaults.max_retries),
        thresholds: MatchThresholds {
            min_score: file.min_score.unwrap_or(default_thresholds.min_score),
            high_confidence: file
                .high_confidence
                .unwrap_or(default_thresholds.high_confidence),
            ambiguity_delta: file
                .ambiguity_delta
                .unwrap_or(default_thresholds.ambiguity_delta),
        },
        cache_path: cli
            .cache
            .clone()
            .or(file.cache_path)
            .unwrap_or_else(resolve_default_cache_path),
        negative_cache_days: file.negative_cache_days,
    };

    AppConfig {
        resolver,
        tmdb_base_url: env.tmdb_base_url.clone().or(file.tmdb_base_url),
        loaded_from: None,
    }
}
