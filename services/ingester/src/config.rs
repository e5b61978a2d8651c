//! Ingester configuration.
//!
//! Built once at start-up, from the environment or from a YAML file with
//! `${VAR}` / `${VAR:-default}` substitution, and passed by reference from
//! there on.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level ingester configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngesterConfig {
    /// PostgreSQL URL of the observation archive (`SSDA_DSN`)
    pub archive_database_url: Option<String>,

    /// MySQL URL of the SALT science database (`SDB_DSN`)
    pub science_database_url: Option<String>,

    /// Directory containing `salt/data/YYYY/MMDD/...`
    pub fits_base_dir: PathBuf,

    /// Directory of filter transmission curves, one subdirectory per instrument
    pub filter_curve_dir: PathBuf,

    /// Overrides for the built-in keyword tables
    pub keyword_table_dir: Option<PathBuf>,

    /// Database pool size
    pub max_connections: u32,

    /// Number of files processed concurrently
    pub workers: usize,

    /// Whether the end date of a range is ingested too
    pub end_date_inclusive: bool,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            archive_database_url: None,
            science_database_url: None,
            fits_base_dir: PathBuf::from("/data"),
            filter_curve_dir: PathBuf::from("/data/filter_curves"),
            keyword_table_dir: None,
            max_connections: 10,
            workers: 4,
            end_date_inclusive: false,
        }
    }
}

impl IngesterConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            archive_database_url: non_empty_var("SSDA_DSN"),
            science_database_url: non_empty_var("SDB_DSN"),
            fits_base_dir: non_empty_var("FITS_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.fits_base_dir),
            filter_curve_dir: non_empty_var("FILTER_CURVE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.filter_curve_dir),
            keyword_table_dir: non_empty_var("KEYWORD_TABLE_DIR").map(PathBuf::from),
            max_connections: parse_var("ARCHIVE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            workers: parse_var("INGEST_WORKERS")?.unwrap_or(defaults.workers),
            end_date_inclusive: parse_var("END_DATE_INCLUSIVE")?
                .unwrap_or(defaults.end_date_inclusive),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config from {:?}", path.as_ref()))?;

        let expanded = expand_env_vars(&content)?;

        let config: IngesterConfig = serde_yaml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config from {:?}", path.as_ref()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.workers > 0, "workers must be at least 1");
        anyhow::ensure!(
            self.max_connections > 0,
            "max_connections must be at least 1"
        );
        anyhow::ensure!(
            !self.fits_base_dir.as_os_str().is_empty(),
            "fits_base_dir cannot be empty"
        );
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        None => Ok(None),
    }
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in YAML content
/// Supports ${VAR} and ${VAR:-default} syntax
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::new();
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_expr = String::new();
            let mut brace_count = 1;

            while brace_count > 0 {
                match chars.next() {
                    Some('{') => {
                        brace_count += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        brace_count -= 1;
                        if brace_count > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            let value = resolve_var_expr(&var_expr)?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve variable expression (supports VAR and VAR:-default syntax)
fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}
