//! Decomposition configuration with environment variable and file-based loading.
//!
//! Environment variables:
//! - `ROLLCOVER_ORDER`: Derivation order (unset picks one from the texture)
//! - `ROLLCOVER_MAX_PATHS`: Cap on enumerated shortest paths
//! - `ROLLCOVER_SCAN`: `time-major` or `frequency-major`
//! - `ROLLCOVER_REGIME`: `auto`, `dense` or `sparse`
//! - `ROLLCOVER_CHECKPOINT_DB`: Checkpoint database path
//!
//! Default checkpoint database: `~/.rollcover/checkpoints.db`

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::graph::ScanOrder;
use crate::search::{OrderRegime, SearchOptions};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompositionConfig {
    /// Fixed derivation order. Unset uses the `regime` heuristic.
    #[serde(default)]
    pub order: Option<usize>,

    #[serde(default = "default_max_paths")]
    pub max_paths: usize,

    #[serde(default)]
    pub scan: ScanOrder,

    #[serde(default)]
    pub regime: OrderRegime,

    #[serde(default)]
    pub checkpoint_db: Option<PathBuf>,
}

fn default_max_paths() -> usize {
    10
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            order: None,
            max_paths: default_max_paths(),
            scan: ScanOrder::default(),
            regime: OrderRegime::default(),
            checkpoint_db: None,
        }
    }
}

/// Get the default checkpoint path (~/.rollcover/checkpoints.db).
fn default_checkpoint_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".rollcover").join("checkpoints.db"))
        .unwrap_or_else(|| PathBuf::from(".rollcover/checkpoints.db"))
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid {key}={raw}: {e}"))
        })
        .transpose()
}

impl DecompositionConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with variables read through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            order: parse_var(&lookup, "ROLLCOVER_ORDER")?,
            max_paths: parse_var(&lookup, "ROLLCOVER_MAX_PATHS")?.unwrap_or(defaults.max_paths),
            scan: parse_var(&lookup, "ROLLCOVER_SCAN")?.unwrap_or(defaults.scan),
            regime: parse_var(&lookup, "ROLLCOVER_REGIME")?.unwrap_or(defaults.regime),
            checkpoint_db: lookup("ROLLCOVER_CHECKPOINT_DB").map(PathBuf::from),
        })
    }

    /// Load configuration from a TOML file, falling back to environment.
    ///
    /// The file should contain a `[decomposition]` section:
    /// ```toml
    /// [decomposition]
    /// max_paths = 5
    /// scan = "frequency-major"
    /// regime = "sparse"
    /// checkpoint_db = "/tank/rollcover/checkpoints.db"
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let table: toml::Table = contents
            .parse()
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;

        if let Some(section) = table.get("decomposition") {
            let config: DecompositionConfig = section
                .clone()
                .try_into()
                .context("failed to parse [decomposition] section")?;
            Ok(config)
        } else {
            Self::from_env()
        }
    }

    /// Checkpoint database to use, explicit or default.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint_db
            .clone()
            .unwrap_or_else(default_checkpoint_path)
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            order: self.order,
            max_paths: self.max_paths,
            regime: self.regime,
        }
    }
}
