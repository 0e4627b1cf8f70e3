//! `bitflux.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::{ReplayStrategy, Reporter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Base directory for recorded results and run artifacts.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Default reporter for CLI commands.
    #[serde(default = "default_reporter")]
    pub reporter: Reporter,

    /// Default replay strategy for `verify` / `verify-batch`.
    #[serde(default = "default_strategy")]
    pub strategy: ReplayStrategy,

    /// Tolerated bit-mismatch percentage under the trust-stored strategy.
    /// `None` means exact matching.
    #[serde(default)]
    pub tolerance_percent: Option<f64>,

    /// Evaluation budget for `EXEC` scripts.
    #[serde(default = "default_script_step_budget")]
    pub script_step_budget: u64,

    /// Advisory cumulative cost ceiling per command execution.
    #[serde(default)]
    pub cost_ceiling: Option<u64>,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".bitflux")
}

fn default_reporter() -> Reporter {
    Reporter::Pretty
}

fn default_strategy() -> ReplayStrategy {
    ReplayStrategy::Reexecute
}

fn default_script_step_budget() -> u64 {
    4096
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            reporter: default_reporter(),
            strategy: default_strategy(),
            tolerance_percent: None,
            script_step_budget: default_script_step_budget(),
            cost_ceiling: None,
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn results_dir(&self) -> PathBuf {
        self.base_dir.join("results")
    }
}
