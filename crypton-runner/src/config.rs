//! Runner configuration: the strategy parameters plus backtest settings.
//!
//! One TOML file drives both layers. Strategy sections (`[bb]`, `[rsi]`,
//! `[risk]`, `[position]`, `[signal]`) sit at the top level and a `[backtest]`
//! section adds what only the replay driver needs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crypton_core::config::{ConfigError, StrategyConfig};

/// Unique identifier for a run configuration (content-addressable hash).
pub type ConfigHash = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunnerConfig {
    #[serde(flatten)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub backtest: BacktestSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    /// Quote-currency cash at the start of a run.
    pub initial_capital: f64,
    /// Commission charged on every fill, as a fraction of notional.
    pub commission_pct: f64,
    /// Trade journal written during the run. None disables journaling.
    pub journal_path: Option<PathBuf>,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            commission_pct: 0.001,
            journal_path: None,
        }
    }
}

impl RunnerConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()?;
        let bt = &self.backtest;
        if !(bt.initial_capital.is_finite() && bt.initial_capital > 0.0) {
            return Err(ConfigError::Invalid {
                field: "backtest.initial_capital",
                reason: format!("must be positive, got {}", bt.initial_capital),
            });
        }
        if !(0.0..1.0).contains(&bt.commission_pct) {
            return Err(ConfigError::Invalid {
                field: "backtest.commission_pct",
                reason: format!("must be in [0, 1), got {}", bt.commission_pct),
            });
        }
        Ok(())
    }

    /// Deterministic BLAKE3 hash of the full configuration.
    ///
    /// Two runs with identical configs share the hash, so results can be
    /// matched to the parameters that produced them.
    pub fn config_hash(&self) -> ConfigHash {
        let mut hasher = blake3::Hasher::new();
        // serde_json only fails on non-string map keys; these types have none.
        if let Ok(json) = serde_json::to_vec(self) {
            hasher.update(&json);
        }
        hasher.finalize().to_hex().to_string()
    }
}
