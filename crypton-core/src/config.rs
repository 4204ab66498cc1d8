//! Strategy configuration loaded from TOML and validated once at startup.
//!
//! All percentages are fractions: `0.02` means 2%. Every field has a default,
//! so an empty file yields the stock mean-reversion setup.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::risk::{DailyReset, RiskLimits};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to load replay signals from {path}: {reason}")]
    Replay { path: PathBuf, reason: String },
}

/// Longest accepted per-symbol cooldown: one year.
pub const MAX_COOLDOWN_HOURS: f64 = 24.0 * 365.0;

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Immutable strategy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StrategyConfig {
    pub bb: BollingerConfig,
    pub rsi: RsiConfig,
    pub risk: RiskConfig,
    pub position: PositionConfig,
    pub signal: SignalConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BollingerConfig {
    pub length: usize,
    pub std: f64,
}

impl Default for BollingerConfig {
    fn default() -> Self {
        Self {
            length: 20,
            std: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiConfig {
    pub length: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            length: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_open_positions: usize,
    pub stop_loss_pct: f64,
    pub take_profit: TakeProfitConfig,
    /// Realized loss (positive fraction) that pauses new entries for 24h.
    pub daily_loss_cap_pct: f64,
    pub cooldown_hours: f64,
    pub daily_reset: DailyReset,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_open_positions: 3,
            stop_loss_pct: 0.02,
            take_profit: TakeProfitConfig::default(),
            daily_loss_cap_pct: 0.05,
            cooldown_hours: 4.0,
            daily_reset: DailyReset::UtcMidnight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeProfitConfig {
    /// Ascending favorable-move levels, one per rung.
    pub levels: Vec<f64>,
    pub chunk_pct: ChunkPct,
}

impl Default for TakeProfitConfig {
    fn default() -> Self {
        Self {
            levels: vec![0.02, 0.04, 0.06],
            chunk_pct: ChunkPct::Uniform(0.30),
        }
    }
}

/// Chunk size per rung: one value for every rung or one value per level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkPct {
    Uniform(f64),
    PerLevel(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    /// Share of account equity committed per entry.
    pub size_pct: f64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self { size_pct: 0.333 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignalSourceKind {
    #[default]
    MeanReversion,
    /// Decisions recorded from an external advisor, replayed from a file.
    Replay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SignalConfig {
    pub source: SignalSourceKind,
    pub replay_path: Option<PathBuf>,
}

/// Stop-loss and ladder parameters handed to the ledger when a position opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    pub stop_loss_pct: f64,
    /// `(level_pct, chunk_pct)` pairs in ascending level order.
    pub rungs: Vec<(f64, f64)>,
}

impl StrategyConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: StrategyConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Per-rung chunk percentages, expanded from the uniform form if needed.
    pub fn chunks(&self) -> Vec<f64> {
        let levels = self.risk.take_profit.levels.len();
        match &self.risk.take_profit.chunk_pct {
            ChunkPct::Uniform(pct) => vec![*pct; levels],
            ChunkPct::PerLevel(chunks) => chunks.clone(),
        }
    }

    pub fn exit_plan(&self) -> ExitPlan {
        ExitPlan {
            stop_loss_pct: self.risk.stop_loss_pct,
            rungs: self
                .risk
                .take_profit
                .levels
                .iter()
                .copied()
                .zip(self.chunks())
                .collect(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::milliseconds((self.risk.cooldown_hours * 3_600_000.0).round() as i64)
    }

    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            max_open_positions: self.risk.max_open_positions,
            daily_loss_cap_pct: self.risk.daily_loss_cap_pct,
            cooldown: self.cooldown(),
            pause_duration: Duration::hours(24),
            daily_reset: self.risk.daily_reset,
        }
    }

    /// Reject malformed parameters before any trading starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bb.length == 0 {
            return Err(invalid("bb.length", "must be at least 1"));
        }
        if !(self.bb.std.is_finite() && self.bb.std > 0.0) {
            return Err(invalid("bb.std", format!("must be positive, got {}", self.bb.std)));
        }
        if self.rsi.length == 0 {
            return Err(invalid("rsi.length", "must be at least 1"));
        }
        let in_rsi_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_rsi_range(self.rsi.oversold) || !in_rsi_range(self.rsi.overbought) {
            return Err(invalid("rsi", "oversold/overbought must lie within 0..=100"));
        }
        if self.rsi.oversold >= self.rsi.overbought {
            return Err(invalid(
                "rsi",
                format!(
                    "oversold ({}) must be below overbought ({})",
                    self.rsi.oversold, self.rsi.overbought
                ),
            ));
        }

        let risk = &self.risk;
        if risk.max_open_positions == 0 {
            return Err(invalid("risk.max_open_positions", "must be at least 1"));
        }
        if !(risk.stop_loss_pct > 0.0 && risk.stop_loss_pct < 1.0) {
            return Err(invalid(
                "risk.stop_loss_pct",
                format!("must be in (0, 1), got {}", risk.stop_loss_pct),
            ));
        }
        if !(risk.daily_loss_cap_pct > 0.0 && risk.daily_loss_cap_pct <= 1.0) {
            return Err(invalid(
                "risk.daily_loss_cap_pct",
                format!("must be in (0, 1], got {}", risk.daily_loss_cap_pct),
            ));
        }
        if !(risk.cooldown_hours >= 0.0 && risk.cooldown_hours <= MAX_COOLDOWN_HOURS) {
            return Err(invalid(
                "risk.cooldown_hours",
                format!("must be in [0, {MAX_COOLDOWN_HOURS}], got {}", risk.cooldown_hours),
            ));
        }
        self.validate_ladder()?;

        if !(self.position.size_pct > 0.0 && self.position.size_pct <= 1.0) {
            return Err(invalid(
                "position.size_pct",
                format!("must be in (0, 1], got {}", self.position.size_pct),
            ));
        }
        if self.signal.source == SignalSourceKind::Replay && self.signal.replay_path.is_none() {
            return Err(invalid("signal.replay_path", "required when source = \"replay\""));
        }
        Ok(())
    }

    fn validate_ladder(&self) -> Result<(), ConfigError> {
        let levels = &self.risk.take_profit.levels;
        if levels.is_empty() {
            return Err(invalid("risk.take_profit.levels", "ladder must have at least one rung"));
        }
        if levels.iter().any(|l| !(l.is_finite() && *l > 0.0)) {
            return Err(invalid("risk.take_profit.levels", "levels must be positive"));
        }
        if levels.windows(2).any(|w| w[1] <= w[0]) {
            return Err(invalid("risk.take_profit.levels", "levels must be strictly ascending"));
        }

        let chunks = self.chunks();
        if chunks.len() != levels.len() {
            return Err(invalid(
                "risk.take_profit.chunk_pct",
                format!("{} chunks for {} levels", chunks.len(), levels.len()),
            ));
        }
        if chunks.iter().any(|c| !(c.is_finite() && *c > 0.0)) {
            return Err(invalid("risk.take_profit.chunk_pct", "chunks must be positive"));
        }
        let total: f64 = chunks.iter().sum();
        if total > 1.0 + 1e-9 {
            return Err(invalid(
                "risk.take_profit.chunk_pct",
                format!("chunks sum to {:.1}%, above 100%", total * 100.0),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = StrategyConfig::from_toml("").unwrap();
        assert_eq!(config, StrategyConfig::default());
        assert_eq!(config.risk.max_open_positions, 3);
        assert_eq!(config.chunks(), vec![0.30, 0.30, 0.30]);
        assert_eq!(config.cooldown(), Duration::hours(4));
    }

    #[test]
    fn parses_full_document() {
        let toml = r#"
[bb]
length = 30
std = 2.5

[rsi]
length = 10
oversold = 25.0
overbought = 75.0

[risk]
max_open_positions = 5
stop_loss_pct = 0.03
daily_loss_cap_pct = 0.04
cooldown_hours = 0.25
daily_reset = "rolling24h"

[risk.take_profit]
levels = [0.02, 0.04, 0.06]
chunk_pct = [0.3, 0.3, 0.4]

[position]
size_pct = 0.2
"#;
        let config = StrategyConfig::from_toml(toml).unwrap();
        assert_eq!(config.bb.length, 30);
        assert_eq!(config.rsi.oversold, 25.0);
        assert_eq!(config.risk.daily_reset, DailyReset::Rolling24h);
        assert_eq!(config.cooldown(), Duration::minutes(15));
        assert_eq!(
            config.exit_plan().rungs,
            vec![(0.02, 0.3), (0.04, 0.3), (0.06, 0.4)]
        );
    }

    #[test]
    fn rejects_empty_ladder() {
        let err = StrategyConfig::from_toml("[risk.take_profit]\nlevels = []").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "risk.take_profit.levels", .. }));
    }

    #[test]
    fn rejects_descending_levels() {
        let err = StrategyConfig::from_toml("[risk.take_profit]\nlevels = [0.04, 0.02]").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "risk.take_profit.levels", .. }));
    }

    #[test]
    fn rejects_chunks_over_100_pct() {
        let toml = "[risk.take_profit]\nlevels = [0.02, 0.04]\nchunk_pct = [0.6, 0.5]";
        let err = StrategyConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("above 100%"), "{err}");
    }

    #[test]
    fn rejects_chunk_count_mismatch() {
        let toml = "[risk.take_profit]\nlevels = [0.02, 0.04]\nchunk_pct = [0.5]";
        assert!(StrategyConfig::from_toml(toml).is_err());
    }

    #[test]
    fn rejects_negative_percentages() {
        assert!(StrategyConfig::from_toml("[risk]\nstop_loss_pct = -0.02").is_err());
        assert!(StrategyConfig::from_toml("[position]\nsize_pct = -0.1").is_err());
        assert!(StrategyConfig::from_toml("[risk]\ncooldown_hours = -1.0").is_err());
    }

    #[test]
    fn rejects_cooldown_beyond_a_year() {
        let err = StrategyConfig::from_toml("[risk]\ncooldown_hours = 1e10").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "risk.cooldown_hours", .. }));
        assert!(StrategyConfig::from_toml("[risk]\ncooldown_hours = nan").is_err());
        let config = StrategyConfig::from_toml("[risk]\ncooldown_hours = 8760.0").unwrap();
        assert_eq!(config.cooldown(), Duration::days(365));
    }

    #[test]
    fn rejects_inverted_rsi_bounds() {
        let err = StrategyConfig::from_toml("[rsi]\noversold = 70.0\noverbought = 30.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "rsi", .. }));
    }

    #[test]
    fn replay_requires_path() {
        let err = StrategyConfig::from_toml("[signal]\nsource = \"replay\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "signal.replay_path", .. }));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = StrategyConfig::from_toml("[risk\nmax_open_positions = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = StrategyConfig::load(Path::new("/nonexistent/crypton.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
