//! Signal evaluation: which direction, if any, a flat symbol should enter.
//!
//! Sources are portfolio-agnostic: they see a symbol, an indicator snapshot,
//! and the time, never positions or equity. The [`SignalEvaluator`] adds the
//! per-symbol cooldown on top of whichever source is configured.

pub mod evaluator;
pub mod mean_reversion;
pub mod replay;

pub use evaluator::SignalEvaluator;
pub use mean_reversion::MeanReversion;
pub use replay::{ReplayRecord, ReplaySignals};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SignalSourceKind, StrategyConfig};
use crate::domain::{Direction, IndicatorSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    EnterLong,
    EnterShort,
    None,
}

impl Signal {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::EnterLong => Some(Direction::Long),
            Signal::EnterShort => Some(Direction::Short),
            Signal::None => None,
        }
    }
}

/// Anything that can propose entries.
///
/// # Invariants
/// - `evaluate()` has no side effects
/// - `evaluate()` is deterministic for the same inputs
pub trait SignalSource: Send + Sync {
    /// Source name for logs and result manifests.
    fn name(&self) -> &str;

    fn evaluate(&self, symbol: &str, snapshot: &IndicatorSnapshot, at: DateTime<Utc>) -> Signal;
}

/// Build the source selected by `signal.source`.
pub fn source_from_config(config: &StrategyConfig) -> Result<Box<dyn SignalSource>, ConfigError> {
    match config.signal.source {
        SignalSourceKind::MeanReversion => Ok(Box::new(MeanReversion::from_config(config))),
        SignalSourceKind::Replay => {
            let path = config.signal.replay_path.as_deref().ok_or_else(|| ConfigError::Invalid {
                field: "signal.replay_path",
                reason: "required when source = \"replay\"".into(),
            })?;
            Ok(Box::new(ReplaySignals::from_file(path)?))
        }
    }
}
