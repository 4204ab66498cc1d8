//! Bollinger + RSI mean reversion.
//!
//! Long when the close is at or below the lower band and RSI is oversold;
//! short when the close is at or above the upper band and RSI is overbought.
//! If both hold at once (degenerate bands) the rule stays out.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Signal, SignalSource};
use crate::config::StrategyConfig;
use crate::domain::IndicatorSnapshot;

#[derive(Debug, Clone)]
pub struct MeanReversion {
    oversold: f64,
    overbought: f64,
}

impl MeanReversion {
    pub fn new(oversold: f64, overbought: f64) -> Self {
        Self {
            oversold,
            overbought,
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.rsi.oversold, config.rsi.overbought)
    }
}

impl Default for MeanReversion {
    fn default() -> Self {
        Self::new(30.0, 70.0)
    }
}

impl SignalSource for MeanReversion {
    fn name(&self) -> &str {
        "mean_reversion"
    }

    fn evaluate(&self, symbol: &str, snapshot: &IndicatorSnapshot, _at: DateTime<Utc>) -> Signal {
        if !snapshot.has_valid_price() || !snapshot.indicators_ready() {
            return Signal::None;
        }
        let long = snapshot.price <= snapshot.bb_lower && snapshot.rsi < self.oversold;
        let short = snapshot.price >= snapshot.bb_upper && snapshot.rsi > self.overbought;
        match (long, short) {
            (true, false) => Signal::EnterLong,
            (false, true) => Signal::EnterShort,
            (true, true) => {
                debug!(symbol = %symbol, ?snapshot, "conflicting long and short conditions, staying out");
                Signal::None
            }
            (false, false) => Signal::None,
        }
    }
}
