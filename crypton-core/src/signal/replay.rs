//! Replayed decisions from an external advisor.
//!
//! An advisor running outside the core (for example an LLM reviewing the
//! market) records its calls as JSON; this source plays them back at the
//! matching symbol and timestamp. Anything not recorded is `Signal::None`.
//!
//! ```json
//! [{"symbol": "BTC/USDT", "timestamp": "2024-03-01T12:00:00Z", "signal": "enter_long"}]
//! ```

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Signal, SignalSource};
use crate::config::ConfigError;
use crate::domain::{IndicatorSnapshot, Symbol};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    pub signal: Signal,
}

#[derive(Debug, Clone, Default)]
pub struct ReplaySignals {
    calls: HashMap<(Symbol, DateTime<Utc>), Signal>,
}

impl ReplaySignals {
    pub fn new(records: impl IntoIterator<Item = ReplayRecord>) -> Self {
        Self {
            calls: records
                .into_iter()
                .map(|r| ((r.symbol, r.timestamp), r.signal))
                .collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<ReplayRecord> = serde_json::from_str(json)?;
        Ok(Self::new(records))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let replay_err = |reason: String| ConfigError::Replay {
            path: path.to_path_buf(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| replay_err(e.to_string()))?;
        Self::from_json(&content).map_err(|e| replay_err(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl SignalSource for ReplaySignals {
    fn name(&self) -> &str {
        "replay"
    }

    fn evaluate(&self, symbol: &str, _snapshot: &IndicatorSnapshot, at: DateTime<Utc>) -> Signal {
        self.calls
            .get(&(symbol.to_string(), at))
            .copied()
            .unwrap_or(Signal::None)
    }
}
