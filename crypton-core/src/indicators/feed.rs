//! Streaming indicator snapshots, one close at a time.

use std::collections::VecDeque;

use super::bollinger::window_bands;
use super::rsi::RsiState;
use crate::config::StrategyConfig;
use crate::domain::{Bar, IndicatorSnapshot};

/// Per-symbol rolling state producing an [`IndicatorSnapshot`] per close.
///
/// Indicator fields stay NaN until both the Bollinger window and the RSI seed
/// are full; the price is always set.
#[derive(Debug, Clone)]
pub struct IndicatorFeed {
    bb_length: usize,
    bb_std: f64,
    window: VecDeque<f64>,
    rsi: RsiState,
}

impl IndicatorFeed {
    pub fn new(bb_length: usize, bb_std: f64, rsi_length: usize) -> Self {
        assert!(bb_length >= 1, "Bollinger period must be >= 1");
        Self {
            bb_length,
            bb_std,
            window: VecDeque::with_capacity(bb_length),
            rsi: RsiState::new(rsi_length),
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.bb.length, config.bb.std, config.rsi.length)
    }

    /// Bars needed before snapshots carry indicator values.
    pub fn warmup(&self) -> usize {
        (self.bb_length - 1).max(self.rsi.period())
    }

    pub fn push(&mut self, close: f64) -> IndicatorSnapshot {
        if self.window.len() == self.bb_length {
            self.window.pop_front();
        }
        self.window.push_back(close);
        let rsi = self.rsi.update(close).unwrap_or(f64::NAN);

        let bands = if self.window.len() == self.bb_length {
            window_bands(self.window.make_contiguous(), self.bb_std)
        } else {
            None
        };
        match bands {
            Some(b) => IndicatorSnapshot::new(close, rsi, b.upper, b.lower),
            None => IndicatorSnapshot::new(close, rsi, f64::NAN, f64::NAN),
        }
    }
}

/// Snapshots for a whole bar series.
pub fn snapshots(config: &StrategyConfig, bars: &[Bar]) -> Vec<IndicatorSnapshot> {
    let mut feed = IndicatorFeed::from_config(config);
    bars.iter().map(|b| feed.push(b.close)).collect()
}
