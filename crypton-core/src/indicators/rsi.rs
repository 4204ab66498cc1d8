//! Relative Strength Index with Wilder smoothing.
//!
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss). Lookback: period.
//! Edge cases: no movement → 50; avg_loss == 0 → 100; avg_gain == 0 → 0.
//! A NaN close after the seed invalidates the rest of the series.

use super::Indicator;
use crate::domain::Bar;

/// Incremental RSI over a stream of closes.
#[derive(Debug, Clone)]
pub struct RsiState {
    period: usize,
    prev_close: Option<f64>,
    seed_gain: f64,
    seed_loss: f64,
    seen_changes: usize,
    avg_gain: f64,
    avg_loss: f64,
    broken: bool,
}

impl RsiState {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            prev_close: None,
            seed_gain: 0.0,
            seed_loss: 0.0,
            seen_changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
            broken: false,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Feed the next close; returns the RSI once `period` changes are seen.
    pub fn update(&mut self, close: f64) -> Option<f64> {
        if self.broken {
            return None;
        }
        if close.is_nan() {
            self.broken = true;
            return None;
        }
        let Some(prev) = self.prev_close.replace(close) else {
            return None;
        };

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        self.seen_changes += 1;

        if self.seen_changes < self.period {
            self.seed_gain += gain;
            self.seed_loss += loss;
            return None;
        }
        if self.seen_changes == self.period {
            self.avg_gain = (self.seed_gain + gain) / self.period as f64;
            self.avg_loss = (self.seed_loss + loss) / self.period as f64;
        } else {
            let alpha = 1.0 / self.period as f64;
            self.avg_gain = alpha * gain + (1.0 - alpha) * self.avg_gain;
            self.avg_loss = alpha * loss + (1.0 - alpha) * self.avg_loss;
        }
        Some(rsi_value(self.avg_gain, self.avg_loss))
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut state = RsiState::new(self.period);
        bars.iter()
            .map(|b| state.update(b.close).unwrap_or(f64::NAN))
            .collect()
    }
}
