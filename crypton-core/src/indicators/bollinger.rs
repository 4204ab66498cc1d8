//! Bollinger Bands: SMA(close, period) +/- multiplier * stddev(close, period).
//!
//! Population stddev (divide by N). Lookback: period - 1.

use serde::{Deserialize, Serialize};

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BollingerBand {
    Upper,
    Middle,
    Lower,
}

/// All three bands at one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl Bands {
    pub fn get(&self, band: BollingerBand) -> f64 {
        match band {
            BollingerBand::Upper => self.upper,
            BollingerBand::Middle => self.middle,
            BollingerBand::Lower => self.lower,
        }
    }
}

/// Bands over one full window. `None` if the window holds a NaN.
pub(crate) fn window_bands(window: &[f64], multiplier: f64) -> Option<Bands> {
    if window.is_empty() || window.iter().any(|v| v.is_nan()) {
        return None;
    }
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let width = multiplier * variance.sqrt();
    Some(Bands {
        upper: mean + width,
        middle: mean,
        lower: mean - width,
    })
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    band: BollingerBand,
    name: String,
}

impl Bollinger {
    pub fn new(period: usize, multiplier: f64, band: BollingerBand) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        let label = match band {
            BollingerBand::Upper => "upper",
            BollingerBand::Middle => "middle",
            BollingerBand::Lower => "lower",
        };
        Self {
            period,
            multiplier,
            band,
            name: format!("bollinger_{label}_{period}_{multiplier}"),
        }
    }

    pub fn upper(period: usize, multiplier: f64) -> Self {
        Self::new(period, multiplier, BollingerBand::Upper)
    }

    pub fn middle(period: usize, multiplier: f64) -> Self {
        Self::new(period, multiplier, BollingerBand::Middle)
    }

    pub fn lower(period: usize, multiplier: f64) -> Self {
        Self::new(period, multiplier, BollingerBand::Lower)
    }

    /// All three bands per bar; `None` during warmup or over a NaN window.
    pub fn bands(&self, bars: &[Bar]) -> Vec<Option<Bands>> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        (0..closes.len())
            .map(|i| {
                if i + 1 < self.period {
                    None
                } else {
                    window_bands(&closes[i + 1 - self.period..=i], self.multiplier)
                }
            })
            .collect()
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        self.bands(bars)
            .into_iter()
            .map(|b| b.map_or(f64::NAN, |b| b.get(self.band)))
            .collect()
    }
}
