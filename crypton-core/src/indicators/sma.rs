//! Simple Moving Average of closes. Lookback: period - 1.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        rolling_mean(&closes, self.period)
    }
}

/// Mean of each trailing `period`-wide window. Any NaN inside a window makes
/// that output NaN; the running sum is rebuilt once the NaN leaves the window.
pub(crate) fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let mut sum = 0.0;
    let mut nans = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            nans += 1;
        } else {
            sum += v;
        }
        if i >= period {
            let leaving = values[i - period];
            if leaving.is_nan() {
                nans -= 1;
                if nans == 0 {
                    // Drop accumulated float drift after a NaN stretch.
                    sum = values[i + 1 - period..=i].iter().sum();
                }
            } else {
                sum -= leaving;
            }
        }
        if i + 1 >= period && nans == 0 {
            out[i] = sum / period as f64;
        }
    }
    out
}
