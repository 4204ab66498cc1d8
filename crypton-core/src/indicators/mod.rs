//! Indicators feeding the signal rule: SMA, Bollinger Bands, and RSI.
//!
//! Two ways in:
//! - batch: every indicator implements [`Indicator`] and maps a full bar
//!   series to a value series of the same length (NaN during warmup);
//! - streaming: [`IndicatorFeed`] consumes one close at a time and yields an
//!   [`IndicatorSnapshot`](crate::domain::IndicatorSnapshot) per tick, which is
//!   what a live trader and the bar-replay driver both use.
//!
//! Both paths agree value-for-value; `tests/indicator_test.rs` checks it.

pub mod bollinger;
pub mod feed;
pub mod rsi;
pub mod sma;

pub use bollinger::{Bands, Bollinger, BollingerBand};
pub use feed::{snapshots, IndicatorFeed};
pub use rsi::{Rsi, RsiState};
pub use sma::Sma;

use crate::domain::Bar;

/// Trait for batch indicators.
///
/// # Look-ahead guard
/// No value at bar t may depend on bar t+1 or later: computing on a truncated
/// series must reproduce the prefix of the full-series result.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "rsi_14").
    fn name(&self) -> &str;

    /// Number of bars before the first valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the whole series. Output length equals
    /// `bars.len()`; the first `lookback()` entries are `f64::NAN`.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Hourly synthetic bars from close prices, for tests.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::TimeZone;
    let start = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                symbol: "TEST".to_string(),
                timestamp: start + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1.0,
            }
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
