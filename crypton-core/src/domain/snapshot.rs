use serde::{Deserialize, Serialize};

/// Per-tick view of price and the indicators the signal rule reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub price: f64,
    pub rsi: f64,
    pub bb_upper: f64,
    pub bb_lower: f64,
}

impl IndicatorSnapshot {
    pub fn new(price: f64, rsi: f64, bb_upper: f64, bb_lower: f64) -> Self {
        Self {
            price,
            rsi,
            bb_upper,
            bb_lower,
        }
    }

    /// A snapshot carrying only a price. Indicator fields are NaN, so no
    /// signal fires; open positions are still managed.
    pub fn price_only(price: f64) -> Self {
        Self::new(price, f64::NAN, f64::NAN, f64::NAN)
    }

    /// True when every indicator field is finite (warmup is over).
    pub fn indicators_ready(&self) -> bool {
        self.rsi.is_finite() && self.bb_upper.is_finite() && self.bb_lower.is_finite()
    }

    pub fn has_valid_price(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_only_is_not_ready() {
        let snap = IndicatorSnapshot::price_only(100.0);
        assert!(snap.has_valid_price());
        assert!(!snap.indicators_ready());
    }

    #[test]
    fn rejects_non_positive_price() {
        assert!(!IndicatorSnapshot::new(0.0, 50.0, 1.0, 1.0).has_valid_price());
        assert!(!IndicatorSnapshot::new(f64::NAN, 50.0, 1.0, 1.0).has_valid_price());
    }
}
