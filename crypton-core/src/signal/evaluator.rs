use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Signal, SignalSource};
use crate::domain::IndicatorSnapshot;
use crate::risk::RiskGate;

/// A signal source behind the per-symbol cooldown gate.
///
/// A symbol that entered within the cooldown window returns `Signal::None`
/// regardless of indicators. The window is tracked in the risk state and only
/// expires with time; closing the position does not clear it.
pub struct SignalEvaluator {
    source: Box<dyn SignalSource>,
}

impl SignalEvaluator {
    pub fn new(source: Box<dyn SignalSource>) -> Self {
        Self { source }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn evaluate(
        &self,
        symbol: &str,
        snapshot: &IndicatorSnapshot,
        at: DateTime<Utc>,
        risk: &RiskGate,
    ) -> Signal {
        if let Some(until) = risk.cooldown_until(symbol, at) {
            debug!(symbol = %symbol, until = %until, "cooldown active, skipping signal");
            return Signal::None;
        }
        self.source.evaluate(symbol, snapshot, at)
    }
}

impl std::fmt::Debug for SignalEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalEvaluator")
            .field("source", &self.source.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskLimits;
    use crate::signal::MeanReversion;
    use chrono::TimeZone;

    #[test]
    fn cooldown_suppresses_qualifying_signal() {
        let evaluator = SignalEvaluator::new(Box::new(MeanReversion::default()));
        let risk = RiskGate::new(RiskLimits::default());
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let oversold = IndicatorSnapshot::new(94.0, 20.0, 110.0, 95.0);

        assert_eq!(evaluator.evaluate("BTC/USDT", &oversold, t0, &risk), Signal::EnterLong);
        risk.try_reserve_entry("BTC/USDT", t0).unwrap();
        risk.release_slot();

        let t1 = t0 + chrono::Duration::hours(3);
        assert_eq!(evaluator.evaluate("BTC/USDT", &oversold, t1, &risk), Signal::None);
        assert_eq!(evaluator.evaluate("ETH/USDT", &oversold, t1, &risk), Signal::EnterLong);

        let t2 = t0 + chrono::Duration::hours(4);
        assert_eq!(evaluator.evaluate("BTC/USDT", &oversold, t2, &risk), Signal::EnterLong);
    }
}
