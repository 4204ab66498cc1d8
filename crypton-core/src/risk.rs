//! Risk gate: process-wide limits checked before every entry.
//!
//! [`RiskState`] is plain data with the gate logic; [`RiskGate`] wraps it in a
//! mutex so the position-count and daily-cap checks stay atomic relative to
//! fills arriving for other symbols. One gate may be shared by several
//! engines.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::Symbol;

/// When the daily realized-PnL accumulator resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DailyReset {
    /// Calendar day boundary in UTC.
    #[default]
    UtcMidnight,
    /// 24 hours after the first update of the current period.
    Rolling24h,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskLimits {
    pub max_open_positions: usize,
    pub daily_loss_cap_pct: f64,
    pub cooldown: Duration,
    pub pause_duration: Duration,
    pub daily_reset: DailyReset,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_open_positions: 3,
            daily_loss_cap_pct: 0.05,
            cooldown: Duration::hours(4),
            pause_duration: Duration::hours(24),
            daily_reset: DailyReset::UtcMidnight,
        }
    }
}

/// Why an entry was refused. Expected and non-fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskRejected {
    #[error("max open positions reached ({open}/{max})")]
    MaxPositions { open: usize, max: usize },

    #[error("entries paused until {until}")]
    Paused { until: DateTime<Utc> },

    #[error("{symbol} in cooldown until {until}")]
    Cooldown { symbol: Symbol, until: DateTime<Utc> },
}

/// Serializable view of the risk state for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub open_position_count: usize,
    pub daily_realized_pnl_pct: f64,
    pub daily_realized_loss_pct: f64,
    pub paused_until: Option<DateTime<Utc>>,
    pub last_trade_time_by_symbol: BTreeMap<Symbol, DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RiskState {
    limits: RiskLimits,
    /// Open positions plus entries in flight.
    open_position_count: usize,
    /// Net of gains and losses, for reporting.
    daily_realized_pnl_pct: f64,
    /// Losses only, never positive. The cap is checked against this.
    daily_realized_loss_pct: f64,
    period_start: Option<DateTime<Utc>>,
    paused_until: Option<DateTime<Utc>>,
    last_trade_time_by_symbol: HashMap<Symbol, DateTime<Utc>>,
}

impl RiskState {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            open_position_count: 0,
            daily_realized_pnl_pct: 0.0,
            daily_realized_loss_pct: 0.0,
            period_start: None,
            paused_until: None,
            last_trade_time_by_symbol: HashMap::new(),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn open_position_count(&self) -> usize {
        self.open_position_count
    }

    pub fn daily_realized_pnl_pct(&self) -> f64 {
        self.daily_realized_pnl_pct
    }

    pub fn daily_realized_loss_pct(&self) -> f64 {
        self.daily_realized_loss_pct
    }

    pub fn paused_until(&self) -> Option<DateTime<Utc>> {
        self.paused_until
    }

    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.paused_until.is_some_and(|until| now < until)
    }

    /// End of the symbol's cooldown window, if `now` is still inside it.
    /// A window that runs past the representable range never ends.
    pub fn cooldown_until(&self, symbol: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let last = self.last_trade_time_by_symbol.get(symbol)?;
        let until = last
            .checked_add_signed(self.limits.cooldown)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (now < until).then_some(until)
    }

    /// Gate check without side effects.
    pub fn check_entry(&self, symbol: &str, now: DateTime<Utc>) -> Result<(), RiskRejected> {
        if self.open_position_count >= self.limits.max_open_positions {
            return Err(RiskRejected::MaxPositions {
                open: self.open_position_count,
                max: self.limits.max_open_positions,
            });
        }
        if let Some(until) = self.paused_until.filter(|until| now < *until) {
            return Err(RiskRejected::Paused { until });
        }
        if let Some(until) = self.cooldown_until(symbol, now) {
            return Err(RiskRejected::Cooldown {
                symbol: symbol.to_string(),
                until,
            });
        }
        Ok(())
    }

    /// Check the gate and, if it passes, take a position slot and start the
    /// symbol's cooldown.
    pub fn reserve_entry(&mut self, symbol: &str, now: DateTime<Utc>) -> Result<(), RiskRejected> {
        self.check_entry(symbol, now)?;
        self.open_position_count += 1;
        self.last_trade_time_by_symbol.insert(symbol.to_string(), now);
        Ok(())
    }

    /// Give back a slot: the entry failed or the position closed.
    pub fn release_slot(&mut self) {
        self.open_position_count = self.open_position_count.saturating_sub(1);
    }

    /// Record the realized result of an exit fill, in position-return units.
    ///
    /// Gains count toward the net figure but never offset the loss total.
    /// Returns true if this fill pushed the period loss past the cap and
    /// started a pause.
    pub fn record_realized(&mut self, pnl_pct: f64, now: DateTime<Utc>) -> bool {
        self.roll_period(now);
        self.daily_realized_pnl_pct += pnl_pct;
        self.daily_realized_loss_pct += pnl_pct.min(0.0);
        if self.daily_realized_loss_pct < -self.limits.daily_loss_cap_pct && !self.is_paused(now) {
            self.paused_until = Some(
                now.checked_add_signed(self.limits.pause_duration)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            );
            return true;
        }
        false
    }

    /// Reset the daily accumulator if a period boundary has passed and clear
    /// an expired pause. Returns true if the period rolled over.
    pub fn roll_period(&mut self, now: DateTime<Utc>) -> bool {
        if self.paused_until.is_some_and(|until| now >= until) {
            self.paused_until = None;
        }
        let Some(start) = self.period_start else {
            self.period_start = Some(period_anchor(self.limits.daily_reset, now));
            return false;
        };
        let rolled = match self.limits.daily_reset {
            DailyReset::UtcMidnight => day_of(now) > day_of(start),
            DailyReset::Rolling24h => now >= start + Duration::hours(24),
        };
        if rolled {
            self.daily_realized_pnl_pct = 0.0;
            self.daily_realized_loss_pct = 0.0;
            self.period_start = Some(period_anchor(self.limits.daily_reset, now));
        }
        rolled
    }

    pub fn snapshot(&self) -> RiskSnapshot {
        RiskSnapshot {
            open_position_count: self.open_position_count,
            daily_realized_pnl_pct: self.daily_realized_pnl_pct,
            daily_realized_loss_pct: self.daily_realized_loss_pct,
            paused_until: self.paused_until,
            last_trade_time_by_symbol: self
                .last_trade_time_by_symbol
                .iter()
                .map(|(symbol, at)| (symbol.clone(), *at))
                .collect(),
        }
    }
}

fn day_of(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

fn period_anchor(reset: DailyReset, now: DateTime<Utc>) -> DateTime<Utc> {
    match reset {
        DailyReset::UtcMidnight => now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(now, |midnight| midnight.and_utc()),
        DailyReset::Rolling24h => now,
    }
}

/// Shared, internally synchronized risk state.
#[derive(Debug)]
pub struct RiskGate {
    state: Mutex<RiskState>,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            state: Mutex::new(RiskState::new(limits)),
        }
    }

    pub fn cooldown_until(&self, symbol: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.state.lock().cooldown_until(symbol, now)
    }

    pub fn try_reserve_entry(&self, symbol: &str, now: DateTime<Utc>) -> Result<(), RiskRejected> {
        self.state.lock().reserve_entry(symbol, now)
    }

    pub fn release_slot(&self) {
        self.state.lock().release_slot();
    }

    pub fn record_realized(&self, symbol: &str, pnl_pct: f64, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        if state.record_realized(pnl_pct, now) {
            warn!(
                symbol = %symbol,
                daily_realized_loss_pct = state.daily_realized_loss_pct(),
                daily_realized_pnl_pct = state.daily_realized_pnl_pct(),
                cap = state.limits().daily_loss_cap_pct,
                paused_until = ?state.paused_until(),
                "daily loss cap hit, pausing new entries"
            );
        }
    }

    pub fn roll_period(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        let was_paused = state.paused_until().is_some();
        let rolled = state.roll_period(now);
        if was_paused && state.paused_until().is_none() {
            info!(at = %now, "entry pause expired");
        }
        if rolled {
            info!(at = %now, "daily realized pnl reset");
        }
    }

    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.state.lock().is_paused(now)
    }

    pub fn snapshot(&self) -> RiskSnapshot {
        self.state.lock().snapshot()
    }
}
