//! Position ledger: at most one open position per symbol.
//!
//! The ledger is the single source of truth for open exposure. It prices the
//! stop-loss and the take-profit ladder at open and enforces quantity
//! conservation on every fill: what leaves the position across all exits adds
//! up to exactly what was opened.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::ExitPlan;
use crate::domain::{Direction, LadderRung, Position, Symbol, QTY_EPSILON};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("position already open for {symbol}")]
    AlreadyOpen { symbol: Symbol },

    #[error("no open position for {symbol}")]
    NoOpenPosition { symbol: Symbol },

    #[error("fill of {requested} exceeds remaining {remaining} for {symbol}")]
    Overfill {
        symbol: Symbol,
        requested: f64,
        remaining: f64,
    },

    #[error("invalid {what} {value} for {symbol}")]
    InvalidAmount {
        symbol: Symbol,
        what: &'static str,
        value: f64,
    },
}

/// Result of applying an exit fill.
#[derive(Debug, Clone, PartialEq)]
pub enum FillApplied {
    /// Quantity remains; the updated position is still in the ledger.
    Reduced(Position),
    /// Remaining reached zero; the position was removed.
    Closed(Position),
}

impl FillApplied {
    pub fn position(&self) -> &Position {
        match self {
            FillApplied::Reduced(p) | FillApplied::Closed(p) => p,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, FillApplied::Closed(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    positions: HashMap<Symbol, Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a position, pricing its stop-loss and ladder from `entry_price`.
    pub fn open(
        &mut self,
        symbol: &str,
        direction: Direction,
        entry_price: f64,
        quantity: f64,
        opened_at: DateTime<Utc>,
        plan: &ExitPlan,
    ) -> Result<Position, LedgerError> {
        if self.positions.contains_key(symbol) {
            return Err(LedgerError::AlreadyOpen {
                symbol: symbol.to_string(),
            });
        }
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return Err(LedgerError::InvalidAmount {
                symbol: symbol.to_string(),
                what: "entry price",
                value: entry_price,
            });
        }
        if !(quantity.is_finite() && quantity > QTY_EPSILON) {
            return Err(LedgerError::InvalidAmount {
                symbol: symbol.to_string(),
                what: "quantity",
                value: quantity,
            });
        }

        let sign = direction.sign();
        let take_profit_ladder = plan
            .rungs
            .iter()
            .map(|&(level_pct, chunk_pct)| LadderRung {
                level_pct,
                chunk_pct,
                trigger_price: entry_price * (1.0 + sign * level_pct),
            })
            .collect();

        let position = Position {
            symbol: symbol.to_string(),
            direction,
            entry_price,
            quantity_opened: quantity,
            quantity_remaining: quantity,
            quantity_reserved: 0.0,
            tp_step: 0,
            opened_at,
            stop_loss_pct: plan.stop_loss_pct,
            stop_loss_price: entry_price * (1.0 - sign * plan.stop_loss_pct),
            take_profit_ladder,
        };
        self.positions.insert(symbol.to_string(), position.clone());
        Ok(position)
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub(crate) fn get_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.get_mut(symbol)
    }

    /// Reduce a position by an exit fill.
    ///
    /// A fill that overshoots the remainder by no more than [`QTY_EPSILON`]
    /// is treated as closing it exactly.
    pub fn apply_fill(&mut self, symbol: &str, quantity_sold: f64) -> Result<FillApplied, LedgerError> {
        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| LedgerError::NoOpenPosition {
                symbol: symbol.to_string(),
            })?;
        if !(quantity_sold.is_finite() && quantity_sold > 0.0) {
            return Err(LedgerError::InvalidAmount {
                symbol: symbol.to_string(),
                what: "fill quantity",
                value: quantity_sold,
            });
        }
        if quantity_sold > position.quantity_remaining + QTY_EPSILON {
            return Err(LedgerError::Overfill {
                symbol: symbol.to_string(),
                requested: quantity_sold,
                remaining: position.quantity_remaining,
            });
        }

        position.quantity_remaining -= quantity_sold;
        position.quantity_reserved = (position.quantity_reserved - quantity_sold).max(0.0);

        if position.quantity_remaining <= QTY_EPSILON {
            let mut closed = self
                .positions
                .remove(symbol)
                .ok_or_else(|| LedgerError::NoOpenPosition {
                    symbol: symbol.to_string(),
                })?;
            closed.quantity_remaining = 0.0;
            closed.quantity_reserved = 0.0;
            Ok(FillApplied::Closed(closed))
        } else {
            Ok(FillApplied::Reduced(position.clone()))
        }
    }

    /// Remove the position outright and return the quantity it still held.
    pub fn close_all(&mut self, symbol: &str) -> Result<f64, LedgerError> {
        self.positions
            .remove(symbol)
            .map(|p| p.quantity_remaining)
            .ok_or_else(|| LedgerError::NoOpenPosition {
                symbol: symbol.to_string(),
            })
    }

    /// Commit `quantity` to a pending exit so later rungs cannot overdraw it.
    pub fn reserve(&mut self, symbol: &str, quantity: f64) -> Result<(), LedgerError> {
        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| LedgerError::NoOpenPosition {
                symbol: symbol.to_string(),
            })?;
        if quantity > position.unreserved() + QTY_EPSILON {
            return Err(LedgerError::Overfill {
                symbol: symbol.to_string(),
                requested: quantity,
                remaining: position.unreserved(),
            });
        }
        position.quantity_reserved = (position.quantity_reserved + quantity).min(position.quantity_remaining);
        Ok(())
    }

    /// Hand back a reservation whose exit order did not fill.
    pub fn release(&mut self, symbol: &str, quantity: f64) -> Result<(), LedgerError> {
        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| LedgerError::NoOpenPosition {
                symbol: symbol.to_string(),
            })?;
        position.quantity_reserved = (position.quantity_reserved - quantity).max(0.0);
        Ok(())
    }

    /// Put back a position removed by [`close_all`](Self::close_all) whose
    /// exit order failed.
    pub fn restore(&mut self, position: Position) -> Result<(), LedgerError> {
        if self.positions.contains_key(&position.symbol) {
            return Err(LedgerError::AlreadyOpen {
                symbol: position.symbol,
            });
        }
        self.positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Open positions sorted by symbol.
    pub fn positions(&self) -> Vec<&Position> {
        let mut all: Vec<&Position> = self.positions.values().collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan() -> ExitPlan {
        ExitPlan {
            stop_loss_pct: 0.02,
            rungs: vec![(0.02, 0.3), (0.04, 0.3), (0.06, 0.4)],
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn ledger_with_btc() -> PositionLedger {
        let mut ledger = PositionLedger::new();
        ledger
            .open("BTC/USDT", Direction::Long, 64_700.0, 1000.0, t0(), &plan())
            .unwrap();
        ledger
    }

    #[test]
    fn open_prices_stop_and_ladder() {
        let ledger = ledger_with_btc();
        let pos = ledger.get("BTC/USDT").unwrap();
        assert_eq!(pos.tp_step, 0);
        assert_eq!(pos.quantity_remaining, 1000.0);
        assert!((pos.stop_loss_price - 63_406.0).abs() < 1e-6);
        assert!((pos.take_profit_ladder[0].trigger_price - 65_994.0).abs() < 1e-6);
        assert!((pos.take_profit_ladder[2].trigger_price - 68_582.0).abs() < 1e-6);
    }

    #[test]
    fn open_short_mirrors_prices() {
        let mut ledger = PositionLedger::new();
        let pos = ledger
            .open("ETH/USDT", Direction::Short, 100.0, 5.0, t0(), &plan())
            .unwrap();
        assert!((pos.stop_loss_price - 102.0).abs() < 1e-9);
        assert!((pos.take_profit_ladder[0].trigger_price - 98.0).abs() < 1e-9);
    }

    #[test]
    fn second_open_is_rejected() {
        let mut ledger = ledger_with_btc();
        let err = ledger
            .open("BTC/USDT", Direction::Short, 65_000.0, 1.0, t0(), &plan())
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::AlreadyOpen {
                symbol: "BTC/USDT".into()
            }
        );
        assert_eq!(ledger.get("BTC/USDT").unwrap().direction, Direction::Long);
    }

    #[test]
    fn open_rejects_zero_quantity() {
        let mut ledger = PositionLedger::new();
        let err = ledger
            .open("BTC/USDT", Direction::Long, 64_700.0, 0.0, t0(), &plan())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { what: "quantity", .. }));
    }

    #[test]
    fn apply_fill_reduces_then_closes() {
        let mut ledger = ledger_with_btc();
        let applied = ledger.apply_fill("BTC/USDT", 300.0).unwrap();
        assert_eq!(applied.position().quantity_remaining, 700.0);
        assert!(!applied.is_closed());

        let applied = ledger.apply_fill("BTC/USDT", 700.0).unwrap();
        assert!(applied.is_closed());
        assert_eq!(applied.position().quantity_remaining, 0.0);
        assert!(ledger.get("BTC/USDT").is_none());
    }

    #[test]
    fn apply_fill_tolerates_rounding_dust() {
        let mut ledger = ledger_with_btc();
        let applied = ledger.apply_fill("BTC/USDT", 1000.0 + 1e-10).unwrap();
        assert!(applied.is_closed());
    }

    #[test]
    fn overfill_is_rejected_and_leaves_position() {
        let mut ledger = ledger_with_btc();
        let err = ledger.apply_fill("BTC/USDT", 1000.5).unwrap_err();
        assert!(matches!(err, LedgerError::Overfill { .. }));
        assert_eq!(ledger.get("BTC/USDT").unwrap().quantity_remaining, 1000.0);
    }

    #[test]
    fn fill_when_flat_is_desync() {
        let mut ledger = PositionLedger::new();
        assert_eq!(
            ledger.apply_fill("SOL/USDT", 1.0).unwrap_err(),
            LedgerError::NoOpenPosition {
                symbol: "SOL/USDT".into()
            }
        );
    }

    #[test]
    fn close_all_returns_full_remaining() {
        let mut ledger = ledger_with_btc();
        ledger.apply_fill("BTC/USDT", 300.0).unwrap();
        assert_eq!(ledger.close_all("BTC/USDT").unwrap(), 700.0);
        assert!(ledger.is_empty());
        assert!(ledger.close_all("BTC/USDT").is_err());
    }

    #[test]
    fn reserve_release_and_fill() {
        let mut ledger = ledger_with_btc();
        ledger.reserve("BTC/USDT", 300.0).unwrap();
        assert_eq!(ledger.get("BTC/USDT").unwrap().unreserved(), 700.0);
        assert!(ledger.reserve("BTC/USDT", 800.0).is_err());

        ledger.release("BTC/USDT", 300.0).unwrap();
        assert_eq!(ledger.get("BTC/USDT").unwrap().quantity_reserved, 0.0);

        ledger.reserve("BTC/USDT", 300.0).unwrap();
        ledger.apply_fill("BTC/USDT", 300.0).unwrap();
        let pos = ledger.get("BTC/USDT").unwrap();
        assert_eq!(pos.quantity_reserved, 0.0);
        assert_eq!(pos.quantity_remaining, 700.0);
    }

    #[test]
    fn restore_after_close_all() {
        let mut ledger = ledger_with_btc();
        let snapshot = ledger.get("BTC/USDT").unwrap().clone();
        ledger.close_all("BTC/USDT").unwrap();
        ledger.restore(snapshot.clone()).unwrap();
        assert_eq!(ledger.get("BTC/USDT"), Some(&snapshot));
        assert!(ledger.restore(snapshot).is_err());
    }

    #[test]
    fn positions_sorted() {
        let mut ledger = ledger_with_btc();
        ledger
            .open("ADA/USDT", Direction::Long, 0.5, 100.0, t0(), &plan())
            .unwrap();
        let symbols: Vec<&str> = ledger.positions().iter().map(|p| p.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["ADA/USDT", "BTC/USDT"]);
    }
}
