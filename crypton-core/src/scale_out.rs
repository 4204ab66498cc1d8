//! Scale-out controller: stop-loss override and the take-profit ladder.
//!
//! Per price update on an open position:
//! 1. stop-loss first: a move at or below `-stop_loss_pct` closes the whole
//!    remaining quantity, whatever the ladder progress;
//! 2. otherwise every rung whose level the move has reached fires, in
//!    ascending order, one exit per rung. Non-final rungs sell
//!    `quantity_opened * chunk_pct`, clamped to what is left; the final rung
//!    sells the exact remainder.
//!
//! Quantities are drawn from the position's unreserved remainder and reserved
//! as they are emitted, so pending exits are never sold twice.

use serde::{Deserialize, Serialize};

use crate::domain::{Position, PCT_EPSILON, QTY_EPSILON};

/// One take-profit exit produced by a rung.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RungExit {
    pub rung: usize,
    pub quantity: f64,
    pub level_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExitDecision {
    Hold,
    /// Close everything that remains.
    StopLoss { quantity: f64, change_pct: f64 },
    TakeProfit(Vec<RungExit>),
}

impl ExitDecision {
    pub fn is_hold(&self) -> bool {
        matches!(self, ExitDecision::Hold)
    }
}

/// Stateless: all progress lives on the [`Position`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleOutController;

impl ScaleOutController {
    pub fn new() -> Self {
        Self
    }

    /// Decide exits for `position` at `price`.
    ///
    /// Take-profit exits advance `tp_step` and reserve their quantity on the
    /// position. A stop-loss decision leaves the position untouched; the
    /// caller removes it from the ledger.
    pub fn evaluate(&self, position: &mut Position, price: f64) -> ExitDecision {
        if position.is_closed() {
            return ExitDecision::Hold;
        }
        let change_pct = position.change_pct(price);

        if change_pct <= -position.stop_loss_pct + PCT_EPSILON {
            return ExitDecision::StopLoss {
                quantity: position.quantity_remaining,
                change_pct,
            };
        }

        let mut exits = Vec::new();
        let len = position.ladder_len();
        while position.tp_step < len
            && change_pct + PCT_EPSILON >= position.take_profit_ladder[position.tp_step].level_pct
        {
            let rung = position.tp_step;
            let step = position.take_profit_ladder[rung];
            let available = position.unreserved();
            let quantity = if rung + 1 == len {
                available
            } else {
                (position.quantity_opened * step.chunk_pct).min(available)
            };
            position.tp_step += 1;

            if quantity > QTY_EPSILON {
                position.quantity_reserved += quantity;
                exits.push(RungExit {
                    rung,
                    quantity,
                    level_pct: step.level_pct,
                });
            }
        }

        // An exhausted ladder with quantity handed back by a failed exit:
        // the final rung sweeps it while price holds above that rung.
        if exits.is_empty() && position.ladder_exhausted() && len > 0 {
            let last = position.take_profit_ladder[len - 1];
            let available = position.unreserved();
            if available > QTY_EPSILON && change_pct + PCT_EPSILON >= last.level_pct {
                position.quantity_reserved += available;
                exits.push(RungExit {
                    rung: len - 1,
                    quantity: available,
                    level_pct: last.level_pct,
                });
            }
        }

        if exits.is_empty() {
            ExitDecision::Hold
        } else {
            ExitDecision::TakeProfit(exits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, LadderRung};
    use chrono::TimeZone;

    fn position(direction: Direction, rungs: &[(f64, f64)]) -> Position {
        let entry = 64_700.0;
        let sign = direction.sign();
        Position {
            symbol: "BTC/USDT".into(),
            direction,
            entry_price: entry,
            quantity_opened: 1000.0,
            quantity_remaining: 1000.0,
            quantity_reserved: 0.0,
            tp_step: 0,
            opened_at: chrono::Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            stop_loss_pct: 0.02,
            stop_loss_price: entry * (1.0 - sign * 0.02),
            take_profit_ladder: rungs
                .iter()
                .map(|&(level_pct, chunk_pct)| LadderRung {
                    level_pct,
                    chunk_pct,
                    trigger_price: entry * (1.0 + sign * level_pct),
                })
                .collect(),
        }
    }

    fn ladder() -> Vec<(f64, f64)> {
        vec![(0.02, 0.3), (0.04, 0.3), (0.06, 0.4)]
    }

    /// Simulate the fill the engine would apply.
    fn fill(pos: &mut Position, exits: &[RungExit]) {
        for e in exits {
            pos.quantity_remaining -= e.quantity;
            pos.quantity_reserved -= e.quantity;
        }
    }

    fn take_profit(decision: ExitDecision) -> Vec<RungExit> {
        match decision {
            ExitDecision::TakeProfit(exits) => exits,
            other => panic!("expected take-profit, got {other:?}"),
        }
    }

    #[test]
    fn hold_between_stop_and_first_rung() {
        let mut pos = position(Direction::Long, &ladder());
        assert!(ScaleOutController::new().evaluate(&mut pos, 65_000.0).is_hold());
        assert_eq!(pos.tp_step, 0);
    }

    #[test]
    fn ladder_walks_one_rung_per_level() {
        let ctl = ScaleOutController::new();
        let mut pos = position(Direction::Long, &ladder());

        let exits = take_profit(ctl.evaluate(&mut pos, 66_000.0));
        assert_eq!(exits.len(), 1);
        assert!((exits[0].quantity - 300.0).abs() < 1e-9);
        assert_eq!(pos.tp_step, 1);
        fill(&mut pos, &exits);

        let exits = take_profit(ctl.evaluate(&mut pos, 67_300.0));
        assert!((exits[0].quantity - 300.0).abs() < 1e-9);
        assert_eq!(pos.tp_step, 2);
        fill(&mut pos, &exits);

        let exits = take_profit(ctl.evaluate(&mut pos, 68_600.0));
        assert_eq!(exits[0].quantity, pos.quantity_remaining);
        assert_eq!(pos.tp_step, 3);
        fill(&mut pos, &exits);
        assert!(pos.is_closed());
    }

    #[test]
    fn gap_fires_several_rungs_in_order() {
        let mut pos = position(Direction::Long, &ladder());
        let exits = take_profit(ScaleOutController::new().evaluate(&mut pos, 70_000.0));
        let rungs: Vec<usize> = exits.iter().map(|e| e.rung).collect();
        assert_eq!(rungs, vec![0, 1, 2]);
        let total: f64 = exits.iter().map(|e| e.quantity).sum();
        assert_eq!(total, 1000.0);
        assert_eq!(pos.tp_step, 3);
    }

    #[test]
    fn final_rung_absorbs_remainder_with_uneven_chunks() {
        let mut pos = position(Direction::Long, &[(0.02, 0.33), (0.04, 0.33), (0.06, 0.33)]);
        let exits = take_profit(ScaleOutController::new().evaluate(&mut pos, 70_000.0));
        assert!((exits[2].quantity - 340.0).abs() < 1e-9);
        let total: f64 = exits.iter().map(|e| e.quantity).sum();
        assert_eq!(total, 1000.0);
    }

    #[test]
    fn stop_loss_at_step_zero_closes_everything() {
        let mut pos = position(Direction::Long, &ladder());
        match ScaleOutController::new().evaluate(&mut pos, 63_400.0) {
            ExitDecision::StopLoss { quantity, .. } => assert_eq!(quantity, 1000.0),
            other => panic!("expected stop-loss, got {other:?}"),
        }
        assert_eq!(pos.tp_step, 0);
    }

    #[test]
    fn stop_loss_after_partial_ladder_closes_remainder() {
        let ctl = ScaleOutController::new();
        let mut pos = position(Direction::Long, &ladder());
        let exits = take_profit(ctl.evaluate(&mut pos, 67_300.0));
        fill(&mut pos, &exits);
        assert_eq!(pos.tp_step, 2);

        match ctl.evaluate(&mut pos, 63_000.0) {
            ExitDecision::StopLoss { quantity, .. } => assert!((quantity - 400.0).abs() < 1e-9),
            other => panic!("expected stop-loss, got {other:?}"),
        }
    }

    #[test]
    fn stop_loss_includes_reserved_quantity() {
        let ctl = ScaleOutController::new();
        let mut pos = position(Direction::Long, &ladder());
        take_profit(ctl.evaluate(&mut pos, 66_000.0));
        // rung 0 still pending when price collapses
        match ctl.evaluate(&mut pos, 63_000.0) {
            ExitDecision::StopLoss { quantity, .. } => assert_eq!(quantity, 1000.0),
            other => panic!("expected stop-loss, got {other:?}"),
        }
    }

    #[test]
    fn short_position_mirrors_ladder_and_stop() {
        let ctl = ScaleOutController::new();
        let mut pos = position(Direction::Short, &ladder());
        let exits = take_profit(ctl.evaluate(&mut pos, 63_400.0));
        assert_eq!(exits[0].rung, 0);

        let mut pos = position(Direction::Short, &ladder());
        assert!(matches!(
            ctl.evaluate(&mut pos, 66_000.0),
            ExitDecision::StopLoss { .. }
        ));
    }

    #[test]
    fn pending_exit_is_not_sold_twice() {
        let ctl = ScaleOutController::new();
        let mut pos = position(Direction::Long, &ladder());
        take_profit(ctl.evaluate(&mut pos, 66_000.0));
        // rung 0 unfilled; the same price does not re-fire it
        assert!(ctl.evaluate(&mut pos, 66_000.0).is_hold());
    }

    #[test]
    fn released_remainder_is_swept_after_exhaustion() {
        let ctl = ScaleOutController::new();
        let mut pos = position(Direction::Long, &ladder());
        let exits = take_profit(ctl.evaluate(&mut pos, 70_000.0));
        fill(&mut pos, &exits[..2]);
        // final rung order failed: reservation handed back
        pos.quantity_reserved = 0.0;

        let exits = take_profit(ctl.evaluate(&mut pos, 69_000.0));
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].rung, 2);
        assert!((exits[0].quantity - 400.0).abs() < 1e-9);
        assert!(pos.tp_step <= pos.ladder_len());
    }
}
