//! Paper execution: fills every order at the last marked price.
//!
//! Tracks quote cash and signed base holdings per symbol. Entries sized as a
//! share of equity are resolved here, since only this layer knows the
//! account value.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crypton_core::domain::{FillReport, Instruction, OrderSide, OrderSize, Symbol};
use crypton_core::execution::{ExecutionAdapter, ExecutionError};

#[derive(Debug, Clone, Copy)]
struct Mark {
    price: f64,
    at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PaperExecution {
    cash: f64,
    commission_pct: f64,
    holdings: HashMap<Symbol, f64>,
    marks: HashMap<Symbol, Mark>,
    commissions_paid: f64,
}

impl PaperExecution {
    pub fn new(initial_capital: f64, commission_pct: f64) -> Self {
        Self {
            cash: initial_capital,
            commission_pct,
            holdings: HashMap::new(),
            marks: HashMap::new(),
            commissions_paid: 0.0,
        }
    }

    /// Record the latest traded price for `symbol`.
    pub fn mark(&mut self, symbol: &str, price: f64, at: DateTime<Utc>) {
        self.marks.insert(symbol.to_string(), Mark { price, at });
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Signed base quantity held (negative when short).
    pub fn holding(&self, symbol: &str) -> f64 {
        self.holdings.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn commissions_paid(&self) -> f64 {
        self.commissions_paid
    }

    /// Cash plus holdings valued at their last marks.
    pub fn equity(&self) -> f64 {
        self.cash
            + self
                .holdings
                .iter()
                .map(|(symbol, qty)| qty * self.marks.get(symbol).map_or(0.0, |m| m.price))
                .sum::<f64>()
    }

    fn resolve_quantity(&self, size: OrderSize, price: f64) -> f64 {
        match size {
            OrderSize::Quantity(q) => q,
            OrderSize::EquityPct(pct) => self.equity() * pct / (price * (1.0 + self.commission_pct)),
        }
    }
}

impl ExecutionAdapter for PaperExecution {
    fn submit_order(&mut self, instruction: &Instruction) -> Result<FillReport, ExecutionError> {
        let symbol = &instruction.symbol;
        let mark = *self.marks.get(symbol).ok_or_else(|| ExecutionError::NoPrice {
            symbol: symbol.clone(),
        })?;

        let quantity = self.resolve_quantity(instruction.size, mark.price);
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(ExecutionError::Rejected {
                symbol: symbol.clone(),
                reason: format!("order resolves to quantity {quantity}"),
            });
        }

        let notional = quantity * mark.price;
        let commission = notional * self.commission_pct;
        match instruction.side {
            OrderSide::Buy => {
                let required = notional + commission;
                if required > self.cash + 1e-9 {
                    return Err(ExecutionError::InsufficientFunds {
                        symbol: symbol.clone(),
                        required,
                        available: self.cash,
                    });
                }
                self.cash -= required;
                *self.holdings.entry(symbol.clone()).or_insert(0.0) += quantity;
            }
            OrderSide::Sell => {
                self.cash += notional - commission;
                *self.holdings.entry(symbol.clone()).or_insert(0.0) -= quantity;
            }
        }
        self.commissions_paid += commission;

        debug!(
            symbol = %symbol,
            id = %instruction.id,
            side = %instruction.side,
            quantity,
            price = mark.price,
            cash = self.cash,
            "paper fill"
        );
        Ok(FillReport {
            instruction_id: instruction.id,
            symbol: symbol.clone(),
            quantity,
            price: mark.price,
            commission,
            filled_at: mark.at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crypton_core::domain::{Action, Direction, InstructionId, InstructionReason};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn instruction(side: OrderSide, size: OrderSize) -> Instruction {
        Instruction {
            id: InstructionId(1),
            action: if side == OrderSide::Buy { Action::Enter } else { Action::Exit },
            symbol: "BTC/USDT".into(),
            side,
            direction: Direction::Long,
            size,
            reason: if side == OrderSide::Buy {
                InstructionReason::Signal
            } else {
                InstructionReason::StopLoss
            },
            reference_price: 100.0,
            timestamp: now(),
        }
    }

    #[test]
    fn equity_pct_entry_resolves_against_equity() {
        let mut paper = PaperExecution::new(10_000.0, 0.0);
        paper.mark("BTC/USDT", 100.0, now());
        let fill = paper
            .submit_order(&instruction(OrderSide::Buy, OrderSize::EquityPct(0.25)))
            .unwrap();
        assert!((fill.quantity - 25.0).abs() < 1e-9);
        assert!((paper.cash() - 7_500.0).abs() < 1e-9);
        assert!((paper.equity() - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn commission_charged_on_both_sides() {
        let mut paper = PaperExecution::new(10_000.0, 0.001);
        paper.mark("BTC/USDT", 100.0, now());
        let buy = paper
            .submit_order(&instruction(OrderSide::Buy, OrderSize::Quantity(10.0)))
            .unwrap();
        assert!((buy.commission - 1.0).abs() < 1e-9);
        let sell = paper
            .submit_order(&instruction(OrderSide::Sell, OrderSize::Quantity(10.0)))
            .unwrap();
        assert!((sell.commission - 1.0).abs() < 1e-9);
        assert!((paper.cash() - 9_998.0).abs() < 1e-9);
        assert_eq!(paper.holding("BTC/USDT"), 0.0);
        assert!((paper.commissions_paid() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn no_mark_fails() {
        let mut paper = PaperExecution::new(10_000.0, 0.0);
        let err = paper
            .submit_order(&instruction(OrderSide::Buy, OrderSize::Quantity(1.0)))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NoPrice { .. }));
    }

    #[test]
    fn insufficient_cash_fails_without_side_effects() {
        let mut paper = PaperExecution::new(100.0, 0.0);
        paper.mark("BTC/USDT", 100.0, now());
        let err = paper
            .submit_order(&instruction(OrderSide::Buy, OrderSize::Quantity(2.0)))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InsufficientFunds { .. }));
        assert_eq!(paper.cash(), 100.0);
        assert_eq!(paper.holding("BTC/USDT"), 0.0);
    }

    #[test]
    fn zero_quantity_rejected() {
        let mut paper = PaperExecution::new(100.0, 0.0);
        paper.mark("BTC/USDT", 100.0, now());
        assert!(matches!(
            paper.submit_order(&instruction(OrderSide::Sell, OrderSize::Quantity(0.0))),
            Err(ExecutionError::Rejected { .. })
        ));
    }
}
