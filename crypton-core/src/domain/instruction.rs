//! Instructions emitted by the engine for the execution layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::InstructionId;
use super::position::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Enter,
    Exit,
}

/// How much to trade.
///
/// Entries are sized against account equity, which only the execution layer
/// knows. Exits always carry an exact quantity taken from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSize {
    Quantity(f64),
    EquityPct(f64),
}

impl OrderSize {
    pub fn quantity(&self) -> Option<f64> {
        match self {
            OrderSize::Quantity(q) => Some(*q),
            OrderSize::EquityPct(_) => None,
        }
    }
}

/// Why an instruction was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstructionReason {
    Signal,
    TakeProfit { rung: usize },
    StopLoss,
}

impl fmt::Display for InstructionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstructionReason::Signal => write!(f, "signal"),
            InstructionReason::TakeProfit { rung } => write!(f, "take_profit[{rung}]"),
            InstructionReason::StopLoss => write!(f, "stop_loss"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: InstructionId,
    pub action: Action,
    pub symbol: String,
    pub side: OrderSide,
    /// Direction of the position this instruction opens or reduces.
    pub direction: Direction,
    pub size: OrderSize,
    pub reason: InstructionReason,
    /// Price that triggered the instruction. Market orders may fill elsewhere.
    pub reference_price: f64,
    pub timestamp: DateTime<Utc>,
}

impl Instruction {
    pub fn is_entry(&self) -> bool {
        self.action == Action::Enter
    }

    pub fn is_stop_loss(&self) -> bool {
        self.reason == InstructionReason::StopLoss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_display() {
        assert_eq!(InstructionReason::TakeProfit { rung: 2 }.to_string(), "take_profit[2]");
        assert_eq!(InstructionReason::StopLoss.to_string(), "stop_loss");
    }

    #[test]
    fn reason_serializes_tagged() {
        let json = serde_json::to_string(&InstructionReason::TakeProfit { rung: 1 }).unwrap();
        assert_eq!(json, r#"{"kind":"take_profit","rung":1}"#);
    }

    #[test]
    fn equity_pct_has_no_quantity() {
        assert_eq!(OrderSize::EquityPct(0.3).quantity(), None);
        assert_eq!(OrderSize::Quantity(4.0).quantity(), Some(4.0));
    }
}
