//! Position — an open exposure on one symbol and its scale-out progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::instruction::OrderSide;

/// Quantities at or below this magnitude are treated as zero.
///
/// Exchange fills are reported with limited precision, so an exit for
/// "the rest" can come back a hair above or below what the ledger holds.
pub const QTY_EPSILON: f64 = 1e-9;

/// Slack applied when comparing a price move against a percentage threshold.
pub const PCT_EPSILON: f64 = 1e-12;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short. Multiplying a raw price change by the
    /// sign turns it into a favorable/adverse move.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Order side that opens a position in this direction.
    pub fn entry_side(self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces a position in this direction.
    pub fn exit_side(self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => f.pad("long"),
            Direction::Short => f.pad("short"),
        }
    }
}

/// One concrete rung of a take-profit ladder, priced at open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LadderRung {
    /// Favorable move (fraction of entry) that triggers the rung.
    pub level_pct: f64,
    /// Share of `quantity_opened` sold at this rung. The last rung ignores it
    /// and sells whatever remains.
    pub chunk_pct: f64,
    /// Price at which `level_pct` is reached.
    pub trigger_price: f64,
}

/// An open position. Absent from the ledger means flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity_opened: f64,
    pub quantity_remaining: f64,
    /// Quantity committed to exit instructions that have not been filled yet.
    pub quantity_reserved: f64,
    /// Next ladder rung to fire; equals the ladder length once exhausted.
    pub tp_step: usize,
    pub opened_at: DateTime<Utc>,
    pub stop_loss_pct: f64,
    pub stop_loss_price: f64,
    pub take_profit_ladder: Vec<LadderRung>,
}

impl Position {
    /// Signed fractional move from entry: positive is favorable.
    pub fn change_pct(&self, price: f64) -> f64 {
        (price - self.entry_price) / self.entry_price * self.direction.sign()
    }

    /// Remaining quantity not yet committed to a pending exit.
    pub fn unreserved(&self) -> f64 {
        (self.quantity_remaining - self.quantity_reserved).max(0.0)
    }

    pub fn ladder_len(&self) -> usize {
        self.take_profit_ladder.len()
    }

    pub fn ladder_exhausted(&self) -> bool {
        self.tp_step >= self.take_profit_ladder.len()
    }

    pub fn is_closed(&self) -> bool {
        self.quantity_remaining <= QTY_EPSILON
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity_remaining * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity_remaining * (price - self.entry_price) * self.direction.sign()
    }
}
