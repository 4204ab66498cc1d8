use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::InstructionId;

/// Execution report for a submitted instruction.
///
/// `quantity` is always the resolved base-asset amount, even when the
/// instruction was sized as a share of equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillReport {
    pub instruction_id: InstructionId,
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
    pub filled_at: DateTime<Utc>,
}

impl FillReport {
    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }
}
