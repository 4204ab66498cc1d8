//! Domain types shared by every layer of the strategy core.

pub mod bar;
pub mod fill;
pub mod ids;
pub mod instruction;
pub mod position;
pub mod snapshot;

pub use bar::Bar;
pub use fill::FillReport;
pub use ids::InstructionId;
pub use instruction::{Action, Instruction, InstructionReason, OrderSide, OrderSize};
pub use position::{Direction, LadderRung, Position, PCT_EPSILON, QTY_EPSILON};
pub use snapshot::IndicatorSnapshot;

/// Symbol type alias (exchange pair token, e.g. "BTC/USDT").
pub type Symbol = String;
