use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine-assigned instruction ID, unique and increasing within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstructionId(pub u64);

impl From<u64> for InstructionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ix-{}", self.0)
    }
}
