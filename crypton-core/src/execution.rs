//! Execution adapter boundary.
//!
//! The core never talks to an exchange. It hands [`Instruction`]s to an
//! adapter and is told the outcome through
//! [`Engine::on_fill`](crate::engine::Engine::on_fill) or
//! [`Engine::on_failure`](crate::engine::Engine::on_failure). Order timeouts
//! and retries belong to the adapter.

use thiserror::Error;

use crate::domain::{FillReport, Instruction, Symbol};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("order rejected for {symbol}: {reason}")]
    Rejected { symbol: Symbol, reason: String },

    #[error("no market price for {symbol}")]
    NoPrice { symbol: Symbol },

    #[error("insufficient funds for {symbol}: need {required:.2}, have {available:.2}")]
    InsufficientFunds {
        symbol: Symbol,
        required: f64,
        available: f64,
    },

    #[error("order for {symbol} timed out")]
    Timeout { symbol: Symbol },
}

/// Something that turns instructions into fills.
pub trait ExecutionAdapter: Send {
    /// Submit one instruction. `Ok` carries the fill; `Err` means nothing
    /// was executed.
    fn submit_order(&mut self, instruction: &Instruction) -> Result<FillReport, ExecutionError>;
}

impl<T: ExecutionAdapter + ?Sized> ExecutionAdapter for Box<T> {
    fn submit_order(&mut self, instruction: &Instruction) -> Result<FillReport, ExecutionError> {
        (**self).submit_order(instruction)
    }
}
