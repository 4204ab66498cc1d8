//! Crypton Core: rule-based entry/exit decisions for spot crypto symbols.
//!
//! This crate contains the decision engine:
//! - Domain types (bars, indicator snapshots, positions, instructions, fills)
//! - Indicators (SMA, Bollinger, Wilder RSI) and a streaming indicator feed
//! - Signal sources (Bollinger + RSI mean reversion, replayed signals)
//! - Position ledger with reserved-quantity tracking
//! - Scale-out controller (stop-loss override, take-profit ladder)
//! - Risk gate (max positions, daily loss cap, per-symbol cooldown)
//! - Execution adapter boundary and the [`Engine`] that drives it all

pub mod config;
pub mod domain;
pub mod engine;
pub mod execution;
pub mod indicators;
pub mod ledger;
pub mod risk;
pub mod scale_out;
pub mod signal;

pub use config::{ConfigError, StrategyConfig};
pub use engine::{Engine, EngineError, FillOutcome};
pub use execution::{ExecutionAdapter, ExecutionError};
