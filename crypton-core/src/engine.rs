//! Engine: the strategy core's single entry point.
//!
//! Per price update:
//! - open position → scale-out controller (stop-loss, then ladder);
//! - flat symbol → signal evaluator → risk gate → entry instruction.
//!
//! Instructions go to an execution adapter; its outcome comes back through
//! [`Engine::on_fill`] / [`Engine::on_failure`], which is the only place the
//! ledger and risk state learn about executed quantities.
//!
//! # Concurrency
//! `Engine` is `Send + Sync`. All per-symbol state (ledger, sequencing,
//! in-flight entries and stop-loss closes) sits behind one mutex, so an update
//! for a symbol is fully processed before the next one starts. The risk gate
//! has its own lock; the order is always book → risk.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{ConfigError, ExitPlan, StrategyConfig};
use crate::domain::{
    Action, FillReport, IndicatorSnapshot, Instruction, InstructionId,
    InstructionReason, OrderSize, Position, Symbol, QTY_EPSILON,
};
use crate::ledger::{FillApplied, LedgerError, PositionLedger};
use crate::risk::{RiskGate, RiskSnapshot};
use crate::scale_out::{ExitDecision, ScaleOutController};
use crate::signal::{source_from_config, SignalEvaluator, SignalSource};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("out-of-order update for {symbol}: {received} precedes {last}")]
    OutOfOrder {
        symbol: Symbol,
        last: DateTime<Utc>,
        received: DateTime<Utc>,
    },

    #[error("invalid price {price} for {symbol}")]
    InvalidPrice { symbol: Symbol, price: f64 },

    #[error("fill for {fill_symbol}/{fill_id} does not match instruction {instruction_id} on {symbol}")]
    FillMismatch {
        instruction_id: InstructionId,
        symbol: Symbol,
        fill_id: InstructionId,
        fill_symbol: Symbol,
    },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("instruction {id} cannot be settled: {reason}")]
    UnexpectedInstruction {
        id: InstructionId,
        reason: &'static str,
    },
}

/// What a fill did to the book.
#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    Opened(Position),
    Reduced {
        position: Position,
        realized_pnl_pct: f64,
    },
    Closed {
        position: Position,
        realized_pnl_pct: f64,
    },
}

impl FillOutcome {
    pub fn position(&self) -> &Position {
        match self {
            FillOutcome::Opened(p) => p,
            FillOutcome::Reduced { position, .. } | FillOutcome::Closed { position, .. } => position,
        }
    }

    pub fn realized_pnl_pct(&self) -> f64 {
        match self {
            FillOutcome::Opened(_) => 0.0,
            FillOutcome::Reduced {
                realized_pnl_pct, ..
            }
            | FillOutcome::Closed {
                realized_pnl_pct, ..
            } => *realized_pnl_pct,
        }
    }
}

#[derive(Debug, Default)]
struct Book {
    ledger: PositionLedger,
    last_seen: HashMap<Symbol, DateTime<Utc>>,
    /// Entries emitted but not yet filled or failed.
    pending_entries: HashSet<Symbol>,
    /// Positions removed by a stop-loss whose order is still in flight.
    closing: HashMap<Symbol, Position>,
}

#[derive(Debug)]
pub struct Engine {
    config: StrategyConfig,
    exit_plan: ExitPlan,
    evaluator: SignalEvaluator,
    controller: ScaleOutController,
    book: Mutex<Book>,
    risk: Arc<RiskGate>,
    next_id: AtomicU64,
}

impl Engine {
    /// Validate `config` and build an engine with its own risk gate and the
    /// configured signal source.
    pub fn new(config: StrategyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let source = source_from_config(&config)?;
        let risk = Arc::new(RiskGate::new(config.risk_limits()));
        Ok(Self::with_parts(config, source, risk))
    }

    /// Build from explicit parts. A shared `risk` gate lets several engines
    /// obey one set of global limits.
    pub fn with_parts(
        config: StrategyConfig,
        source: Box<dyn SignalSource>,
        risk: Arc<RiskGate>,
    ) -> Self {
        Self {
            exit_plan: config.exit_plan(),
            config,
            evaluator: SignalEvaluator::new(source),
            controller: ScaleOutController::new(),
            book: Mutex::new(Book::default()),
            risk,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn risk(&self) -> &Arc<RiskGate> {
        &self.risk
    }

    pub fn signal_source(&self) -> &str {
        self.evaluator.source_name()
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.book.lock().ledger.get(symbol).cloned()
    }

    /// Open positions sorted by symbol.
    pub fn open_positions(&self) -> Vec<Position> {
        self.book
            .lock()
            .ledger
            .positions()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn risk_snapshot(&self) -> RiskSnapshot {
        self.risk.snapshot()
    }

    /// Process one price update and return the instructions it produces.
    ///
    /// Updates for a symbol must arrive with non-decreasing timestamps.
    pub fn on_price_update(
        &self,
        symbol: &str,
        snapshot: &IndicatorSnapshot,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<Instruction>, EngineError> {
        if !snapshot.has_valid_price() {
            return Err(EngineError::InvalidPrice {
                symbol: symbol.to_string(),
                price: snapshot.price,
            });
        }

        let mut guard = self.book.lock();
        let book = &mut *guard;

        if let Some(&last) = book.last_seen.get(symbol) {
            if timestamp < last {
                warn!(symbol = %symbol, last = %last, received = %timestamp, "rejecting out-of-order update");
                return Err(EngineError::OutOfOrder {
                    symbol: symbol.to_string(),
                    last,
                    received: timestamp,
                });
            }
        }
        book.last_seen.insert(symbol.to_string(), timestamp);
        self.risk.roll_period(timestamp);

        let decision = book
            .ledger
            .get_mut(symbol)
            .map(|position| self.controller.evaluate(position, snapshot.price));
        if let Some(decision) = decision {
            return self.emit_exits(book, symbol, decision, snapshot.price, timestamp);
        }

        if book.closing.contains_key(symbol) || book.pending_entries.contains(symbol) {
            return Ok(Vec::new());
        }
        Ok(self.consider_entry(book, symbol, snapshot, timestamp).into_iter().collect())
    }

    fn emit_exits(
        &self,
        book: &mut Book,
        symbol: &str,
        decision: ExitDecision,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<Instruction>, EngineError> {
        match decision {
            ExitDecision::Hold => Ok(Vec::new()),
            ExitDecision::StopLoss { change_pct, .. } => {
                let position = book
                    .ledger
                    .get(symbol)
                    .cloned()
                    .ok_or_else(|| LedgerError::NoOpenPosition {
                        symbol: symbol.to_string(),
                    })?;
                let quantity = book.ledger.close_all(symbol)?;
                let ix = self.exit_instruction(
                    &position,
                    quantity,
                    InstructionReason::StopLoss,
                    price,
                    timestamp,
                );
                info!(
                    symbol = %symbol,
                    id = %ix.id,
                    side = %ix.side,
                    quantity,
                    change_pct,
                    tp_step = position.tp_step,
                    "stop-loss: closing entire position"
                );
                book.closing.insert(symbol.to_string(), position);
                Ok(vec![ix])
            }
            ExitDecision::TakeProfit(exits) => {
                let position = book
                    .ledger
                    .get(symbol)
                    .cloned()
                    .ok_or_else(|| LedgerError::NoOpenPosition {
                        symbol: symbol.to_string(),
                    })?;
                let instructions: Vec<Instruction> = exits
                    .iter()
                    .map(|exit| {
                        let ix = self.exit_instruction(
                            &position,
                            exit.quantity,
                            InstructionReason::TakeProfit { rung: exit.rung },
                            price,
                            timestamp,
                        );
                        info!(
                            symbol = %symbol,
                            id = %ix.id,
                            side = %ix.side,
                            rung = exit.rung,
                            level_pct = exit.level_pct,
                            quantity = exit.quantity,
                            tp_step = position.tp_step,
                            remaining = position.quantity_remaining,
                            reserved = position.quantity_reserved,
                            "take-profit rung reached"
                        );
                        ix
                    })
                    .collect();
                Ok(instructions)
            }
        }
    }

    fn consider_entry(
        &self,
        book: &mut Book,
        symbol: &str,
        snapshot: &IndicatorSnapshot,
        timestamp: DateTime<Utc>,
    ) -> Option<Instruction> {
        let signal = self.evaluator.evaluate(symbol, snapshot, timestamp, &self.risk);
        let direction = signal.direction()?;

        if let Err(rejected) = self.risk.try_reserve_entry(symbol, timestamp) {
            let state = self.risk.snapshot();
            info!(
                symbol = %symbol,
                ?signal,
                reason = %rejected,
                open_positions = state.open_position_count,
                daily_realized_loss_pct = state.daily_realized_loss_pct,
                daily_realized_pnl_pct = state.daily_realized_pnl_pct,
                paused_until = ?state.paused_until,
                "entry rejected by risk gate"
            );
            return None;
        }

        book.pending_entries.insert(symbol.to_string());
        let ix = Instruction {
            id: self.next_id(),
            action: Action::Enter,
            symbol: symbol.to_string(),
            side: direction.entry_side(),
            direction,
            size: OrderSize::EquityPct(self.config.position.size_pct),
            reason: InstructionReason::Signal,
            reference_price: snapshot.price,
            timestamp,
        };
        info!(
            symbol = %symbol,
            id = %ix.id,
            direction = %direction,
            price = snapshot.price,
            rsi = snapshot.rsi,
            size_pct = self.config.position.size_pct,
            open_positions = self.risk.snapshot().open_position_count,
            "entry signal"
        );
        Some(ix)
    }

    fn exit_instruction(
        &self,
        position: &Position,
        quantity: f64,
        reason: InstructionReason,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Instruction {
        Instruction {
            id: self.next_id(),
            action: Action::Exit,
            symbol: position.symbol.clone(),
            side: position.direction.exit_side(),
            direction: position.direction,
            size: OrderSize::Quantity(quantity),
            reason,
            reference_price: price,
            timestamp,
        }
    }

    fn next_id(&self) -> InstructionId {
        InstructionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Settle an executed instruction against the ledger and risk state.
    pub fn on_fill(&self, instruction: &Instruction, fill: &FillReport) -> Result<FillOutcome, EngineError> {
        if fill.instruction_id != instruction.id || fill.symbol != instruction.symbol {
            return Err(EngineError::FillMismatch {
                instruction_id: instruction.id,
                symbol: instruction.symbol.clone(),
                fill_id: fill.instruction_id,
                fill_symbol: fill.symbol.clone(),
            });
        }

        let mut guard = self.book.lock();
        let book = &mut *guard;
        let symbol = instruction.symbol.as_str();

        match (instruction.action, instruction.reason) {
            (Action::Enter, _) => {
                book.pending_entries.remove(symbol);
                match book.ledger.open(
                    symbol,
                    instruction.direction,
                    fill.price,
                    fill.quantity,
                    fill.filled_at,
                    &self.exit_plan,
                ) {
                    Ok(position) => {
                        info!(
                            symbol = %symbol,
                            id = %instruction.id,
                            direction = %position.direction,
                            entry_price = position.entry_price,
                            quantity = position.quantity_opened,
                            stop_loss_price = position.stop_loss_price,
                            "position opened"
                        );
                        Ok(FillOutcome::Opened(position))
                    }
                    Err(err) => {
                        self.risk.release_slot();
                        error!(symbol = %symbol, id = %instruction.id, %err, "entry fill could not be booked");
                        Err(err.into())
                    }
                }
            }
            (Action::Exit, InstructionReason::TakeProfit { rung }) => {
                let Some(before) = book.ledger.get(symbol).cloned() else {
                    let err = LedgerError::NoOpenPosition {
                        symbol: symbol.to_string(),
                    };
                    error!(symbol = %symbol, id = %instruction.id, %err, "take-profit fill for flat symbol, ledger out of sync");
                    return Err(err.into());
                };
                if let Some(ordered) = instruction.size.quantity() {
                    if fill.quantity > ordered + QTY_EPSILON {
                        // Still applied: the ledger bounds it by what is left.
                        warn!(
                            symbol = %symbol,
                            id = %instruction.id,
                            rung,
                            ordered,
                            filled = fill.quantity,
                            "take-profit fill exceeds the ordered quantity"
                        );
                    }
                }
                let applied = book.ledger.apply_fill(symbol, fill.quantity).map_err(|err| {
                    error!(symbol = %symbol, id = %instruction.id, %err, "take-profit fill rejected by ledger");
                    err
                })?;
                let realized_pnl_pct = realized_pct(&before, fill);
                self.risk.record_realized(symbol, realized_pnl_pct, fill.filled_at);

                match applied {
                    FillApplied::Reduced(position) => {
                        info!(
                            symbol = %symbol,
                            rung,
                            quantity = fill.quantity,
                            price = fill.price,
                            remaining = position.quantity_remaining,
                            tp_step = position.tp_step,
                            "take-profit filled"
                        );
                        Ok(FillOutcome::Reduced {
                            position,
                            realized_pnl_pct,
                        })
                    }
                    FillApplied::Closed(position) => {
                        self.risk.release_slot();
                        info!(
                            symbol = %symbol,
                            rung,
                            quantity = fill.quantity,
                            price = fill.price,
                            "position closed by take-profit ladder"
                        );
                        Ok(FillOutcome::Closed {
                            position,
                            realized_pnl_pct,
                        })
                    }
                }
            }
            (Action::Exit, InstructionReason::StopLoss) => {
                let Some(mut position) = book.closing.remove(symbol) else {
                    let err = LedgerError::NoOpenPosition {
                        symbol: symbol.to_string(),
                    };
                    error!(symbol = %symbol, id = %instruction.id, %err, "stop-loss fill without a closing position");
                    return Err(err.into());
                };
                if fill.quantity > position.quantity_remaining + QTY_EPSILON {
                    let err = LedgerError::Overfill {
                        symbol: symbol.to_string(),
                        requested: fill.quantity,
                        remaining: position.quantity_remaining,
                    };
                    error!(symbol = %symbol, id = %instruction.id, %err, "stop-loss overfill");
                    book.closing.insert(symbol.to_string(), position);
                    return Err(err.into());
                }

                let realized_pnl_pct = realized_pct(&position, fill);
                self.risk.record_realized(symbol, realized_pnl_pct, fill.filled_at);
                position.quantity_remaining -= fill.quantity;

                if position.quantity_remaining > QTY_EPSILON {
                    // The adapter reports the rest of the order separately.
                    warn!(
                        symbol = %symbol,
                        filled = fill.quantity,
                        outstanding = position.quantity_remaining,
                        "partial stop-loss fill"
                    );
                    book.closing.insert(symbol.to_string(), position.clone());
                    return Ok(FillOutcome::Reduced {
                        position,
                        realized_pnl_pct,
                    });
                }

                position.quantity_remaining = 0.0;
                position.quantity_reserved = 0.0;
                self.risk.release_slot();
                info!(
                    symbol = %symbol,
                    price = fill.price,
                    quantity = fill.quantity,
                    realized_pnl_pct,
                    "position closed by stop-loss"
                );
                Ok(FillOutcome::Closed {
                    position,
                    realized_pnl_pct,
                })
            }
            (Action::Exit, InstructionReason::Signal) => Err(EngineError::UnexpectedInstruction {
                id: instruction.id,
                reason: "exit without a take-profit or stop-loss reason",
            }),
        }
    }

    /// Undo the bookkeeping of an instruction that did not execute.
    ///
    /// - entry: the position slot is released; the cooldown stays;
    /// - take-profit: the reserved quantity returns to the position and a
    ///   later rung (or the final-rung sweep) picks it up;
    /// - stop-loss: the position is restored and re-evaluated next tick.
    pub fn on_failure(&self, instruction: &Instruction, reason: &str) -> Result<(), EngineError> {
        let mut guard = self.book.lock();
        let book = &mut *guard;
        let symbol = instruction.symbol.as_str();

        match (instruction.action, instruction.reason) {
            (Action::Enter, _) => {
                if book.pending_entries.remove(symbol) {
                    self.risk.release_slot();
                }
                warn!(symbol = %symbol, id = %instruction.id, reason, "entry order failed, slot released");
                Ok(())
            }
            (Action::Exit, InstructionReason::TakeProfit { rung }) => {
                let quantity = instruction.size.quantity().unwrap_or(0.0);
                book.ledger.release(symbol, quantity).map_err(|err| {
                    error!(symbol = %symbol, id = %instruction.id, %err, "failed take-profit for flat symbol");
                    err
                })?;
                warn!(symbol = %symbol, id = %instruction.id, rung, quantity, reason, "take-profit order failed, quantity released");
                Ok(())
            }
            (Action::Exit, InstructionReason::StopLoss) => {
                let Some(position) = book.closing.remove(symbol) else {
                    let err = LedgerError::NoOpenPosition {
                        symbol: symbol.to_string(),
                    };
                    error!(symbol = %symbol, id = %instruction.id, %err, "failed stop-loss without a closing position");
                    return Err(err.into());
                };
                let remaining = position.quantity_remaining;
                book.ledger.restore(position)?;
                warn!(symbol = %symbol, id = %instruction.id, remaining, reason, "stop-loss order failed, position restored");
                Ok(())
            }
            (Action::Exit, InstructionReason::Signal) => Err(EngineError::UnexpectedInstruction {
                id: instruction.id,
                reason: "exit without a take-profit or stop-loss reason",
            }),
        }
    }
}

/// Realized contribution of an exit fill, in position-return units:
/// the move at the fill price weighted by the share of the opened size sold.
fn realized_pct(position: &Position, fill: &FillReport) -> f64 {
    position.change_pct(fill.price) * fill.quantity / position.quantity_opened
}
