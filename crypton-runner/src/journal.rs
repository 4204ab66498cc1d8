//! Trade journal: persistent history of entries, scale-outs, and closes.
//!
//! One record per position from open to close. Every exit fill is appended to
//! its trade, so a journal shows exactly which rungs were hit and at what
//! price. The file is a single pretty-printed JSON document, rewritten in full
//! on save.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crypton_core::domain::{Direction, FillReport, Instruction, InstructionReason};
use crypton_core::engine::FillOutcome;

pub const JOURNAL_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed journal: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no open trade for {symbol}")]
    NoOpenTrade { symbol: String },
}

/// One exit fill against a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitFill {
    pub reason: InstructionReason,
    pub price: f64,
    pub quantity: f64,
    pub commission: f64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalTrade {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: f64,
    pub opened_at: DateTime<Utc>,
    pub entry_commission: f64,
    pub exits: Vec<ExitFill>,
    /// Net of all commissions, in quote currency.
    pub realized_pnl: f64,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_reason: Option<InstructionReason>,
}

impl JournalTrade {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    pub fn is_winner(&self) -> bool {
        self.realized_pnl > 0.0
    }

    /// Realized PnL as a fraction of the entry notional.
    pub fn return_pct(&self) -> f64 {
        let notional = self.entry_price * self.quantity;
        if notional <= 0.0 {
            return 0.0;
        }
        self.realized_pnl / notional
    }

    /// Take-profit rungs this trade hit, in fill order.
    pub fn rungs_hit(&self) -> impl Iterator<Item = usize> + '_ {
        self.exits.iter().filter_map(|e| match e.reason {
            InstructionReason::TakeProfit { rung } => Some(rung),
            _ => None,
        })
    }

    pub fn stopped_out(&self) -> bool {
        self.exit_reason == Some(InstructionReason::StopLoss)
    }

    fn apply_exit(&mut self, reason: InstructionReason, fill: &FillReport, closed: bool) {
        let gross = self.direction.sign() * (fill.price - self.entry_price) * fill.quantity;
        self.realized_pnl += gross - fill.commission;
        self.exits.push(ExitFill {
            reason,
            price: fill.price,
            quantity: fill.quantity,
            commission: fill.commission,
            at: fill.filled_at,
        });
        if closed {
            self.closed_at = Some(fill.filled_at);
            self.exit_reason = Some(reason);
        }
    }
}

/// Summary over closed trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub average_pnl: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Take-profit hits keyed by rung index.
    pub rung_hits: BTreeMap<usize, usize>,
    pub stop_losses: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalFile {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    trades: Vec<JournalTrade>,
}

fn default_schema_version() -> u32 {
    JOURNAL_SCHEMA_VERSION
}

#[derive(Debug, Clone, Default)]
pub struct TradeJournal {
    trades: Vec<JournalTrade>,
}

impl TradeJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_trades(trades: Vec<JournalTrade>) -> Self {
        Self { trades }
    }

    /// Load a journal file. A missing file is an empty journal.
    pub fn load(path: &Path) -> Result<Self, JournalError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(JournalError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let file: JournalFile = serde_json::from_str(&content)?;
        debug!(path = %path.display(), trades = file.trades.len(), "loaded journal");
        Ok(Self { trades: file.trades })
    }

    /// Write the whole journal, replacing the file atomically.
    pub fn save(&self, path: &Path) -> Result<(), JournalError> {
        let io_err = |source| JournalError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&JournalFile {
            schema_version: JOURNAL_SCHEMA_VERSION,
            trades: self.trades.clone(),
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }

    /// Record a settled fill.
    pub fn record(
        &mut self,
        instruction: &Instruction,
        fill: &FillReport,
        outcome: &FillOutcome,
    ) -> Result<(), JournalError> {
        match outcome {
            FillOutcome::Opened(position) => {
                self.trades.push(JournalTrade {
                    symbol: position.symbol.clone(),
                    direction: position.direction,
                    entry_price: position.entry_price,
                    quantity: position.quantity_opened,
                    opened_at: position.opened_at,
                    entry_commission: fill.commission,
                    exits: Vec::new(),
                    realized_pnl: -fill.commission,
                    closed_at: None,
                    exit_reason: None,
                });
                Ok(())
            }
            FillOutcome::Reduced { .. } | FillOutcome::Closed { .. } => {
                let closed = matches!(outcome, FillOutcome::Closed { .. });
                let trade = self
                    .trades
                    .iter_mut()
                    .rev()
                    .find(|t| t.symbol == instruction.symbol && t.is_open())
                    .ok_or_else(|| JournalError::NoOpenTrade {
                        symbol: instruction.symbol.clone(),
                    })?;
                trade.apply_exit(instruction.reason, fill, closed);
                Ok(())
            }
        }
    }

    pub fn trades(&self) -> &[JournalTrade] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<JournalTrade> {
        self.trades
    }

    pub fn open_trades(&self) -> impl Iterator<Item = &JournalTrade> {
        self.trades.iter().filter(|t| t.is_open())
    }

    pub fn closed_trades(&self) -> impl Iterator<Item = &JournalTrade> {
        self.trades.iter().filter(|t| !t.is_open())
    }

    pub fn stats(&self) -> JournalStats {
        let closed: Vec<&JournalTrade> = self.closed_trades().collect();
        let total_trades = closed.len();
        let winning_trades = closed.iter().filter(|t| t.is_winner()).count();
        let total_pnl: f64 = closed.iter().map(|t| t.realized_pnl).sum();

        let mut rung_hits = BTreeMap::new();
        for rung in closed.iter().flat_map(|t| t.rungs_hit()) {
            *rung_hits.entry(rung).or_insert(0) += 1;
        }

        JournalStats {
            total_trades,
            winning_trades,
            losing_trades: total_trades - winning_trades,
            win_rate: if total_trades == 0 {
                0.0
            } else {
                winning_trades as f64 / total_trades as f64
            },
            total_pnl,
            average_pnl: if total_trades == 0 {
                0.0
            } else {
                total_pnl / total_trades as f64
            },
            largest_win: closed.iter().map(|t| t.realized_pnl).fold(0.0, f64::max),
            largest_loss: closed.iter().map(|t| t.realized_pnl).fold(0.0, f64::min),
            rung_hits,
            stop_losses: closed.iter().filter(|t| t.stopped_out()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crypton_core::domain::{
        Action, InstructionId, LadderRung, OrderSide, OrderSize, Position,
    };

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
    }

    fn position() -> Position {
        Position {
            symbol: "BTC/USDT".into(),
            direction: Direction::Long,
            entry_price: 100.0,
            quantity_opened: 10.0,
            quantity_remaining: 10.0,
            quantity_reserved: 0.0,
            tp_step: 0,
            opened_at: at(0),
            stop_loss_pct: 0.02,
            stop_loss_price: 98.0,
            take_profit_ladder: vec![LadderRung {
                level_pct: 0.02,
                chunk_pct: 1.0,
                trigger_price: 102.0,
            }],
        }
    }

    fn instruction(reason: InstructionReason) -> Instruction {
        Instruction {
            id: InstructionId(1),
            action: Action::Exit,
            symbol: "BTC/USDT".into(),
            side: OrderSide::Sell,
            direction: Direction::Long,
            size: OrderSize::Quantity(5.0),
            reason,
            reference_price: 100.0,
            timestamp: at(1),
        }
    }

    fn fill(quantity: f64, price: f64, commission: f64, h: u32) -> FillReport {
        FillReport {
            instruction_id: InstructionId(1),
            symbol: "BTC/USDT".into(),
            quantity,
            price,
            commission,
            filled_at: at(h),
        }
    }

    fn journal_with_closed_trade() -> TradeJournal {
        let mut journal = TradeJournal::new();
        let pos = position();
        journal
            .record(&instruction(InstructionReason::Signal), &fill(10.0, 100.0, 1.0, 0), &FillOutcome::Opened(pos.clone()))
            .unwrap();
        journal
            .record(
                &instruction(InstructionReason::TakeProfit { rung: 0 }),
                &fill(4.0, 102.0, 0.0, 1),
                &FillOutcome::Reduced {
                    position: pos.clone(),
                    realized_pnl_pct: 0.008,
                },
            )
            .unwrap();
        journal
            .record(
                &instruction(InstructionReason::StopLoss),
                &fill(6.0, 98.0, 0.0, 2),
                &FillOutcome::Closed {
                    position: pos,
                    realized_pnl_pct: -0.012,
                },
            )
            .unwrap();
        journal
    }

    #[test]
    fn exits_accumulate_on_the_open_trade() {
        let journal = journal_with_closed_trade();
        let trade = &journal.trades()[0];
        // -1 commission + 4*2 - 6*2
        assert!((trade.realized_pnl - (-5.0)).abs() < 1e-9);
        assert_eq!(trade.exits.len(), 2);
        assert_eq!(trade.rungs_hit().collect::<Vec<_>>(), vec![0]);
        assert!(trade.stopped_out());
        assert_eq!(trade.closed_at, Some(at(2)));
    }

    #[test]
    fn stats_over_closed_trades() {
        let stats = journal_with_closed_trade().stats();
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.losing_trades, 1);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.rung_hits.get(&0), Some(&1));
        assert_eq!(stats.stop_losses, 1);
        assert!((stats.largest_loss + 5.0).abs() < 1e-9);
    }

    #[test]
    fn exit_without_open_trade_fails() {
        let mut journal = TradeJournal::new();
        let err = journal
            .record(
                &instruction(InstructionReason::StopLoss),
                &fill(1.0, 98.0, 0.0, 1),
                &FillOutcome::Closed {
                    position: position(),
                    realized_pnl_pct: -0.02,
                },
            )
            .unwrap_err();
        assert!(matches!(err, JournalError::NoOpenTrade { .. }));
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal").join("trades.json");
        let journal = journal_with_closed_trade();
        journal.save(&path).unwrap();

        let loaded = TradeJournal::load(&path).unwrap();
        assert_eq!(loaded.trades(), journal.trades());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_file_is_empty_journal() {
        let dir = tempfile::tempdir().unwrap();
        let journal = TradeJournal::load(&dir.path().join("none.json")).unwrap();
        assert!(journal.trades().is_empty());
    }
}
