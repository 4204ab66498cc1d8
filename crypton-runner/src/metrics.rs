//! Performance metrics — pure functions that compute run statistics.
//!
//! Every metric is a pure function: equity curve and/or closed trades in,
//! scalar out. Open trades are ignored; their value is already in the equity
//! curve.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::journal::JournalTrade;

/// Aggregate performance metrics for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub trade_count: usize,
    pub avg_trade_return: f64,
    pub max_consecutive_losses: usize,
    /// Closed trades that hit each take-profit rung.
    pub take_profit_hits: BTreeMap<usize, usize>,
    pub stop_loss_count: usize,
}

impl PerformanceMetrics {
    pub fn compute(equity_curve: &[f64], trades: &[JournalTrade]) -> Self {
        let closed: Vec<&JournalTrade> = trades.iter().filter(|t| !t.is_open()).collect();

        let mut take_profit_hits = BTreeMap::new();
        for rung in closed.iter().flat_map(|t| t.rungs_hit()) {
            *take_profit_hits.entry(rung).or_insert(0) += 1;
        }

        Self {
            total_return: total_return(equity_curve),
            max_drawdown: max_drawdown(equity_curve),
            win_rate: win_rate(&closed),
            profit_factor: profit_factor(&closed),
            trade_count: closed.len(),
            avg_trade_return: avg_trade_return(&closed),
            max_consecutive_losses: max_consecutive_losses(&closed),
            take_profit_hits,
            stop_loss_count: closed.iter().filter(|t| t.stopped_out()).count(),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&initial), Some(&last)) if equity_curve.len() >= 2 && initial > 0.0 => {
            (last - initial) / initial
        }
        _ => 0.0,
    }
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// Returns 0.0 if equity is constant or monotonically increasing.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;

    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

/// Fraction of closed trades with positive net PnL.
pub fn win_rate(trades: &[&JournalTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Profit factor: gross profits / gross losses.
///
/// Capped at 100.0 for edge cases (all winners, zero losses).
pub fn profit_factor(trades: &[&JournalTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.realized_pnl > 0.0)
        .map(|t| t.realized_pnl)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.realized_pnl < 0.0)
        .map(|t| t.realized_pnl.abs())
        .sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

/// Mean of per-trade returns on entry notional.
pub fn avg_trade_return(trades: &[&JournalTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.return_pct()).sum::<f64>() / trades.len() as f64
}

/// Longest run of consecutive losing trades.
pub fn max_consecutive_losses(trades: &[&JournalTrade]) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for trade in trades {
        if trade.is_winner() {
            current = 0;
        } else {
            current += 1;
            max_streak = max_streak.max(current);
        }
    }
    max_streak
}
