//! Bar-replay driver — wires together indicators, engine, paper execution,
//! journal, and metrics.
//!
//! Three entry points:
//! - `run_backtest()`: one symbol, one engine.
//! - `run_backtests()`: independent per-symbol runs in parallel (rayon).
//! - `run_portfolio()`: one engine over the merged timeline of all symbols,
//!   so every symbol shares the same risk gate and account.
//!
//! Per bar: the close feeds the symbol's indicator feed, the paper account is
//! marked, and the resulting snapshot goes to `Engine::on_price_update`. Each
//! instruction is submitted to the paper adapter and its outcome reported
//! back through `on_fill` / `on_failure` before the next bar.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crypton_core::config::ConfigError;
use crypton_core::domain::{Bar, Symbol};
use crypton_core::engine::{Engine, EngineError};
use crypton_core::execution::ExecutionAdapter;
use crypton_core::indicators::IndicatorFeed;
use crypton_core::risk::RiskSnapshot;

use crate::config::{ConfigHash, RunnerConfig};
use crate::data_loader::dataset_hash;
use crate::journal::{JournalError, JournalTrade, TradeJournal};
use crate::metrics::PerformanceMetrics;
use crate::paper::PaperExecution;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("no bars for '{0}'")]
    NoBars(String),
    #[error("dataset for '{expected}' contains a bar for '{found}'")]
    SymbolMismatch { expected: String, found: String },
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// One symbol's bar series.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub symbol: Symbol,
    pub bars: Vec<Bar>,
    /// True if the bars were generated rather than loaded.
    pub synthetic: bool,
}

impl Dataset {
    pub fn new(symbol: impl Into<Symbol>, bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            bars,
            synthetic: false,
        }
    }

    pub fn synthetic(symbol: impl Into<Symbol>, bars: Vec<Bar>) -> Self {
        Self {
            synthetic: true,
            ..Self::new(symbol, bars)
        }
    }
}

/// Complete result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub config_hash: ConfigHash,
    pub config: RunnerConfig,
    pub symbols: Vec<Symbol>,
    pub signal_source: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub commissions_paid: f64,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<JournalTrade>,
    /// Account equity after each distinct timestamp.
    pub equity_curve: Vec<f64>,
    pub bar_count: usize,
    pub instruction_count: usize,
    /// Instructions the paper adapter refused.
    pub failed_orders: usize,
    pub open_positions_at_end: usize,
    pub risk_at_end: RiskSnapshot,
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Run one symbol on its own engine and account.
pub fn run_backtest(config: &RunnerConfig, dataset: &Dataset) -> Result<BacktestResult, RunError> {
    run_portfolio(config, std::slice::from_ref(dataset))
}

/// Run each dataset independently, in parallel. Results keep input order.
pub fn run_backtests(config: &RunnerConfig, datasets: &[Dataset]) -> Vec<Result<BacktestResult, RunError>> {
    datasets
        .par_iter()
        .map(|dataset| run_backtest(config, dataset))
        .collect()
}

/// Run all datasets through one engine and one account on a merged timeline.
///
/// Bars sharing a timestamp are processed in symbol order, and equity is
/// recorded once per timestamp.
pub fn run_portfolio(config: &RunnerConfig, datasets: &[Dataset]) -> Result<BacktestResult, RunError> {
    config.validate()?;
    for dataset in datasets {
        if dataset.bars.is_empty() {
            return Err(RunError::NoBars(dataset.symbol.clone()));
        }
        if let Some(bar) = dataset.bars.iter().find(|b| b.symbol != dataset.symbol) {
            return Err(RunError::SymbolMismatch {
                expected: dataset.symbol.clone(),
                found: bar.symbol.clone(),
            });
        }
    }

    let engine = Engine::new(config.strategy.clone())?;
    let mut paper = PaperExecution::new(config.backtest.initial_capital, config.backtest.commission_pct);
    let mut journal = TradeJournal::new();
    let mut feeds: HashMap<&str, IndicatorFeed> = datasets
        .iter()
        .map(|d| (d.symbol.as_str(), IndicatorFeed::from_config(&config.strategy)))
        .collect();

    let timeline = merge_timeline(datasets);
    let mut equity_curve = Vec::new();
    let mut instruction_count = 0;
    let mut failed_orders = 0;

    for (i, bar) in timeline.iter().enumerate() {
        let snapshot = match feeds.get_mut(bar.symbol.as_str()) {
            Some(feed) => feed.push(bar.close),
            None => continue,
        };
        paper.mark(&bar.symbol, bar.close, bar.timestamp);

        for instruction in engine.on_price_update(&bar.symbol, &snapshot, bar.timestamp)? {
            instruction_count += 1;
            match paper.submit_order(&instruction) {
                Ok(fill) => {
                    let outcome = engine.on_fill(&instruction, &fill)?;
                    journal.record(&instruction, &fill, &outcome)?;
                }
                Err(err) => {
                    failed_orders += 1;
                    warn!(symbol = %bar.symbol, id = %instruction.id, %err, "paper order failed");
                    engine.on_failure(&instruction, &err.to_string())?;
                }
            }
        }

        let last_of_timestamp = timeline
            .get(i + 1)
            .map_or(true, |next| next.timestamp != bar.timestamp);
        if last_of_timestamp {
            equity_curve.push(paper.equity());
        }
    }

    let trades = journal.into_trades();
    let metrics = PerformanceMetrics::compute(&equity_curve, &trades);
    let final_equity = paper.equity();

    info!(
        symbols = datasets.len(),
        bars = timeline.len(),
        trades = metrics.trade_count,
        total_return = metrics.total_return,
        final_equity,
        "run complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        config_hash: config.config_hash(),
        config: config.clone(),
        symbols: datasets.iter().map(|d| d.symbol.clone()).collect(),
        signal_source: engine.signal_source().to_string(),
        start: timeline.first().map(|b| b.timestamp),
        end: timeline.last().map(|b| b.timestamp),
        initial_capital: config.backtest.initial_capital,
        final_equity,
        commissions_paid: paper.commissions_paid(),
        metrics,
        trades,
        equity_curve,
        bar_count: timeline.len(),
        instruction_count,
        failed_orders,
        open_positions_at_end: engine.open_positions().len(),
        risk_at_end: engine.risk_snapshot(),
        dataset_hash: combined_hash(datasets),
        has_synthetic: datasets.iter().any(|d| d.synthetic),
    })
}

/// All bars of all datasets, ordered by timestamp then symbol.
fn merge_timeline(datasets: &[Dataset]) -> Vec<&Bar> {
    let mut timeline: Vec<&Bar> = datasets.iter().flat_map(|d| d.bars.iter()).collect();
    timeline.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.symbol.cmp(&b.symbol)));
    timeline
}

fn combined_hash(datasets: &[Dataset]) -> String {
    if let [single] = datasets {
        return dataset_hash(&single.bars);
    }
    let mut hashes: Vec<(&str, String)> = datasets
        .iter()
        .map(|d| (d.symbol.as_str(), dataset_hash(&d.bars)))
        .collect();
    hashes.sort();
    let mut hasher = blake3::Hasher::new();
    for (_, hash) in &hashes {
        hasher.update(hash.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
