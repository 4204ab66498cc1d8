//! Crypton Runner — bar replay, paper execution, trade journal, metrics.
//!
//! This crate builds on `crypton-core` to provide:
//! - Bar loading from CSV with a deterministic synthetic fallback
//! - A paper execution adapter that fills at the last marked price
//! - Single-symbol, parallel multi-symbol, and shared-portfolio replays
//! - A persistent JSON trade journal with per-trade exit history
//! - Performance metrics and content-addressed config hashing

pub mod config;
pub mod data_loader;
pub mod journal;
pub mod metrics;
pub mod paper;
pub mod runner;

pub use config::{BacktestSettings, ConfigHash, RunnerConfig};
pub use data_loader::{dataset_hash, load_csv, synthetic_bars, LoadError};
pub use journal::{JournalError, JournalStats, JournalTrade, TradeJournal};
pub use metrics::PerformanceMetrics;
pub use paper::PaperExecution;
pub use runner::{run_backtest, run_backtests, run_portfolio, BacktestResult, Dataset, RunError};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn performance_metrics_is_send_sync() {
        assert_send::<PerformanceMetrics>();
        assert_sync::<PerformanceMetrics>();
    }

    #[test]
    fn backtest_result_is_send_sync() {
        assert_send::<BacktestResult>();
        assert_sync::<BacktestResult>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunnerConfig>();
        assert_sync::<RunnerConfig>();
        assert_send::<Dataset>();
        assert_sync::<Dataset>();
    }

    #[test]
    fn journal_is_send_sync() {
        assert_send::<TradeJournal>();
        assert_sync::<TradeJournal>();
    }

    #[test]
    fn paper_execution_is_send() {
        assert_send::<PaperExecution>();
    }
}
