//! Crypton CLI — replay, config checking, and journal inspection commands.
//!
//! Commands:
//! - `backtest` — replay each symbol independently on its own account
//! - `simulate` — replay all symbols through one shared engine and account
//! - `check-config` — validate a strategy TOML and print the resolved plan
//! - `journal` — print open trades and statistics from a saved trade journal

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Duration, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crypton_runner::{
    load_csv, run_backtests, run_portfolio, synthetic_bars, BacktestResult, Dataset, RunnerConfig,
    TradeJournal,
};

#[derive(Parser)]
#[command(name = "crypton", about = "Crypton CLI — rule-based crypto trading decisions")]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay each symbol independently, each with its own account.
    Backtest(RunArgs),
    /// Replay all symbols through one engine sharing the risk limits and account.
    Simulate(RunArgs),
    /// Validate a config file and print the resolved parameters.
    CheckConfig {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
    /// Print open trades and statistics from a trade journal.
    Journal {
        /// Path to the journal JSON file.
        #[arg(long)]
        path: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bar data as SYMBOL=path.csv (repeatable).
    #[arg(long = "data", value_name = "SYMBOL=PATH")]
    data: Vec<String>,

    /// Generate this many synthetic hourly bars per `--symbol` instead of loading CSV.
    #[arg(long)]
    synthetic: Option<usize>,

    /// Symbols for synthetic runs.
    #[arg(long = "symbol", default_value = "BTC/USDT")]
    symbols: Vec<String>,

    /// Directory for result JSON files.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Backtest(args) => run_backtest_cmd(&args),
        Commands::Simulate(args) => run_simulate_cmd(&args),
        Commands::CheckConfig { config } => run_check_config(&config),
        Commands::Journal { path } => run_journal(&path),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<RunnerConfig> {
    match path {
        Some(path) => RunnerConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(RunnerConfig::default()),
    }
}

fn load_datasets(args: &RunArgs) -> Result<Vec<Dataset>> {
    if let Some(count) = args.synthetic {
        if !args.data.is_empty() {
            bail!("--synthetic and --data are mutually exclusive");
        }
        if count == 0 {
            bail!("--synthetic needs at least one bar");
        }
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .context("synthetic start time")?;
        return Ok(args
            .symbols
            .iter()
            .map(|symbol| {
                Dataset::synthetic(symbol.clone(), synthetic_bars(symbol, start, count, Duration::hours(1)))
            })
            .collect());
    }

    if args.data.is_empty() {
        bail!("one of --data or --synthetic is required");
    }
    args.data
        .iter()
        .map(|arg| {
            let (symbol, path) = parse_data_arg(arg)?;
            let bars = load_csv(&path, &symbol)?;
            Ok(Dataset::new(symbol, bars))
        })
        .collect()
}

/// Split a `SYMBOL=path` argument.
fn parse_data_arg(arg: &str) -> Result<(String, PathBuf)> {
    match arg.split_once('=') {
        Some((symbol, path)) if !symbol.is_empty() && !path.is_empty() => {
            Ok((symbol.to_string(), PathBuf::from(path)))
        }
        _ => bail!("expected SYMBOL=path, got '{arg}'"),
    }
}

fn run_backtest_cmd(args: &RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let datasets = load_datasets(args)?;

    let mut results = Vec::with_capacity(datasets.len());
    for (dataset, result) in datasets.iter().zip(run_backtests(&config, &datasets)) {
        let result = result.with_context(|| format!("backtest for {}", dataset.symbol))?;
        print_summary(&result);
        results.push(result);
    }
    finish_runs(&config, &results, args.output.as_deref())
}

fn run_simulate_cmd(args: &RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let datasets = load_datasets(args)?;
    let result = run_portfolio(&config, &datasets)?;
    print_summary(&result);
    finish_runs(&config, std::slice::from_ref(&result), args.output.as_deref())
}

/// Write result files and append the runs' trades to the configured journal.
fn finish_runs(config: &RunnerConfig, results: &[BacktestResult], output: Option<&Path>) -> Result<()> {
    if let Some(dir) = output {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        for result in results {
            let path = dir.join(result_file_name(result));
            let json = serde_json::to_string_pretty(result)?;
            std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            println!("Result saved to: {}", path.display());
        }
    }

    if let Some(path) = &config.backtest.journal_path {
        let mut trades = TradeJournal::load(path)?.into_trades();
        trades.extend(results.iter().flat_map(|r| r.trades.iter().cloned()));
        let journal = TradeJournal::from_trades(trades);
        journal.save(path)?;
        info!(path = %path.display(), trades = journal.trades().len(), "journal saved");
    }
    Ok(())
}

fn result_file_name(result: &BacktestResult) -> String {
    let symbols = result.symbols.join("+").replace('/', "-");
    let hash: String = result.config_hash.chars().take(12).collect();
    format!("{symbols}_{hash}.json")
}

fn run_check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    let strategy = &config.strategy;
    let plan = strategy.exit_plan();

    println!("Config OK: {}", path.display());
    println!("Hash:           {}", config.config_hash());
    println!();
    println!("--- Signal ---");
    println!("Source:         {:?}", strategy.signal.source);
    println!("Bollinger:      length {} / {} std", strategy.bb.length, strategy.bb.std);
    println!(
        "RSI:            length {} / oversold {} / overbought {}",
        strategy.rsi.length, strategy.rsi.oversold, strategy.rsi.overbought
    );
    println!();
    println!("--- Risk ---");
    println!("Max Positions:  {}", strategy.risk.max_open_positions);
    println!("Position Size:  {:.1}% of equity", strategy.position.size_pct * 100.0);
    println!("Stop Loss:      {:.2}%", plan.stop_loss_pct * 100.0);
    for (i, (level, chunk)) in plan.rungs.iter().enumerate() {
        let last = i + 1 == plan.rungs.len();
        println!(
            "Take Profit {}:  +{:.2}% -> {}",
            i + 1,
            level * 100.0,
            if last {
                "remainder".to_string()
            } else {
                format!("{:.1}% of entry", chunk * 100.0)
            }
        );
    }
    println!("Daily Loss Cap: {:.2}%", strategy.risk.daily_loss_cap_pct * 100.0);
    println!("Cooldown:       {}h", strategy.risk.cooldown_hours);
    println!();
    println!("--- Backtest ---");
    println!("Capital:        {:.2}", config.backtest.initial_capital);
    println!("Commission:     {:.3}%", config.backtest.commission_pct * 100.0);
    Ok(())
}

fn run_journal(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("journal not found: {}", path.display());
    }
    let journal = TradeJournal::load(path)?;

    let open: Vec<_> = journal.open_trades().collect();
    println!("Open trades: {}", open.len());
    if !open.is_empty() {
        println!("{:<12} {:<6} {:>12} {:>12} {:>6}  Opened", "Symbol", "Side", "Entry", "Qty Left", "Rungs");
        println!("{}", "-".repeat(72));
        for trade in open {
            let sold: f64 = trade.exits.iter().map(|e| e.quantity).sum();
            println!(
                "{:<12} {:<6} {:>12.4} {:>12.6} {:>6}  {}",
                trade.symbol,
                trade.direction,
                trade.entry_price,
                trade.quantity - sold,
                trade.rungs_hit().count(),
                trade.opened_at.format("%Y-%m-%d %H:%M"),
            );
        }
    }

    let stats = journal.stats();
    println!();
    println!("=== Journal Stats ===");
    println!("Closed Trades:  {}", stats.total_trades);
    println!("Winners:        {}", stats.winning_trades);
    println!("Losers:         {}", stats.losing_trades);
    println!("Win Rate:       {:.1}%", stats.win_rate * 100.0);
    println!("Total PnL:      {:.2}", stats.total_pnl);
    println!("Average PnL:    {:.2}", stats.average_pnl);
    println!("Largest Win:    {:.2}", stats.largest_win);
    println!("Largest Loss:   {:.2}", stats.largest_loss);
    println!("Stop Losses:    {}", stats.stop_losses);
    for (rung, hits) in &stats.rung_hits {
        println!("TP{} Hits:       {hits}", rung + 1);
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let fmt_time = |t: Option<chrono::DateTime<Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into())
    };

    println!();
    println!("=== Backtest Result ===");
    println!("Symbols:        {}", result.symbols.join(", "));
    println!("Period:         {} to {}", fmt_time(result.start), fmt_time(result.end));
    println!("Bars:           {}", result.bar_count);
    println!("Signal Source:  {}", result.signal_source);
    println!("Instructions:   {} ({} failed)", result.instruction_count, result.failed_orders);
    println!("Trades:         {}", result.metrics.trade_count);
    println!("Still Open:     {}", result.open_positions_at_end);
    println!();
    println!("--- Performance ---");
    println!("Final Equity:   {:.2}", result.final_equity);
    println!("Total Return:   {:.2}%", result.metrics.total_return * 100.0);
    println!("Max Drawdown:   {:.2}%", result.metrics.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", result.metrics.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", result.metrics.profit_factor);
    println!("Avg Trade:      {:.2}%", result.metrics.avg_trade_return * 100.0);
    println!("Max Consec Loss:{}", result.metrics.max_consecutive_losses);
    println!("Stop Losses:    {}", result.metrics.stop_loss_count);
    for (rung, hits) in &result.metrics.take_profit_hits {
        println!("TP{} Hits:       {hits}", rung + 1);
    }
    println!("Commissions:    {:.2}", result.commissions_paid);
    if result.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}
