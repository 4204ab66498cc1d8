//! Criterion benchmarks for the decision hot paths.
//!
//! Benchmarks:
//! 1. Engine price update loop (entries, ladder walks, stop-outs)
//! 2. Streaming indicator feed vs batch precompute
//! 3. Scale-out controller evaluation

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use crypton_core::config::StrategyConfig;
use crypton_core::domain::{Bar, Direction, FillReport, OrderSize};
use crypton_core::engine::Engine;
use crypton_core::indicators::{snapshots, Bollinger, Indicator, IndicatorFeed, Rsi};
use crypton_core::ledger::PositionLedger;
use crypton_core::scale_out::ScaleOutController;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 60_000.0 + (i as f64 * 0.1).sin() * 3_000.0;
            Bar {
                symbol: "BTC/USDT".to_string(),
                timestamp: start + Duration::hours(i as i64),
                open: close - 20.0,
                high: close + 150.0,
                low: close - 150.0,
                close,
                volume: 25.0,
            }
        })
        .collect()
}

// ── 1. Engine Loop ───────────────────────────────────────────────────

fn bench_engine_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_loop");
    let config = StrategyConfig::default();

    for &bar_count in &[720, 4_320, 8_760] {
        let bars = make_bars(bar_count);
        let snaps = snapshots(&config, &bars);

        group.bench_with_input(BenchmarkId::new("bars", bar_count), &bar_count, |b, _| {
            b.iter(|| {
                let engine = Engine::new(config.clone()).unwrap();
                for (bar, snap) in bars.iter().zip(&snaps) {
                    let ixs = engine
                        .on_price_update(&bar.symbol, black_box(snap), bar.timestamp)
                        .unwrap();
                    for ix in ixs {
                        let quantity = match ix.size {
                            OrderSize::Quantity(q) => q,
                            OrderSize::EquityPct(_) => 1.0,
                        };
                        let fill = FillReport {
                            instruction_id: ix.id,
                            symbol: ix.symbol.clone(),
                            quantity,
                            price: bar.close,
                            commission: 0.0,
                            filled_at: bar.timestamp,
                        };
                        engine.on_fill(&ix, &fill).unwrap();
                    }
                }
            });
        });
    }

    group.finish();
}

// ── 2. Indicators ────────────────────────────────────────────────────

fn bench_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicators");
    let bars = make_bars(8_760);

    group.bench_function("feed_stream_8760", |b| {
        b.iter(|| {
            let mut feed = IndicatorFeed::new(20, 2.0, 14);
            for bar in &bars {
                black_box(feed.push(bar.close));
            }
        });
    });

    group.bench_function("batch_bollinger_rsi_8760", |b| {
        b.iter(|| {
            black_box(Bollinger::lower(20, 2.0).compute(&bars));
            black_box(Bollinger::upper(20, 2.0).compute(&bars));
            black_box(Rsi::new(14).compute(&bars));
        });
    });

    group.finish();
}

// ── 3. Scale-Out Controller ──────────────────────────────────────────

fn bench_scale_out(c: &mut Criterion) {
    let config = StrategyConfig::default();
    let plan = config.exit_plan();
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    c.bench_function("scale_out_hold_10k", |b| {
        let mut ledger = PositionLedger::new();
        let position = ledger
            .open("BTC/USDT", Direction::Long, 64_700.0, 1.0, at, &plan)
            .unwrap();
        let ctl = ScaleOutController::new();
        b.iter(|| {
            let mut pos = position.clone();
            for i in 0..10_000 {
                let price = 64_700.0 + (i % 100) as f64;
                black_box(ctl.evaluate(&mut pos, black_box(price)));
            }
        });
    });
}

criterion_group!(benches, bench_engine_loop, bench_indicators, bench_scale_out);
criterion_main!(benches);
