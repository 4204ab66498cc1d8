//! Bar loading for the replay driver.
//!
//! Two sources:
//! 1. CSV files with a `timestamp,open,high,low,close,volume` header
//! 2. Deterministic synthetic bars (developer-only; results are tagged)
//!
//! Loaded series are checked once here so the driver can assume sorted, sane
//! bars.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crypton_core::domain::Bar;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} row {row}: unrecognized timestamp '{value}'")]
    Timestamp {
        path: PathBuf,
        row: usize,
        value: String,
    },

    #[error("{path} row {row}: timestamp {timestamp} does not follow {previous}")]
    Unsorted {
        path: PathBuf,
        row: usize,
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },

    #[error("{path} row {row}: bar fails OHLC sanity check")]
    InsaneBar { path: PathBuf, row: usize },

    #[error("{path} contains no bars")]
    Empty { path: PathBuf },
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Load one symbol's bars from a CSV file.
///
/// Timestamps may be RFC 3339, unix seconds or milliseconds,
/// `YYYY-MM-DD HH:MM:SS` (UTC), or a bare `YYYY-MM-DD`. Rows must be strictly
/// increasing in time.
pub fn load_csv(path: &Path, symbol: &str) -> Result<Vec<Bar>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let mut bars: Vec<Bar> = Vec::new();
    for (i, record) in reader.deserialize::<CsvRow>().enumerate() {
        // header is line 1
        let row = i + 2;
        let record = record.map_err(csv_err)?;
        let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| LoadError::Timestamp {
            path: path.to_path_buf(),
            row,
            value: record.timestamp.clone(),
        })?;

        if let Some(prev) = bars.last() {
            if timestamp <= prev.timestamp {
                return Err(LoadError::Unsorted {
                    path: path.to_path_buf(),
                    row,
                    timestamp,
                    previous: prev.timestamp,
                });
            }
        }

        let bar = Bar {
            symbol: symbol.to_string(),
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        };
        if !bar.is_sane() {
            return Err(LoadError::InsaneBar {
                path: path.to_path_buf(),
                row,
            });
        }
        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }
    debug!(symbol = %symbol, path = %path.display(), bars = bars.len(), "loaded csv");
    Ok(bars)
}

/// Parse the timestamp formats accepted by [`load_csv`].
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(n) = value.parse::<i64>() {
        // Anything past year 2286 in seconds is really milliseconds.
        return if n.abs() >= 10_000_000_000 {
            Utc.timestamp_millis_opt(n).single()
        } else {
            Utc.timestamp_opt(n, 0).single()
        };
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Generate synthetic bars for development runs.
///
/// A random walk from 100.0 with up to ±1.5% per bar, seeded from the symbol
/// name so the same symbol always yields the same series.
pub fn synthetic_bars(symbol: &str, start: DateTime<Utc>, count: usize, interval: Duration) -> Vec<Bar> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    warn!(symbol = %symbol, count, "generating synthetic bars, results will be tagged synthetic");

    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut bars = Vec::with_capacity(count);
    let mut price = 100.0_f64;
    let mut timestamp = start;

    for _ in 0..count {
        let ret: f64 = rng.gen_range(-0.015..0.015);
        let open = price;
        let close = price * (1.0 + ret);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.004));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.004));
        let volume = rng.gen_range(10.0..500.0);

        bars.push(Bar {
            symbol: symbol.to_string(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });

        price = close;
        timestamp += interval;
    }
    bars
}

/// Deterministic BLAKE3 hash over a bar series.
pub fn dataset_hash(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(bar.symbol.as_bytes());
        hasher.update(&bar.timestamp.timestamp_millis().to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
