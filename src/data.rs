//! Candle input
//!
//! Loading candle CSVs and enforcing the ordering invariant every analysis
//! stage relies on: strictly increasing, unique times per series.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

use crate::types::Candle;

/// The three timeframes the analysis consumes, coarsest first
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    pub htf: Vec<Candle>,
    pub mtf: Vec<Candle>,
    pub ltf: Vec<Candle>,
}

impl MarketData {
    /// Build from raw series, normalizing each
    pub fn new(htf: Vec<Candle>, mtf: Vec<Candle>, ltf: Vec<Candle>) -> Self {
        Self {
            htf: normalize(htf),
            mtf: normalize(mtf),
            ltf: normalize(ltf),
        }
    }

    /// Load all three series from CSV files
    pub fn from_csv_files(htf: &Path, mtf: &Path, ltf: &Path) -> Result<Self> {
        let data = Self::new(load_candles_csv(htf)?, load_candles_csv(mtf)?, load_candles_csv(ltf)?);
        info!(
            "Loaded candles: {} HTF, {} MTF, {} LTF",
            data.htf.len(),
            data.mtf.len(),
            data.ltf.len()
        );
        Ok(data)
    }
}

/// Sort by time and drop repeated timestamps (first occurrence wins)
pub fn normalize(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.time);
    let before = candles.len();
    candles.dedup_by_key(|c| c.time);
    if candles.len() != before {
        warn!("Dropped {} duplicate candles", before - candles.len());
    }
    candles
}

/// Read candles from a CSV with a `time,open,high,low,close` header.
/// Extra columns (volume etc.) are ignored.
pub fn load_candles_csv(path: &Path) -> Result<Vec<Candle>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening candle file {:?}", path))?;

    let mut candles = Vec::new();
    for (row, record) in reader.deserialize::<Candle>().enumerate() {
        let candle = record.with_context(|| format!("{:?}: bad candle on row {}", path, row + 2))?;
        candles.push(candle);
    }

    Ok(normalize(candles))
}
