//! Shared market-structure types
//!
//! Everything here is plain data: candles come in from the caller, the rest is
//! derived by the analysis stage and handed back out for display.

use serde::{Deserialize, Serialize};

/// OHLC candle, `time` in epoch seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.open > self.close
    }

    /// True when `[bottom, top]` intersects this candle's range
    pub fn overlaps(&self, top: f64, bottom: f64) -> bool {
        bottom <= self.high && top >= self.low
    }
}

/// Direction of a structure event, zone or trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Bullish => write!(f, "LONG"),
            Direction::Bearish => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

/// Confirmed local extremum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub time: i64,
    pub price: f64,
    pub kind: SwingKind,
}

/// Break of structure: `price` is the swing level that was taken out,
/// `time` the swing that took it out
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bos {
    pub time: i64,
    pub price: f64,
    pub direction: Direction,
}

/// Change of character inside a monitored zone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Choch {
    pub time: i64,
    pub price: f64,
    pub direction: Direction,
}

/// Point of interest (order block) derived from an impulse leg
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub start_time: i64,
    pub end_time: i64,
    pub top: f64,
    pub bottom: f64,
    pub direction: Direction,
}

/// Entry order produced by the entry tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub entry_time: i64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub direction: Direction,
}

impl TradeSignal {
    pub fn risk(&self) -> f64 {
        (self.entry_price - self.stop_loss).abs()
    }
}

/// Drawable structure event for chart consumers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    Bos(Bos),
    Choch(Choch),
    Poi(Poi),
}

impl Annotation {
    /// Time used to order annotations on a chart
    pub fn time(&self) -> i64 {
        match self {
            Annotation::Bos(b) => b.time,
            Annotation::Choch(c) => c.time,
            Annotation::Poi(p) => p.start_time,
        }
    }
}
