//! Hand-built candle series shared by the tests
//!
//! HTF swing highs 10, 9, 12 around a swing low of 8 give one bullish BOS at
//! 10 with a discount level of 10. The MTF series holds two bearish candles
//! under that level (22500 and 27000). The LTF series drops into the first
//! zone, bounces off 9.16, breaks the 9.96 lower high at 40420 and later rallies
//! to 11.0, so a long from 9.72 with a 9.16 stop wins at 1R and 2R but not 3R.

use crate::data::MarketData;
use crate::types::Candle;

pub const HOUR: i64 = 3600;

fn hl(time: i64, high: f64, low: f64) -> Candle {
    let mid = (high + low) / 2.0;
    Candle { time, open: mid, high, low, close: mid }
}

/// Hourly candles; `prior_low` is the swing low before the first leg
pub fn htf(prior_low: f64) -> Vec<Candle> {
    let rows = [
        (9.0, 8.6),
        (9.2, prior_low),
        (9.5, 8.8),
        (9.6, 8.95),
        (10.0, 8.7), // swing high 10
        (9.5, 8.5),
        (8.8, 8.0), // swing low 8
        (9.0, 8.4), // swing high 9
        (8.9, 8.5),
        (12.0, 9.0), // swing high 12
        (11.0, 10.0),
    ];
    rows.iter()
        .enumerate()
        .map(|(i, (h, l))| hl(i as i64 * HOUR, *h, *l))
        .collect()
}

/// 15 minute candles
pub fn mtf() -> Vec<Candle> {
    (0..=44)
        .map(|i| {
            let time = i * 900;
            match time {
                // Before the leg
                20700 => Candle { time, open: 9.4, high: 9.5, low: 9.0, close: 9.1 },
                // In the discount zone
                22500 => Candle { time, open: 9.7, high: 9.8, low: 9.0, close: 9.1 },
                // Crosses the discount level
                23400 => Candle { time, open: 10.4, high: 10.5, low: 9.5, close: 9.6 },
                27000 => Candle { time, open: 9.5, high: 9.6, low: 9.1, close: 9.2 },
                // Closes the gap after 27000
                28800 => Candle { time, open: 9.8, high: 10.0, low: 9.5, close: 9.8 },
                _ => Candle { time, open: 11.0, high: 11.5, low: 10.5, close: 11.0 },
            }
        })
        .collect()
}

/// 1 minute candles after both zones have formed
pub fn ltf() -> Vec<Candle> {
    let rows = [
        (10.44, 10.6, 10.28, 10.36), // above the zones
        (9.88, 9.928, 9.64, 9.72),   // touches [9.0, 9.8]
        (9.72, 9.96, 9.48, 9.56),    // local high 9.96
        (9.56, 9.64, 9.16, 9.24),    // local low 9.16
        (9.32, 9.704, 9.24, 9.56),
        (9.64, 9.72, 9.4, 9.48),     // bearish order block, high 9.72
        (9.48, 10.12, 9.448, 10.088), // CHoCH through 9.96
        (10.0, 10.1, 9.7, 9.9),
        (9.9, 11.0, 9.85, 10.9),
    ];
    rows.iter()
        .enumerate()
        .map(|(i, (o, h, l, c))| Candle {
            time: 40_000 + (i as i64 + 1) * 60,
            open: *o,
            high: *h,
            low: *l,
            close: *c,
        })
        .collect()
}

/// Reflect prices around 10 so every bullish structure becomes bearish.
/// Bullish candles turn bearish and highs swap with lows.
pub fn mirror(candles: &[Candle]) -> Vec<Candle> {
    candles
        .iter()
        .map(|c| Candle {
            time: c.time,
            open: 20.0 - c.open,
            high: 20.0 - c.low,
            low: 20.0 - c.high,
            close: 20.0 - c.close,
        })
        .collect()
}

pub fn market_data() -> MarketData {
    MarketData::new(htf(8.3), mtf(), ltf())
}
