//! Swing point detection
//!
//! A candle is a swing high when its high is strictly above every high within
//! `lookback` candles on both sides; swing lows mirror that on lows. Equal
//! neighbours disqualify the candidate.

use crate::types::{Candle, SwingKind, SwingPoint};

/// Swing highs and lows of one series, each in time order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Swings {
    pub highs: Vec<SwingPoint>,
    pub lows: Vec<SwingPoint>,
}

/// Find swing highs and lows. Series shorter than `2 * lookback + 1` give
/// empty lists.
pub fn find_swings(candles: &[Candle], lookback: usize) -> Swings {
    let mut swings = Swings::default();

    if lookback == 0 || candles.len() < 2 * lookback + 1 {
        return swings;
    }

    for i in lookback..candles.len() - lookback {
        let c = &candles[i];
        let window = candles[i - lookback..=i + lookback]
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != lookback);

        let (mut is_high, mut is_low) = (true, true);
        for (_, other) in window {
            if other.high >= c.high {
                is_high = false;
            }
            if other.low <= c.low {
                is_low = false;
            }
            if !is_high && !is_low {
                break;
            }
        }

        if is_high {
            swings.highs.push(SwingPoint { time: c.time, price: c.high, kind: SwingKind::High });
        }
        if is_low {
            swings.lows.push(SwingPoint { time: c.time, price: c.low, kind: SwingKind::Low });
        }
    }

    swings
}
