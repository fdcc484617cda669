//! LTF entry tracking
//!
//! Walks the low-timeframe candles with an explicit state value:
//! 1. IDLE - wait for price to touch the next active POI
//! 2. MONITORING - buffer candles since the touch, drop the POI if price
//!    trades through its far edge, otherwise wait for a local change of
//!    character against the move into the zone
//! 3. On CHoCH, the nearest opposite candle of the breaking leg is the entry
//!    order block; a signal is emitted if the risk is valid, then back to IDLE
//!
//! A POI is consumed on first touch whether or not it produces a trade.

use std::collections::HashSet;
use tracing::debug;

use super::swings::find_swings;
use crate::settings::{Settings, SlType};
use crate::types::{Candle, Choch, Direction, Poi, SwingPoint, TradeSignal};

/// Tracker state between candles
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerState {
    Idle,
    Monitoring {
        poi: Poi,
        /// LTF candles since the touch, touch candle first
        buffer: Vec<Candle>,
    },
}

impl std::fmt::Display for TrackerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerState::Idle => write!(f, "IDLE"),
            TrackerState::Monitoring { .. } => write!(f, "MONITORING"),
        }
    }
}

/// Everything the tracker found
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryOutput {
    pub signals: Vec<TradeSignal>,
    pub chochs: Vec<Choch>,
}

/// Run the tracker over `ltf` against the given POIs
pub fn track_entries(ltf: &[Candle], pois: &[Poi], settings: &Settings) -> EntryOutput {
    let mut active: Vec<Poi> = pois.to_vec();
    active.sort_by_key(|p| p.start_time);

    let mut out = EntryOutput::default();
    let mut seen_entries = HashSet::new();
    let mut state = TrackerState::Idle;

    for candle in ltf {
        let (next, event) = step(state, candle, &mut active, settings);
        state = next;

        if let Some((choch, signal)) = event {
            out.chochs.push(choch);
            if let Some(signal) = signal {
                // First signal for an entry time wins
                if seen_entries.insert(signal.entry_time) {
                    debug!(
                        "Signal {} @ {:.5} SL {:.5} TP {:.5} at {}",
                        signal.direction,
                        signal.entry_price,
                        signal.stop_loss,
                        signal.take_profit,
                        signal.entry_time
                    );
                    out.signals.push(signal);
                }
            }
        }
    }

    out
}

/// Advance the tracker by one candle. Returns the next state and, when a
/// CHoCH fired, the CHoCH with its signal (if the risk was valid).
pub fn step(
    state: TrackerState,
    candle: &Candle,
    active: &mut Vec<Poi>,
    settings: &Settings,
) -> (TrackerState, Option<(Choch, Option<TradeSignal>)>) {
    match state {
        TrackerState::Idle => match take_touched(active, candle) {
            Some(poi) => {
                debug!(
                    "Entered {} POI [{:.5}, {:.5}] at {}",
                    poi.direction, poi.bottom, poi.top, candle.time
                );
                (TrackerState::Monitoring { poi, buffer: vec![*candle] }, None)
            }
            None => (TrackerState::Idle, None),
        },
        TrackerState::Monitoring { poi, mut buffer } => {
            buffer.push(*candle);

            let invalidated = match poi.direction {
                Direction::Bullish => candle.low < poi.bottom,
                Direction::Bearish => candle.high > poi.top,
            };
            if invalidated {
                debug!("POI {} invalidated at {}", poi.start_time, candle.time);
                return (TrackerState::Idle, None);
            }

            let lookback = settings.ltf_choch_lookback;
            if buffer.len() < 2 * lookback + 1 {
                return (TrackerState::Monitoring { poi, buffer }, None);
            }

            match detect_choch(&buffer, poi.direction, lookback) {
                Some((choch, leg_start)) => {
                    debug!("CHoCH {} through {:.5} at {}", choch.direction, choch.price, choch.time);
                    let signal = build_signal(&buffer, &choch, &leg_start, settings);
                    (TrackerState::Idle, Some((choch, signal)))
                }
                None => (TrackerState::Monitoring { poi, buffer }, None),
            }
        }
    }
}

/// Remove and return the first active POI (by start time) that has started
/// and overlaps the candle
fn take_touched(active: &mut Vec<Poi>, candle: &Candle) -> Option<Poi> {
    let idx = active
        .iter()
        .take_while(|p| p.start_time <= candle.time)
        .position(|p| candle.overlaps(p.top, p.bottom))?;
    Some(active.remove(idx))
}

/// CHoCH on the last buffered candle, with the swing that started the
/// breaking leg
fn detect_choch(buffer: &[Candle], direction: Direction, lookback: usize) -> Option<(Choch, SwingPoint)> {
    let current = buffer.last()?;
    let swings = find_swings(buffer, lookback);

    let (level, leg_pool) = match direction {
        Direction::Bullish => {
            let last_high = swings.highs.last()?;
            if current.high <= last_high.price {
                return None;
            }
            (last_high.price, swings.lows)
        }
        Direction::Bearish => {
            let last_low = swings.lows.last()?;
            if current.low >= last_low.price {
                return None;
            }
            (last_low.price, swings.highs)
        }
    };

    let leg_start = leg_pool.into_iter().rev().find(|s| s.time < current.time)?;
    Some((Choch { time: current.time, price: level, direction }, leg_start))
}

/// Entry at the nearest opposite candle of the breaking leg
fn build_signal(
    buffer: &[Candle],
    choch: &Choch,
    leg_start: &SwingPoint,
    settings: &Settings,
) -> Option<TradeSignal> {
    let start_idx = buffer.iter().position(|c| c.time == leg_start.time)?;
    let leg = &buffer[start_idx..];

    let order_block = leg.iter().rev().find(|c| match choch.direction {
        Direction::Bullish => c.is_bearish(),
        Direction::Bearish => c.is_bullish(),
    })?;

    let entry = match choch.direction {
        Direction::Bullish => order_block.high,
        Direction::Bearish => order_block.low,
    };

    let stop = match (settings.sl_type, choch.direction) {
        (SlType::Structure, _) => leg_start.price,
        (SlType::Fixed, Direction::Bullish) => entry * (1.0 - settings.fixed_sl_percent / 100.0),
        (SlType::Fixed, Direction::Bearish) => entry * (1.0 + settings.fixed_sl_percent / 100.0),
    };

    let risk = (entry - stop).abs();
    if !(risk > 0.0) {
        debug!("Skipping CHoCH at {}: risk {:.5}", choch.time, risk);
        return None;
    }

    let take_profit = match choch.direction {
        Direction::Bullish => entry + risk * settings.rr_ratio,
        Direction::Bearish => entry - risk * settings.rr_ratio,
    };

    Some(TradeSignal {
        entry_time: choch.time,
        entry_price: entry,
        stop_loss: stop,
        take_profit,
        direction: choch.direction,
    })
}
