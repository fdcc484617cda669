//! HTF market structure: breaks of structure and the order-block POIs they imply
//!
//! Runs once over the whole high-timeframe history:
//! 1. Swing highs/lows on the HTF
//! 2. Each higher high over the current structural high is a bullish BOS
//!    (lower low under the structural low for bearish)
//! 3. The extreme opposite swing inside the leg is the impulse origin
//! 4. Opposite-coloured MTF candles in the discount (premium) part of the leg
//!    become POIs, optionally gated by a liquidity sweep and a fair value gap

use std::collections::HashSet;
use tracing::{debug, info};

use super::swings::{find_swings, Swings};
use crate::settings::Settings;
use crate::types::{Annotation, Bos, Candle, Direction, Poi, SwingPoint};

/// Output of the structure pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureAnalysis {
    pub bos: Vec<Bos>,
    pub pois: Vec<Poi>,
}

impl StructureAnalysis {
    pub fn annotations(&self) -> Vec<Annotation> {
        self.bos
            .iter()
            .map(|b| Annotation::Bos(*b))
            .chain(self.pois.iter().map(|p| Annotation::Poi(*p)))
            .collect()
    }
}

/// A structure break and the leg that produced it
#[derive(Debug, Clone, Copy)]
struct Leg {
    bos: Bos,
    /// Lowest low (bullish) or highest high (bearish) inside the leg
    origin: Option<SwingPoint>,
    /// Swing that broke structure
    extreme: SwingPoint,
}

/// Find all BOS events and POIs over the HTF/MTF history
pub fn analyze_structure(htf: &[Candle], mtf: &[Candle], settings: &Settings) -> StructureAnalysis {
    let swings = find_swings(htf, settings.htf_swing_lookback);

    let mut bos = Vec::new();
    let mut pois = Vec::new();

    for direction in [Direction::Bullish, Direction::Bearish] {
        for leg in structure_breaks(&swings, direction) {
            bos.push(leg.bos);

            let Some(origin) = leg.origin else {
                debug!("{} BOS at {} has no impulse origin", direction, leg.bos.time);
                continue;
            };

            if settings.use_liquidity_sweep && !swept_liquidity(&swings, &origin, direction) {
                debug!("{} leg at {} skipped: no liquidity sweep", direction, leg.bos.time);
                continue;
            }

            pois.extend(order_blocks(mtf, &leg, &origin, direction, settings));
        }
    }

    bos.sort_by_key(|b| b.time);
    let pois = dedup_pois(pois);

    info!(
        "Structure: {} HTF swings, {} BOS, {} POIs",
        swings.highs.len() + swings.lows.len(),
        bos.len(),
        pois.len()
    );

    StructureAnalysis { bos, pois }
}

/// Walk the breaking side's swings against a structural reference. Lower
/// highs (higher lows for bearish) never replace the reference.
fn structure_breaks(swings: &Swings, direction: Direction) -> Vec<Leg> {
    let (breaks, origins) = match direction {
        Direction::Bullish => (&swings.highs, &swings.lows),
        Direction::Bearish => (&swings.lows, &swings.highs),
    };

    let mut legs = Vec::new();
    let Some(mut reference) = breaks.first().copied() else {
        return legs;
    };

    for current in &breaks[1..] {
        let broke = match direction {
            Direction::Bullish => current.price > reference.price,
            Direction::Bearish => current.price < reference.price,
        };
        if !broke {
            continue;
        }

        let inside = origins
            .iter()
            .filter(|s| s.time > reference.time && s.time < current.time);
        let origin = match direction {
            Direction::Bullish => inside.min_by(|a, b| a.price.total_cmp(&b.price)),
            Direction::Bearish => inside.max_by(|a, b| a.price.total_cmp(&b.price)),
        };

        legs.push(Leg {
            bos: Bos { time: current.time, price: reference.price, direction },
            origin: origin.copied(),
            extreme: *current,
        });

        reference = *current;
    }

    legs
}

/// The impulse origin must take out the nearest earlier swing on its side
fn swept_liquidity(swings: &Swings, origin: &SwingPoint, direction: Direction) -> bool {
    let pool = match direction {
        Direction::Bullish => &swings.lows,
        Direction::Bearish => &swings.highs,
    };

    let prior = pool.iter().rev().find(|s| s.time < origin.time);
    match (prior, direction) {
        (Some(p), Direction::Bullish) => origin.price < p.price,
        (Some(p), Direction::Bearish) => origin.price > p.price,
        (None, _) => false,
    }
}

/// Discount level for bullish legs (origin = low), premium level for bearish
/// legs (origin = high)
pub fn zone_level(origin: f64, extreme: f64, discount_zone: f64) -> f64 {
    origin + (extreme - origin) * discount_zone
}

fn order_blocks(
    mtf: &[Candle],
    leg: &Leg,
    origin: &SwingPoint,
    direction: Direction,
    settings: &Settings,
) -> Vec<Poi> {
    let level = zone_level(origin.price, leg.extreme.price, settings.discount_zone);
    let start = mtf.partition_point(|c| c.time < origin.time);

    let mut pois = Vec::new();
    for (idx, c) in mtf.iter().enumerate().skip(start) {
        if c.time > leg.bos.time {
            break;
        }

        let candidate = match direction {
            Direction::Bullish => c.is_bearish() && c.high < level,
            Direction::Bearish => c.is_bullish() && c.low > level,
        };
        if !candidate {
            continue;
        }

        if settings.use_fvg_filter && !has_fair_value_gap(mtf, idx, direction) {
            continue;
        }

        pois.push(Poi {
            start_time: c.time,
            end_time: leg.bos.time,
            top: c.high,
            bottom: c.low,
            direction,
        });
    }

    debug!(
        "{} leg {} -> {}: level {:.5}, {} order blocks",
        direction,
        origin.time,
        leg.bos.time,
        level,
        pois.len()
    );

    pois
}

/// Three-candle imbalance starting at `idx`
fn has_fair_value_gap(mtf: &[Candle], idx: usize, direction: Direction) -> bool {
    let Some(third) = mtf.get(idx + 2) else {
        return false;
    };
    let first = &mtf[idx];
    match direction {
        Direction::Bullish => third.low > first.high,
        Direction::Bearish => third.high < first.low,
    }
}

/// Drop repeated (start_time, top, bottom) zones, keep the first, order by start
fn dedup_pois(pois: Vec<Poi>) -> Vec<Poi> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Poi> = pois
        .into_iter()
        .filter(|p| seen.insert((p.start_time, p.top.to_bits(), p.bottom.to_bits())))
        .collect();
    unique.sort_by_key(|p| p.start_time);
    unique
}
