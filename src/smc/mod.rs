//! Smart Money Concept analysis
//!
//! - Swing detection on any timeframe
//! - HTF structure breaks and the MTF order blocks (POIs) they leave behind
//! - LTF entry tracking: POI touch, invalidation, CHoCH, trade signal

pub mod swings;
pub mod structure;
pub mod entry;

pub use swings::{find_swings, Swings};
pub use structure::{analyze_structure, zone_level, StructureAnalysis};
pub use entry::{step, track_entries, EntryOutput, TrackerState};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::MarketData;
use crate::settings::Settings;
use crate::types::{Annotation, TradeSignal};

/// Result of the analysis stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmcAnalysis {
    /// Signals in entry-time order
    pub signals: Vec<TradeSignal>,
    /// BOS, CHoCH and POI events ordered by time
    pub annotations: Vec<Annotation>,
}

/// Structure pass over HTF/MTF, then entry tracking over LTF
pub fn analyze(data: &MarketData, settings: &Settings) -> SmcAnalysis {
    let structure = analyze_structure(&data.htf, &data.mtf, settings);
    let entries = track_entries(&data.ltf, &structure.pois, settings);

    let mut annotations = structure.annotations();
    annotations.extend(entries.chochs.iter().map(|c| Annotation::Choch(*c)));
    annotations.sort_by_key(|a| a.time());

    let mut signals = entries.signals;
    signals.sort_by_key(|s| s.entry_time);

    info!(
        "Analysis: {} POIs, {} CHoCH, {} signals",
        structure.pois.len(),
        entries.chochs.len(),
        signals.len()
    );

    SmcAnalysis { signals, annotations }
}
