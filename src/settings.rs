//! Strategy and backtest settings
//!
//! One flat struct covers the analysis stage (lookbacks, zone ratio, filters,
//! stop placement) and the simulator (capital, sizing, commission). The
//! optimizer clones it and overrides individual fields through [`SweepKey`].

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// How the entry tracker places the stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SlType {
    /// At the swing that started the CHoCH leg
    Structure,
    /// Fixed percent away from entry
    Fixed,
}

impl std::fmt::Display for SlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlType::Structure => write!(f, "structure"),
            SlType::Fixed => write!(f, "fixed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Swing lookback on the high timeframe (candles each side)
    pub htf_swing_lookback: usize,
    /// Swing lookback on the low timeframe for CHoCH detection
    pub ltf_choch_lookback: usize,
    /// Fraction of the impulse leg counted as discount/premium (0.5 = midpoint)
    pub discount_zone: f64,
    /// Require the impulse leg to sweep the prior swing
    pub use_liquidity_sweep: bool,
    /// Require a fair value gap after the order block candle
    pub use_fvg_filter: bool,
    pub sl_type: SlType,
    /// Stop distance in percent of entry when `sl_type` is fixed
    pub fixed_sl_percent: f64,
    /// Take-profit distance as a multiple of risk
    pub rr_ratio: f64,
    /// Starting equity for the simulator
    pub initial_capital: f64,
    /// Equity percent risked per trade
    pub order_size_percent: f64,
    /// Commission per side, percent of notional
    pub commission_percent: f64,
    /// Skip trades whose target profit does not cover round-trip commission
    pub filter_by_commission: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            htf_swing_lookback: 5,
            ltf_choch_lookback: 2,
            discount_zone: 0.5,         // Midpoint of the leg
            use_liquidity_sweep: false,
            use_fvg_filter: false,
            sl_type: SlType::Structure,
            fixed_sl_percent: 1.0,
            rr_ratio: 2.0,
            initial_capital: 10_000.0,
            order_size_percent: 1.0,    // 1% risk per trade
            commission_percent: 0.04,   // Typical perp taker fee
            filter_by_commission: false,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file; missing fields fall back to defaults
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {:?}", path))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("parsing settings file {:?}", path))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.htf_swing_lookback == 0 {
            return Err(invalid("htf_swing_lookback", "must be at least 1"));
        }
        if self.ltf_choch_lookback == 0 {
            return Err(invalid("ltf_choch_lookback", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.discount_zone) {
            return Err(invalid("discount_zone", format!("{} is outside [0, 1]", self.discount_zone)));
        }
        if !self.rr_ratio.is_finite() || self.rr_ratio <= 0.0 {
            return Err(invalid("rr_ratio", format!("{} must be positive", self.rr_ratio)));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(invalid("initial_capital", format!("{} must be positive", self.initial_capital)));
        }
        for (field, value) in [
            ("fixed_sl_percent", self.fixed_sl_percent),
            ("order_size_percent", self.order_size_percent),
            ("commission_percent", self.commission_percent),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, format!("{} must be a non-negative number", value)));
            }
        }
        Ok(())
    }

    /// Override one swept field
    pub fn apply(&mut self, key: SweepKey, value: f64) {
        match key {
            SweepKey::HtfSwingLookback => self.htf_swing_lookback = to_lookback(value),
            SweepKey::LtfChochLookback => self.ltf_choch_lookback = to_lookback(value),
            SweepKey::DiscountZone => self.discount_zone = value,
            SweepKey::RrRatio => self.rr_ratio = value,
            SweepKey::FixedSlPercent => self.fixed_sl_percent = value,
            SweepKey::OrderSizePercent => self.order_size_percent = value,
        }
    }

    /// Copy with a set of overrides applied in order
    pub fn with_overrides(&self, overrides: &[ParamOverride]) -> Self {
        let mut settings = self.clone();
        for o in overrides {
            settings.apply(o.key, o.value);
        }
        settings
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidSettings { field, reason: reason.into() }
}

fn to_lookback(value: f64) -> usize {
    value.round().max(1.0) as usize
}

/// Settings fields the optimizer can sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKey {
    HtfSwingLookback,
    LtfChochLookback,
    DiscountZone,
    RrRatio,
    FixedSlPercent,
    OrderSizePercent,
}

impl SweepKey {
    /// Field name as it appears in settings files
    pub fn name(&self) -> &'static str {
        match self {
            SweepKey::HtfSwingLookback => "htf_swing_lookback",
            SweepKey::LtfChochLookback => "ltf_choch_lookback",
            SweepKey::DiscountZone => "discount_zone",
            SweepKey::RrRatio => "rr_ratio",
            SweepKey::FixedSlPercent => "fixed_sl_percent",
            SweepKey::OrderSizePercent => "order_size_percent",
        }
    }

    /// Whether the field is an integer count
    pub fn is_integer(&self) -> bool {
        matches!(self, SweepKey::HtfSwingLookback | SweepKey::LtfChochLookback)
    }
}

impl std::fmt::Display for SweepKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Single swept value applied on top of base settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamOverride {
    pub key: SweepKey,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_zone() {
        let settings = Settings { discount_zone: 1.5, ..Default::default() };
        match settings.validate() {
            Err(Error::InvalidSettings { field, .. }) => assert_eq!(field, "discount_zone"),
            other => panic!("expected invalid discount_zone, got {:?}", other),
        }
    }

    #[test]
    fn test_overrides_round_lookbacks() {
        let base = Settings::default();
        let s = base.with_overrides(&[
            ParamOverride { key: SweepKey::HtfSwingLookback, value: 3.0000001 },
            ParamOverride { key: SweepKey::RrRatio, value: 3.5 },
        ]);
        assert_eq!(s.htf_swing_lookback, 3);
        assert_eq!(s.rr_ratio, 3.5);
        // Untouched fields keep base values
        assert_eq!(s.discount_zone, base.discount_zone);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s: Settings = serde_json::from_str(r#"{"rr_ratio": 3.0, "sl_type": "fixed"}"#).unwrap();
        assert_eq!(s.rr_ratio, 3.0);
        assert_eq!(s.sl_type, SlType::Fixed);
        assert_eq!(s.htf_swing_lookback, 5);
    }
}
