// Library crate - SMC structure analysis, backtesting and parameter optimization

pub mod types;
pub mod error;
pub mod settings;
pub mod data;
pub mod smc;
pub mod backtest;
pub mod optimizer;

#[cfg(test)]
mod fixtures;

// Re-export commonly used types
pub use types::*;
pub use error::{Error, Result, MAX_COMBINATIONS};
pub use settings::{ParamOverride, Settings, SlType, SweepKey};
pub use data::MarketData;
pub use smc::{analyze, SmcAnalysis};
pub use backtest::{run_backtest, BacktestResult, ExecutedTrade, TradeOutcome};
pub use optimizer::{optimize, run_pipeline, Metric, OptimizationGrid, OptimizationResults, OptimizationRun};
