//! Parameter grid optimizer
//!
//! Expands a grid of swept settings into every combination, runs the full
//! analysis and backtest for each on the rayon pool and ranks the runs by a
//! chosen metric. Grids over [`MAX_COMBINATIONS`] are rejected before any run.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::backtest::{run_backtest, BacktestResult};
use crate::data::MarketData;
use crate::error::{Error, Result, MAX_COMBINATIONS};
use crate::settings::{ParamOverride, Settings, SweepKey};
use crate::smc;

/// Tolerance on the end bound so `0.1 + 0.1 + 0.1` still reaches `0.3`
const RANGE_EPSILON: f64 = 1e-9;

/// Inclusive arithmetic range for one swept field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamRange {
    /// Disabled fields stay at the base settings value
    pub enabled: bool,
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl Default for ParamRange {
    fn default() -> Self {
        Self {
            enabled: true,
            start: 0.0,
            end: 0.0,
            step: 1.0,
        }
    }
}

impl ParamRange {
    /// Number of values without materializing them
    pub fn len(&self) -> usize {
        if !self.step.is_finite() || self.step <= 0.0 {
            return 1;
        }
        if self.end < self.start {
            return 0;
        }
        let count = ((self.end - self.start) / self.step + RANGE_EPSILON).floor() + 1.0;
        // Unbounded ranges saturate so the combination cap rejects them
        if count.is_finite() && count < usize::MAX as f64 {
            count as usize
        } else {
            usize::MAX
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `start + i * step` up to and including `end`. A non-positive step
    /// yields only `start`.
    pub fn values(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| self.start + i as f64 * self.step)
            .collect()
    }
}

/// One grid axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridParam {
    pub key: SweepKey,
    #[serde(flatten)]
    pub range: ParamRange,
}

/// Swept fields and their ranges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationGrid {
    pub params: Vec<GridParam>,
}

impl OptimizationGrid {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading grid file {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing grid file {:?}", path))
    }

    /// Add an enabled axis
    pub fn with(mut self, key: SweepKey, start: f64, end: f64, step: f64) -> Self {
        self.params.push(GridParam {
            key,
            range: ParamRange { enabled: true, start, end, step },
        });
        self
    }

    fn enabled(&self) -> impl Iterator<Item = &GridParam> {
        self.params.iter().filter(|p| p.range.enabled)
    }

    /// Size of the cartesian product over enabled axes; 0 when none are enabled
    pub fn combination_count(&self) -> usize {
        let mut axes = self.enabled().peekable();
        if axes.peek().is_none() {
            return 0;
        }
        axes.fold(1usize, |acc, p| acc.saturating_mul(p.range.len()))
    }

    /// Every combination, last axis varying fastest
    pub fn combinations(&self) -> Result<Vec<Vec<ParamOverride>>> {
        if let Some(p) = self.enabled().find(|p| p.range.start.is_nan() || p.range.end.is_nan()) {
            return Err(Error::InvalidSettings {
                field: p.key.name(),
                reason: "sweep bounds must be numbers".to_string(),
            });
        }

        let count = self.combination_count();
        if count > MAX_COMBINATIONS {
            return Err(Error::TooManyCombinations { count, limit: MAX_COMBINATIONS });
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let axes: Vec<(SweepKey, Vec<f64>)> = self
            .enabled()
            .map(|p| (p.key, p.range.values()))
            .collect();

        let mut combos = Vec::with_capacity(count);
        let mut idx = vec![0usize; axes.len()];
        loop {
            combos.push(
                axes.iter()
                    .zip(&idx)
                    .map(|((key, values), &i)| ParamOverride { key: *key, value: values[i] })
                    .collect(),
            );

            // Odometer carry from the last axis
            let mut pos = axes.len();
            loop {
                if pos == 0 {
                    return Ok(combos);
                }
                pos -= 1;
                idx[pos] += 1;
                if idx[pos] < axes[pos].1.len() {
                    break;
                }
                idx[pos] = 0;
            }
        }
    }
}

/// Ranking target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    NetProfitPercent,
    WinRate,
    ProfitFactor,
    MaxDrawdown,
    MaxDrawdownAmount,
    FinalEquity,
    TotalTrades,
}

impl Metric {
    /// Lower is better
    pub fn is_ascending(&self) -> bool {
        matches!(self, Metric::MaxDrawdown | Metric::MaxDrawdownAmount)
    }

    pub fn value(&self, result: &BacktestResult) -> f64 {
        match self {
            Metric::NetProfitPercent => result.net_profit_percent,
            Metric::WinRate => result.win_rate,
            Metric::ProfitFactor => result.profit_factor,
            Metric::MaxDrawdown => result.max_drawdown,
            Metric::MaxDrawdownAmount => result.max_drawdown_amount,
            Metric::FinalEquity => result.final_equity,
            Metric::TotalTrades => result.total_trades as f64,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::NetProfitPercent => write!(f, "Net Profit %"),
            Metric::WinRate => write!(f, "Win Rate"),
            Metric::ProfitFactor => write!(f, "Profit Factor"),
            Metric::MaxDrawdown => write!(f, "Max Drawdown %"),
            Metric::MaxDrawdownAmount => write!(f, "Max Drawdown"),
            Metric::FinalEquity => write!(f, "Final Equity"),
            Metric::TotalTrades => write!(f, "Total Trades"),
        }
    }
}

/// One grid point and its backtest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRun {
    /// Position in grid expansion order
    pub id: usize,
    pub params: Vec<ParamOverride>,
    pub result: BacktestResult,
}

/// All runs, best first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResults {
    pub metric: Metric,
    pub runs: Vec<OptimizationRun>,
    pub best: Option<OptimizationRun>,
}

impl OptimizationResults {
    /// Base settings with the best run's overrides applied
    pub fn best_settings(&self, base: &Settings) -> Option<Settings> {
        self.best.as_ref().map(|run| base.with_overrides(&run.params))
    }
}

/// Analysis followed by the simulator on the same data
pub fn run_pipeline(data: &MarketData, settings: &Settings) -> BacktestResult {
    let analysis = smc::analyze(data, settings);
    run_backtest(&data.ltf, &analysis.signals, settings, None)
}

/// Run every grid combination against `data` and rank by `metric`
pub fn optimize(
    data: &MarketData,
    base: &Settings,
    grid: &OptimizationGrid,
    metric: Metric,
) -> Result<OptimizationResults> {
    // Reject out-of-range grid points before any run starts
    let combinations = grid
        .combinations()?
        .into_iter()
        .map(|params| -> Result<(Vec<ParamOverride>, Settings)> {
            let settings = base.with_overrides(&params);
            settings.validate()?;
            Ok((params, settings))
        })
        .collect::<Result<Vec<_>>>()?;
    let total = combinations.len();
    info!("Running {} parameter combinations ranked by {}", total, metric);

    let completed = AtomicUsize::new(0);
    let start = std::time::Instant::now();

    let mut runs: Vec<OptimizationRun> = combinations
        .into_par_iter()
        .enumerate()
        .map(|(id, (params, settings))| {
            let result = run_pipeline(data, &settings);

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % 50 == 0 || done == total {
                info!("[{}/{}] {:.1}s elapsed", done, total, start.elapsed().as_secs_f64());
            }
            debug!("Run {}: {} trades, {:+.2}%", id, result.total_trades, result.net_profit_percent);

            OptimizationRun { id, params, result }
        })
        .collect();

    rank_runs(&mut runs, metric);
    let best = runs.first().cloned();

    if let Some(b) = &best {
        info!(
            "Best run {} ({} = {:.2}) in {:.1}s",
            b.id,
            metric,
            metric.value(&b.result),
            start.elapsed().as_secs_f64()
        );
    }

    Ok(OptimizationResults { metric, runs, best })
}

/// Best first by `metric`, ties by id
pub fn rank_runs(runs: &mut [OptimizationRun], metric: Metric) {
    runs.sort_by(|a, b| {
        let (va, vb) = (metric.value(&a.result), metric.value(&b.result));
        let ord = if metric.is_ascending() { va.total_cmp(&vb) } else { vb.total_cmp(&va) };
        ord.then(a.id.cmp(&b.id))
    });
}

fn describe(params: &[ParamOverride]) -> String {
    params
        .iter()
        .map(|p| {
            if p.key.is_integer() {
                format!("{}={}", p.key, p.value.round())
            } else {
                format!("{}={:.3}", p.key, p.value)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Print the top `n` runs
pub fn print_top_runs(results: &OptimizationResults, n: usize) {
    println!("\n=== OPTIMIZATION SUMMARY ===");
    println!("Total combinations: {}", results.runs.len());
    println!("Ranked by: {}", results.metric);

    println!("\nTop {}:", n.min(results.runs.len()));
    for (rank, run) in results.runs.iter().take(n).enumerate() {
        let r = &run.result;
        println!(
            "  {}. #{} P&L={:+.2}% PF={:.2} WR={:.1}% DD={:.2}% Trades={}",
            rank + 1,
            run.id,
            r.net_profit_percent,
            r.profit_factor,
            r.win_rate,
            r.max_drawdown,
            r.total_trades
        );
        println!("     {}", describe(&run.params));
    }
}
