use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use smc_backtester::backtest::{self, run_backtest};
use smc_backtester::optimizer::{self, Metric, OptimizationGrid};
use smc_backtester::{smc, MarketData, Settings, SlType};

#[derive(Parser, Debug)]
#[command(name = "smc")]
#[command(about = "Smart Money Concept structure analysis, backtesting and optimization")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect BOS, POIs, CHoCH and trade signals
    Analyze {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Output directory for results
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// Analyze, then simulate the signals on the LTF series
    Backtest {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Output directory for results
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// Sweep a parameter grid and rank the backtests
    Optimize {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        settings: SettingsArgs,

        /// JSON grid of swept fields and ranges
        #[arg(short, long)]
        grid: PathBuf,

        /// Metric to rank runs by
        #[arg(short, long, value_enum, default_value = "net-profit-percent")]
        metric: Metric,

        /// Number of top runs to print
        #[arg(long, default_value = "10")]
        top: usize,

        /// Output directory for results
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },
}

/// Candle CSVs, one per timeframe
#[derive(ClapArgs, Debug)]
struct DataArgs {
    /// High timeframe candles (structure)
    #[arg(long, env = "SMC_HTF_CSV")]
    htf: PathBuf,

    /// Medium timeframe candles (order blocks)
    #[arg(long, env = "SMC_MTF_CSV")]
    mtf: PathBuf,

    /// Low timeframe candles (entries and simulation)
    #[arg(long, env = "SMC_LTF_CSV")]
    ltf: PathBuf,
}

/// Settings file plus per-field overrides
#[derive(ClapArgs, Debug)]
struct SettingsArgs {
    /// JSON settings file; missing fields use defaults
    #[arg(short, long, env = "SMC_SETTINGS")]
    settings: Option<PathBuf>,

    #[arg(long)]
    htf_swing_lookback: Option<usize>,

    #[arg(long)]
    ltf_choch_lookback: Option<usize>,

    /// Fraction of the impulse leg counted as discount/premium
    #[arg(long)]
    discount_zone: Option<f64>,

    /// Require a liquidity sweep before the impulse
    #[arg(long)]
    liquidity_sweep: bool,

    /// Require a fair value gap after the order block
    #[arg(long)]
    fvg_filter: bool,

    #[arg(long, value_enum)]
    sl_type: Option<SlType>,

    #[arg(long)]
    fixed_sl_percent: Option<f64>,

    /// Take-profit as a multiple of risk
    #[arg(long)]
    rr_ratio: Option<f64>,

    #[arg(long)]
    initial_capital: Option<f64>,

    /// Equity percent risked per trade
    #[arg(long)]
    order_size_percent: Option<f64>,

    /// Commission per side, percent of notional
    #[arg(long)]
    commission_percent: Option<f64>,

    /// Skip trades whose target does not cover commission
    #[arg(long)]
    filter_by_commission: bool,
}

impl SettingsArgs {
    fn resolve(&self) -> Result<Settings> {
        let mut s = match &self.settings {
            Some(path) => Settings::from_json_file(path)?,
            None => Settings::default(),
        };

        if let Some(v) = self.htf_swing_lookback {
            s.htf_swing_lookback = v;
        }
        if let Some(v) = self.ltf_choch_lookback {
            s.ltf_choch_lookback = v;
        }
        if let Some(v) = self.discount_zone {
            s.discount_zone = v;
        }
        if let Some(v) = self.sl_type {
            s.sl_type = v;
        }
        if let Some(v) = self.fixed_sl_percent {
            s.fixed_sl_percent = v;
        }
        if let Some(v) = self.rr_ratio {
            s.rr_ratio = v;
        }
        if let Some(v) = self.initial_capital {
            s.initial_capital = v;
        }
        if let Some(v) = self.order_size_percent {
            s.order_size_percent = v;
        }
        if let Some(v) = self.commission_percent {
            s.commission_percent = v;
        }
        s.use_liquidity_sweep |= self.liquidity_sweep;
        s.use_fvg_filter |= self.fvg_filter;
        s.filter_by_commission |= self.filter_by_commission;

        s.validate()?;
        Ok(s)
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Commands::Analyze { data, settings, output_dir } => {
            run_analyze(&data, &settings.resolve()?, &output_dir)?;
        }
        Commands::Backtest { data, settings, output_dir } => {
            run_backtest_mode(&data, &settings.resolve()?, &output_dir)?;
        }
        Commands::Optimize { data, settings, grid, metric, top, output_dir } => {
            run_optimize(&data, &settings.resolve()?, &grid, metric, top, &output_dir)?;
        }
    }

    Ok(())
}

fn load_data(args: &DataArgs) -> Result<MarketData> {
    info!("HTF: {:?}", args.htf);
    info!("MTF: {:?}", args.mtf);
    info!("LTF: {:?}", args.ltf);
    let data = MarketData::from_csv_files(&args.htf, &args.mtf, &args.ltf)?;
    if data.ltf.is_empty() {
        anyhow::bail!("No LTF candles in {:?}", args.ltf);
    }
    Ok(data)
}

fn write_json<T: Serialize>(output_dir: &Path, name: &str, value: &T) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(name);
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, json)?;
    info!("Wrote results to {:?}", path);
    Ok(())
}

fn run_analyze(data_args: &DataArgs, settings: &Settings, output_dir: &Path) -> Result<()> {
    info!("=== ANALYZE MODE ===");
    let data = load_data(data_args)?;

    let analysis = smc::analyze(&data, settings);
    for signal in &analysis.signals {
        println!(
            "{} {} entry {:.5} SL {:.5} TP {:.5}",
            signal.entry_time, signal.direction, signal.entry_price, signal.stop_loss, signal.take_profit
        );
    }

    write_json(output_dir, "analysis.json", &analysis)?;
    info!("Analysis complete!");
    Ok(())
}

fn run_backtest_mode(data_args: &DataArgs, settings: &Settings, output_dir: &Path) -> Result<()> {
    info!("=== BACKTEST MODE ===");
    info!(
        "RR {:.2}, risk {:.2}%, commission {:.3}%, stop {}",
        settings.rr_ratio, settings.order_size_percent, settings.commission_percent, settings.sl_type
    );
    let data = load_data(data_args)?;

    let analysis = smc::analyze(&data, settings);
    let results = run_backtest(&data.ltf, &analysis.signals, settings, None);

    backtest::print_results(&results);
    write_json(output_dir, "backtest_results.json", &results)?;

    info!("Backtest complete!");
    Ok(())
}

fn run_optimize(
    data_args: &DataArgs,
    base: &Settings,
    grid_path: &Path,
    metric: Metric,
    top: usize,
    output_dir: &Path,
) -> Result<()> {
    info!("=== OPTIMIZE MODE ===");
    let grid = OptimizationGrid::from_json_file(grid_path)?;
    info!("Grid: {} combinations", grid.combination_count());

    let data = load_data(data_args)?;
    let results = optimizer::optimize(&data, base, &grid, metric)?;

    optimizer::print_top_runs(&results, top);
    write_json(output_dir, "optimization_results.json", &results)?;

    if let Some(best) = results.best_settings(base) {
        write_json(output_dir, "best_settings.json", &best)?;
    }

    info!("Optimization complete!");
    Ok(())
}
