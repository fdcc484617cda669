//! Backtest simulator
//!
//! Replays LTF candles against time-ordered trade signals with one position at
//! a time. Risk-based sizing: every trade risks `order_size_percent` of current
//! equity between entry and stop, wins pay `rr_ratio` times that, and a flat
//! round-trip commission on notional is charged on exit.
//!
//! When stop and target are both inside the same candle the stop is taken.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::settings::Settings;
use crate::types::{Candle, Direction, TradeSignal};

/// Trade outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
    /// Still running when the candles ran out
    Open,
}

impl std::fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeOutcome::Win => write!(f, "WIN"),
            TradeOutcome::Loss => write!(f, "LOSS"),
            TradeOutcome::Open => write!(f, "OPEN"),
        }
    }
}

/// A filled signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedTrade {
    pub direction: Direction,
    /// Time the signal was generated
    pub signal_time: i64,
    /// Time of the candle that filled it
    pub entry_time: i64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub exit_time: Option<i64>,
    pub exit_price: Option<f64>,
    pub outcome: TradeOutcome,
    /// Units bought or sold
    pub position_size: f64,
    /// Notional at entry
    pub position_value: f64,
    pub leverage: u64,
    /// Equity at risk between entry and stop
    pub risk_amount: f64,
    pub equity_at_entry: f64,
    /// Round-trip commission charged on exit
    pub commission: f64,
    /// Net of commission
    pub pnl: f64,
    /// PnL over margin used, percent
    pub roe: f64,
}

/// Aggregate performance of one backtest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub trades: Vec<ExecutedTrade>,
    /// Largest peak-to-trough equity drop, percent of the peak
    pub max_drawdown: f64,
    pub max_drawdown_amount: f64,
    pub net_profit_percent: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub final_equity: f64,
    /// Closed trades
    pub total_trades: usize,
}

impl BacktestResult {
    /// Result with no closed trades
    pub fn empty(trades: Vec<ExecutedTrade>, initial_capital: f64) -> Self {
        Self {
            trades,
            max_drawdown: 0.0,
            max_drawdown_amount: 0.0,
            net_profit_percent: 0.0,
            win_rate: 0.0,
            profit_factor: 0.0,
            final_equity: initial_capital,
            total_trades: 0,
        }
    }

    pub fn closed_trades(&self) -> impl Iterator<Item = &ExecutedTrade> {
        self.trades.iter().filter(|t| t.outcome != TradeOutcome::Open)
    }
}

/// Running account state while replaying
struct Simulator<'a> {
    settings: &'a Settings,
    initial_capital: f64,
    equity: f64,
    peak: f64,
    max_drawdown: f64,
    max_drawdown_amount: f64,
    pending: VecDeque<TradeSignal>,
    trades: Vec<ExecutedTrade>,
    /// Index into `trades` of the open position
    active: Option<usize>,
}

impl<'a> Simulator<'a> {
    fn new(signals: &[TradeSignal], settings: &'a Settings, initial_capital: f64) -> Self {
        let mut pending: Vec<TradeSignal> = signals.to_vec();
        pending.sort_by_key(|s| s.entry_time);

        Self {
            settings,
            initial_capital,
            equity: initial_capital,
            peak: initial_capital,
            max_drawdown: 0.0,
            max_drawdown_amount: 0.0,
            pending: pending.into(),
            trades: Vec::new(),
            active: None,
        }
    }

    fn process_candle(&mut self, candle: &Candle) {
        if let Some(idx) = self.active {
            self.check_exit(idx, candle);
        }
        if self.active.is_none() {
            self.try_entry(candle);
        }
    }

    /// Stop first, then target
    fn check_exit(&mut self, idx: usize, candle: &Candle) {
        let trade = &self.trades[idx];
        let (stop_hit, target_hit) = match trade.direction {
            Direction::Bullish => (candle.low <= trade.stop_loss, candle.high >= trade.take_profit),
            Direction::Bearish => (candle.high >= trade.stop_loss, candle.low <= trade.take_profit),
        };

        let (outcome, exit_price, gross) = if stop_hit {
            (TradeOutcome::Loss, trade.stop_loss, -trade.risk_amount)
        } else if target_hit {
            (TradeOutcome::Win, trade.take_profit, trade.risk_amount * self.settings.rr_ratio)
        } else {
            return;
        };

        let commission = round_trip_commission(trade.position_value, self.settings.commission_percent);
        let pnl = gross - commission;
        let margin = trade.position_value / trade.leverage as f64;

        self.equity += pnl;
        self.peak = self.peak.max(self.equity);
        let drawdown = self.peak - self.equity;
        self.max_drawdown_amount = self.max_drawdown_amount.max(drawdown);
        if self.peak > 0.0 {
            self.max_drawdown = self.max_drawdown.max(drawdown / self.peak * 100.0);
        }

        let trade = &mut self.trades[idx];
        trade.exit_time = Some(candle.time);
        trade.exit_price = Some(exit_price);
        trade.outcome = outcome;
        trade.commission = commission;
        trade.pnl = pnl;
        trade.roe = if margin > 0.0 { pnl / margin * 100.0 } else { 0.0 };
        self.active = None;

        debug!(
            "{} {} closed at {:.5} ({}): pnl {:+.2}, equity {:.2}",
            trade.direction, trade.entry_time, exit_price, outcome, pnl, self.equity
        );
    }

    /// Fill the first pending signal whose entry is inside the candle
    fn try_entry(&mut self, candle: &Candle) {
        if self.equity <= 0.0 {
            return;
        }

        let mut i = 0;
        while i < self.pending.len() {
            let signal = self.pending[i];
            if signal.entry_time > candle.time {
                break;
            }
            if !(candle.low <= signal.entry_price && signal.entry_price <= candle.high) {
                i += 1;
                continue;
            }

            let distance = signal.risk();
            if !(distance > 0.0) {
                self.pending.remove(i);
                continue;
            }

            let risk_amount = self.equity * self.settings.order_size_percent / 100.0;
            let position_size = risk_amount / distance;
            let position_value = position_size * signal.entry_price;
            let commission = round_trip_commission(position_value, self.settings.commission_percent);

            if self.settings.filter_by_commission && risk_amount * self.settings.rr_ratio <= commission {
                debug!(
                    "Signal at {} skipped: target {:.2} does not cover commission {:.2}",
                    signal.entry_time,
                    risk_amount * self.settings.rr_ratio,
                    commission
                );
                self.pending.remove(i);
                continue;
            }

            let leverage = leverage_for(position_value, self.equity);

            self.pending.remove(i);
            self.trades.push(ExecutedTrade {
                direction: signal.direction,
                signal_time: signal.entry_time,
                entry_time: candle.time,
                entry_price: signal.entry_price,
                stop_loss: signal.stop_loss,
                take_profit: signal.take_profit,
                exit_time: None,
                exit_price: None,
                outcome: TradeOutcome::Open,
                position_size,
                position_value,
                leverage,
                risk_amount,
                equity_at_entry: self.equity,
                commission: 0.0,
                pnl: 0.0,
                roe: 0.0,
            });
            self.active = Some(self.trades.len() - 1);

            debug!(
                "{} opened at {:.5} (size {:.4}, {}x) on {}",
                signal.direction, signal.entry_price, position_size, leverage, candle.time
            );
            return;
        }
    }

    fn finish(self) -> BacktestResult {
        let closed: Vec<&ExecutedTrade> = self
            .trades
            .iter()
            .filter(|t| t.outcome != TradeOutcome::Open)
            .collect();

        if closed.is_empty() {
            return BacktestResult::empty(self.trades, self.initial_capital);
        }

        let wins = closed.iter().filter(|t| t.outcome == TradeOutcome::Win).count();
        let gross_win: f64 = closed
            .iter()
            .filter(|t| t.outcome == TradeOutcome::Win)
            .map(|t| t.pnl)
            .sum();
        let gross_loss: f64 = closed
            .iter()
            .filter(|t| t.outcome == TradeOutcome::Loss)
            .map(|t| t.pnl)
            .sum::<f64>()
            .abs();

        let profit_factor = if gross_loss > 0.0 {
            gross_win / gross_loss
        } else if gross_win > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let total_trades = closed.len();
        BacktestResult {
            max_drawdown: self.max_drawdown,
            max_drawdown_amount: self.max_drawdown_amount,
            net_profit_percent: (self.equity - self.initial_capital) / self.initial_capital * 100.0,
            win_rate: wins as f64 / total_trades as f64 * 100.0,
            profit_factor,
            final_equity: self.equity,
            total_trades,
            trades: self.trades,
        }
    }
}

/// Notional over equity rounded up, at least 1x
fn leverage_for(position_value: f64, equity: f64) -> u64 {
    let raw = (position_value / equity).ceil();
    if !(raw < u64::MAX as f64) {
        warn!("Leverage {:e} out of range, clamping to {}", raw, u64::MAX);
        return u64::MAX;
    }
    (raw as u64).max(1)
}

fn round_trip_commission(position_value: f64, commission_percent: f64) -> f64 {
    position_value * commission_percent / 100.0 * 2.0
}

/// Replay `candles` against `signals`. Starting equity defaults to
/// `settings.initial_capital`.
pub fn run_backtest(
    candles: &[Candle],
    signals: &[TradeSignal],
    settings: &Settings,
    starting_equity: Option<f64>,
) -> BacktestResult {
    let initial = starting_equity.unwrap_or(settings.initial_capital);
    let mut sim = Simulator::new(signals, settings, initial);

    for candle in candles {
        sim.process_candle(candle);
    }

    sim.finish()
}

fn fmt_time(ts: Option<i64>) -> String {
    ts.and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Print results in a formatted table
pub fn print_results(result: &BacktestResult) {
    println!();
    println!("═══════════════════════════════════════════════════════════");
    println!("                    SMC BACKTEST RESULTS                   ");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!("  Closed Trades:   {}", result.total_trades);
    println!("  Win Rate:        {:.1}%", result.win_rate);
    println!("  Profit Factor:   {:.2}", result.profit_factor);
    println!("  Net Profit:      {:+.2}%", result.net_profit_percent);
    println!("  Max Drawdown:    {:.2}% ({:.2})", result.max_drawdown, result.max_drawdown_amount);
    println!("  Final Equity:    {:.2}", result.final_equity);
    println!();

    if !result.trades.is_empty() {
        println!("Trades:");
        for t in &result.trades {
            println!(
                "  {} {} @ {:.5} -> {} @ {} | {} | {}x | pnl {:+.2} ({:+.1}% ROE)",
                fmt_time(Some(t.entry_time)),
                t.direction,
                t.entry_price,
                fmt_time(t.exit_time),
                t.exit_price.map(|p| format!("{:.5}", p)).unwrap_or_else(|| "-".to_string()),
                t.outcome,
                t.leverage,
                t.pnl,
                t.roe
            );
        }
    }
    println!("═══════════════════════════════════════════════════════════");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(time: i64, high: f64, low: f64) -> Candle {
        Candle { time, open: (high + low) / 2.0, high, low, close: (high + low) / 2.0 }
    }

    fn long(time: i64, entry: f64, stop: f64, target: f64) -> TradeSignal {
        TradeSignal {
            entry_time: time,
            entry_price: entry,
            stop_loss: stop,
            take_profit: target,
            direction: Direction::Bullish,
        }
    }

    fn settings() -> Settings {
        Settings {
            initial_capital: 10_000.0,
            order_size_percent: 1.0,
            commission_percent: 0.1,
            rr_ratio: 2.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_winning_long() {
        let signal = long(0, 100.0, 95.0, 110.0);
        let candles = vec![c(60, 101.0, 99.0), c(120, 111.0, 100.0)];

        let result = run_backtest(&candles, &[signal], &settings(), None);
        assert_eq!(result.total_trades, 1);

        let t = &result.trades[0];
        assert_eq!(t.outcome, TradeOutcome::Win);
        assert_eq!(t.exit_price, Some(110.0));
        assert_eq!(t.exit_time, Some(120));

        // 1% of 10k risked over 5 points -> 20 units, 2000 notional
        assert!((t.position_size - 20.0).abs() < 1e-9);
        assert!((t.position_value - 2000.0).abs() < 1e-9);
        assert_eq!(t.leverage, 1);
        let commission = 2000.0 * 0.1 / 100.0 * 2.0;
        assert!((t.pnl - (100.0 * 2.0 - commission)).abs() < 1e-9);
        assert_eq!(result.win_rate, 100.0);
        assert!(result.profit_factor.is_infinite());
    }

    #[test]
    fn test_stop_wins_tie() {
        let signal = long(0, 100.0, 95.0, 110.0);
        let candles = vec![c(60, 101.0, 99.0), c(120, 111.0, 94.0)];

        let result = run_backtest(&candles, &[signal], &settings(), None);
        let t = &result.trades[0];
        assert_eq!(t.outcome, TradeOutcome::Loss);
        assert_eq!(t.exit_price, Some(95.0));
        assert!(t.pnl < -100.0);
        assert!(result.max_drawdown_amount > 100.0);
        assert_eq!(result.profit_factor, 0.0);
    }

    #[test]
    fn test_short_exits() {
        let signal = TradeSignal {
            entry_time: 0,
            entry_price: 100.0,
            stop_loss: 104.0,
            take_profit: 92.0,
            direction: Direction::Bearish,
        };
        let candles = vec![c(60, 100.5, 99.0), c(120, 99.0, 91.0)];
        let result = run_backtest(&candles, &[signal], &settings(), None);
        assert_eq!(result.trades[0].outcome, TradeOutcome::Win);
        assert_eq!(result.trades[0].exit_price, Some(92.0));
    }

    #[test]
    fn test_zero_trades_is_zeroed() {
        let result = run_backtest(&[c(60, 101.0, 99.0)], &[], &settings(), None);
        assert!(result.trades.is_empty());
        assert_eq!(result.max_drawdown, 0.0);
        assert_eq!(result.max_drawdown_amount, 0.0);
        assert_eq!(result.net_profit_percent, 0.0);
        assert_eq!(result.win_rate, 0.0);
        assert_eq!(result.profit_factor, 0.0);
        assert_eq!(result.final_equity, 10_000.0);
        assert_eq!(result.total_trades, 0);
    }

    #[test]
    fn test_open_trade_is_reported_but_not_counted() {
        let signal = long(0, 100.0, 95.0, 110.0);
        let result = run_backtest(&[c(60, 101.0, 99.0)], &[signal], &settings(), Some(5_000.0));
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].outcome, TradeOutcome::Open);
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.final_equity, 5_000.0);
    }

    #[test]
    fn test_signal_waits_for_its_time_and_price() {
        let signal = long(120, 100.0, 95.0, 110.0);
        let candles = vec![
            c(60, 101.0, 99.0),  // brackets entry but before signal time
            c(120, 105.0, 101.0), // signal live, price above entry
            c(180, 102.0, 99.5), // fill
        ];
        let result = run_backtest(&candles, &[signal], &settings(), None);
        assert_eq!(result.trades[0].entry_time, 180);
    }

    #[test]
    fn test_zero_risk_signal_skipped() {
        let signal = long(0, 100.0, 100.0, 100.0);
        let result = run_backtest(&[c(60, 101.0, 99.0)], &[signal], &settings(), None);
        assert!(result.trades.is_empty());
    }

    #[test]
    fn test_commission_filter() {
        // 1/16 point stop on 100 -> 1600 units, 160k notional, 320 commission vs 200 target
        let signal = long(0, 100.0, 99.9375, 100.125);
        let candles = vec![c(60, 100.5, 99.8)];

        let filtered = Settings { filter_by_commission: true, ..settings() };
        assert!(run_backtest(&candles, &[signal], &filtered, None).trades.is_empty());

        let unfiltered = run_backtest(&candles, &[signal], &settings(), None);
        assert_eq!(unfiltered.trades.len(), 1);
        assert_eq!(unfiltered.trades[0].position_value, 160_000.0);
        assert_eq!(unfiltered.trades[0].leverage, 16);
    }

    #[test]
    fn test_leverage_beyond_u32_is_exact() {
        // Stop 2^-40 below entry: 100 risked -> 100 * 2^40 units, notional 2^40 times equity
        let stop = 100.0 - (1.0 / (1u64 << 40) as f64);
        let signal = long(0, 100.0, stop, 101.0);
        let result = run_backtest(&[c(60, 100.5, 99.5)], &[signal], &settings(), None);

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].leverage, 1u64 << 40);
        assert!(result.trades[0].leverage > u32::MAX as u64);
    }

    #[test]
    fn test_leverage_clamps_when_unbounded() {
        assert_eq!(leverage_for(f64::INFINITY, 10_000.0), u64::MAX);
        assert_eq!(leverage_for(f64::NAN, 10_000.0), u64::MAX);
        assert_eq!(leverage_for(500.0, 10_000.0), 1);
        assert_eq!(leverage_for(25_000.0, 10_000.0), 3);
    }

    fn overlapping_signals() -> (Vec<TradeSignal>, Vec<Candle>) {
        let signals = vec![
            long(0, 100.0, 95.0, 110.0),
            long(30, 101.0, 96.0, 111.0),
            long(200, 100.0, 98.0, 104.0),
            long(400, 100.0, 99.0, 102.0),
        ];
        let candles = vec![
            c(60, 101.5, 99.5),   // first fills, second waits
            c(120, 110.5, 100.0), // first wins, second fills on the same candle
            c(180, 101.2, 100.5),
            c(240, 101.0, 95.5),  // second stopped, third fills
            c(300, 100.5, 99.0),
            c(360, 104.0, 99.0),  // third wins
            c(420, 100.0, 99.5),  // fourth fills
            c(480, 100.1, 99.6),  // still open
        ];
        (signals, candles)
    }

    #[test]
    fn test_at_most_one_open_trade_after_every_candle() {
        let (signals, candles) = overlapping_signals();
        let s = settings();

        for k in 1..=candles.len() {
            let result = run_backtest(&candles[..k], &signals, &s, None);
            let open: Vec<&ExecutedTrade> = result
                .trades
                .iter()
                .filter(|t| t.outcome == TradeOutcome::Open)
                .collect();
            assert!(open.len() <= 1, "{} open trades after candle {}", open.len(), k);

            // Only the newest trade may still be running
            if let Some(last) = result.trades.last() {
                assert!(result.trades[..result.trades.len() - 1]
                    .iter()
                    .all(|t| t.outcome != TradeOutcome::Open));
                if open.len() == 1 {
                    assert_eq!(last.outcome, TradeOutcome::Open);
                }
            }
        }
    }

    #[test]
    fn test_single_position_and_equity_conservation() {
        let (signals, candles) = overlapping_signals();
        let s = settings();
        let result = run_backtest(&candles, &signals, &s, None);
        assert_eq!(result.trades.len(), 4);
        assert_eq!(result.total_trades, 3);

        let open = result.trades.iter().filter(|t| t.outcome == TradeOutcome::Open).count();
        assert!(open <= 1);
        for pair in result.trades.windows(2) {
            let prev_exit = pair[0].exit_time.unwrap();
            assert!(pair[1].entry_time >= prev_exit);
        }

        let expected = result
            .closed_trades()
            .fold(s.initial_capital, |equity, t| equity + t.pnl);
        assert_eq!(result.final_equity, expected);

        assert!((result.win_rate - 200.0 / 3.0).abs() < 1e-9);
    }
}
