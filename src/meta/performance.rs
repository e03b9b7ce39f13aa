//! Rolling performance metrics over closed trades and the equity curve.
//!
//! Single-writer: only the execution worker records into the monitor.
//! Readers (analysis, snapshots) go through shared read access and only
//! see finished values.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::exchange::types::PositionSide;
use crate::meta::regime::Regime;

/// A closed round trip. Append-only.
#[derive(Clone, Debug, PartialEq)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: PositionSide,
    pub qty: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub realized_pnl: f64,
    /// Account value when the position was opened; the denominator for
    /// the per-trade return.
    pub capital_at_entry: f64,
    pub strategy_name: String,
    pub regime_at_entry: Regime,
}

impl TradeRecord {
    pub fn ret(&self) -> f64 {
        if self.capital_at_entry > 0.0 {
            self.realized_pnl / self.capital_at_entry
        } else {
            0.0
        }
    }

    pub fn is_win(&self) -> bool {
        self.realized_pnl > 0.0
    }
}

/// Four-bucket health label derived from Sharpe and drawdown. When two
/// buckets match, the worse one wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StrategyHealth {
    Excellent,
    Good,
    Degrading,
    Poor,
    /// Fewer than the minimum sample count; callers must not act on it.
    InsufficientData,
}

impl StrategyHealth {
    pub fn is_degrading_or_worse(&self) -> bool {
        matches!(self, StrategyHealth::Degrading | StrategyHealth::Poor)
    }
}

/// Metrics over one trailing window of trades.
#[derive(Clone, Debug, PartialEq)]
pub struct PerformanceWindow {
    pub trades: usize,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_return: f64,
    pub state: StrategyHealth,
}

/// Compact copy for engine snapshots.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PerformanceSummary {
    pub total_trades: usize,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub equity: Option<f64>,
}

const MIN_SAMPLES: usize = 5;
const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;
const DEFAULT_PERIODS_PER_YEAR: f64 = 252.0;

pub struct PerformanceMonitor {
    window_size: usize,
    trades: Vec<TradeRecord>,
    equity_curve: VecDeque<(DateTime<Utc>, f64)>,
    equity_cap: usize,
}

impl PerformanceMonitor {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            trades: Vec::new(),
            equity_curve: VecDeque::new(),
            equity_cap: 512,
        }
    }

    pub fn record_trade(&mut self, trade: TradeRecord) {
        self.trades.push(trade);
    }

    pub fn record_equity(&mut self, at: DateTime<Utc>, portfolio_value: f64) {
        if self.equity_curve.len() == self.equity_cap {
            self.equity_curve.pop_front();
        }
        self.equity_curve.push_back((at, portfolio_value));
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Metrics over the trailing `window_size` trades plus the stored
    /// equity curve.
    pub fn metrics(&self, window_size: usize) -> PerformanceWindow {
        let window = self.tail(window_size, None, None);
        self.metrics_for(&window)
    }

    /// Health of the trailing window, `InsufficientData` below the
    /// minimum sample count.
    pub fn state(&self, window_size: usize) -> StrategyHealth {
        self.metrics(window_size).state
    }

    /// Health of one strategy's recent trades.
    pub fn strategy_state(&self, strategy: &str, window_size: usize) -> StrategyHealth {
        let window = self.tail(window_size, Some(strategy), None);
        self.metrics_for(&window).state
    }

    /// Rolling Sharpe of one strategy's trades inside one regime, the
    /// input to the selector's performance bias. `None` below the sample
    /// minimum.
    pub fn strategy_regime_sharpe(&self, strategy: &str, regime: Regime) -> Option<f64> {
        let window = self.tail(self.window_size, Some(strategy), Some(regime));
        if window.len() < MIN_SAMPLES {
            return None;
        }
        Some(sharpe_ratio(&window))
    }

    pub fn summary(&self) -> PerformanceSummary {
        let m = self.metrics(self.window_size);
        PerformanceSummary {
            total_trades: self.trades.len(),
            sharpe: m.sharpe,
            max_drawdown: m.max_drawdown,
            win_rate: m.win_rate,
            profit_factor: m.profit_factor,
            equity: self.equity_curve.back().map(|(_, v)| *v),
        }
    }

    fn tail(
        &self,
        window_size: usize,
        strategy: Option<&str>,
        regime: Option<Regime>,
    ) -> Vec<TradeRecord> {
        self.trades
            .iter()
            .rev()
            .filter(|t| strategy.map_or(true, |s| t.strategy_name == s))
            .filter(|t| regime.map_or(true, |r| t.regime_at_entry == r))
            .take(window_size.max(1))
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    fn metrics_for(&self, window: &[TradeRecord]) -> PerformanceWindow {
        let sharpe = sharpe_ratio(window);
        let max_drawdown = max_drawdown(&self.equity_curve);
        let wins = window.iter().filter(|t| t.is_win()).count();
        let win_rate = if window.is_empty() {
            0.0
        } else {
            wins as f64 / window.len() as f64
        };
        let gross_profit: f64 = window
            .iter()
            .map(|t| t.realized_pnl)
            .filter(|p| *p > 0.0)
            .sum();
        let gross_loss: f64 = window
            .iter()
            .map(|t| t.realized_pnl)
            .filter(|p| *p < 0.0)
            .map(f64::abs)
            .sum();
        let profit_factor = if gross_loss == 0.0 {
            if gross_profit > 0.0 {
                f64::INFINITY
            } else {
                0.0
            }
        } else {
            gross_profit / gross_loss
        };
        let total_return = total_return(&self.equity_curve);

        let state = if window.len() < MIN_SAMPLES {
            StrategyHealth::InsufficientData
        } else {
            classify_health(sharpe, max_drawdown)
        };

        PerformanceWindow {
            trades: window.len(),
            sharpe,
            max_drawdown,
            win_rate,
            profit_factor,
            total_return,
            state,
        }
    }
}

/// Worst matching bucket wins.
fn classify_health(sharpe: f64, max_drawdown: f64) -> StrategyHealth {
    if sharpe < 0.0 || max_drawdown > 0.30 {
        StrategyHealth::Poor
    } else if sharpe < 1.0 || max_drawdown > 0.20 {
        StrategyHealth::Degrading
    } else if sharpe > 2.0 && max_drawdown < 0.10 {
        StrategyHealth::Excellent
    } else if sharpe > 1.0 && max_drawdown < 0.20 {
        StrategyHealth::Good
    } else {
        StrategyHealth::Degrading
    }
}

/// Annualized Sharpe over per-trade returns. The annualization factor is
/// estimated from the spacing of the close timestamps; a single trade per
/// day works out to the familiar sqrt(252).
fn sharpe_ratio(window: &[TradeRecord]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = window.iter().map(TradeRecord::ret).collect();
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let ss = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>();
    let std = (ss / (returns.len() as f64 - 1.0)).sqrt();
    if std < f64::EPSILON {
        return 0.0;
    }
    (mean / std) * periods_per_year(window).sqrt()
}

fn periods_per_year(window: &[TradeRecord]) -> f64 {
    let first = window.first().map(|t| t.closed_at);
    let last = window.last().map(|t| t.closed_at);
    match (first, last) {
        (Some(a), Some(b)) if b > a => {
            let span = (b - a).num_seconds() as f64;
            let per_year = (window.len() as f64 - 1.0) * SECONDS_PER_YEAR / span;
            // Cap at one trade per five minutes to keep the factor sane
            // for burst backfills.
            per_year.clamp(1.0, 105_120.0)
        }
        _ => DEFAULT_PERIODS_PER_YEAR,
    }
}

fn max_drawdown(equity: &VecDeque<(DateTime<Utc>, f64)>) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0f64;
    for (_, value) in equity {
        peak = peak.max(*value);
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}

fn total_return(equity: &VecDeque<(DateTime<Utc>, f64)>) -> f64 {
    match (equity.front(), equity.back()) {
        (Some((_, first)), Some((_, last))) if *first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}
