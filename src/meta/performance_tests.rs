//! Unit tests for the performance monitor.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::exchange::types::PositionSide;
use crate::meta::regime::Regime;

use super::performance::{PerformanceMonitor, StrategyHealth, TradeRecord};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn trade(day: i64, pnl: f64, strategy: &str, regime: Regime) -> TradeRecord {
    let closed = base() + Duration::days(day);
    TradeRecord {
        symbol: "SPY".to_string(),
        side: PositionSide::Long,
        qty: 10.0,
        entry_price: 100.0,
        exit_price: 100.0 + pnl / 10.0,
        opened_at: closed - Duration::hours(4),
        closed_at: closed,
        realized_pnl: pnl,
        capital_at_entry: 10_000.0,
        strategy_name: strategy.to_string(),
        regime_at_entry: regime,
    }
}

#[test]
fn fewer_than_five_trades_is_insufficient_data() {
    let mut monitor = PerformanceMonitor::new(50);
    for day in 0..4 {
        monitor.record_trade(trade(day, 50.0, "TrendFollowing", Regime::Trend));
    }
    assert_eq!(monitor.state(50), StrategyHealth::InsufficientData);
}

#[test]
fn win_rate_and_profit_factor() {
    let mut monitor = PerformanceMonitor::new(50);
    let pnls = [100.0, -50.0, 200.0, -50.0, 100.0, 100.0];
    for (day, pnl) in pnls.iter().enumerate() {
        monitor.record_trade(trade(day as i64, *pnl, "TrendFollowing", Regime::Trend));
    }
    let metrics = monitor.metrics(50);
    assert!((metrics.win_rate - 4.0 / 6.0).abs() < 1e-12);
    // gross profit 500, gross loss 100
    assert!((metrics.profit_factor - 5.0).abs() < 1e-12);
}

#[test]
fn profit_factor_extremes() {
    let mut monitor = PerformanceMonitor::new(50);
    for day in 0..5 {
        monitor.record_trade(trade(day, 10.0, "TrendFollowing", Regime::Trend));
    }
    assert!(monitor.metrics(50).profit_factor.is_infinite());

    let mut monitor = PerformanceMonitor::new(50);
    for day in 0..5 {
        monitor.record_trade(trade(day, -10.0, "TrendFollowing", Regime::Trend));
    }
    assert_eq!(monitor.metrics(50).profit_factor, 0.0);
}

#[test]
fn max_drawdown_from_equity_curve() {
    let mut monitor = PerformanceMonitor::new(50);
    for (i, equity) in [100.0, 120.0, 90.0, 130.0].iter().enumerate() {
        monitor.record_equity(base() + Duration::hours(i as i64), *equity);
    }
    let metrics = monitor.metrics(50);
    assert!((metrics.max_drawdown - 0.25).abs() < 1e-12);
    assert!((metrics.total_return - 0.3).abs() < 1e-12);
}

#[test]
fn consistent_wins_classify_as_healthy() {
    let mut monitor = PerformanceMonitor::new(50);
    // Varied but always-positive daily returns: high Sharpe, no drawdown.
    let pnls = [80.0, 120.0, 100.0, 90.0, 110.0, 100.0, 95.0, 105.0];
    for (day, pnl) in pnls.iter().enumerate() {
        monitor.record_trade(trade(day as i64, *pnl, "TrendFollowing", Regime::Trend));
        monitor.record_equity(base() + Duration::days(day as i64), 10_000.0 + 100.0 * day as f64);
    }
    let metrics = monitor.metrics(50);
    assert!(metrics.sharpe > 2.0, "sharpe was {}", metrics.sharpe);
    assert_eq!(metrics.state, StrategyHealth::Excellent);
}

#[test]
fn losses_classify_as_poor() {
    let mut monitor = PerformanceMonitor::new(50);
    let pnls = [-80.0, -120.0, -100.0, -90.0, -110.0];
    for (day, pnl) in pnls.iter().enumerate() {
        monitor.record_trade(trade(day as i64, *pnl, "TrendFollowing", Regime::Trend));
    }
    let metrics = monitor.metrics(50);
    assert!(metrics.sharpe < 0.0);
    assert_eq!(metrics.state, StrategyHealth::Poor);
}

#[test]
fn deep_drawdown_dominates_good_sharpe() {
    let mut monitor = PerformanceMonitor::new(50);
    let pnls = [80.0, 120.0, 100.0, 90.0, 110.0];
    for (day, pnl) in pnls.iter().enumerate() {
        monitor.record_trade(trade(day as i64, *pnl, "TrendFollowing", Regime::Trend));
    }
    monitor.record_equity(base(), 10_000.0);
    monitor.record_equity(base() + Duration::days(1), 6_500.0);
    // 35% drawdown: worst bucket wins despite the positive Sharpe.
    assert_eq!(monitor.state(50), StrategyHealth::Poor);
}

#[test]
fn per_strategy_and_per_regime_slices() {
    let mut monitor = PerformanceMonitor::new(50);
    for day in 0..6 {
        monitor.record_trade(trade(day, 100.0, "TrendFollowing", Regime::Trend));
        monitor.record_trade(trade(day, -100.0, "MeanReversion", Regime::Sideways));
    }
    // Mixed magnitudes so the std is non-zero.
    monitor.record_trade(trade(6, 50.0, "TrendFollowing", Regime::Trend));
    monitor.record_trade(trade(6, -50.0, "MeanReversion", Regime::Sideways));

    let tf = monitor
        .strategy_regime_sharpe("TrendFollowing", Regime::Trend)
        .unwrap();
    let mr = monitor
        .strategy_regime_sharpe("MeanReversion", Regime::Sideways)
        .unwrap();
    assert!(tf > 0.0);
    assert!(mr < 0.0);
    // No samples for this pairing.
    assert!(monitor
        .strategy_regime_sharpe("TrendFollowing", Regime::Sideways)
        .is_none());
}

#[test]
fn windowing_keeps_only_recent_trades() {
    let mut monitor = PerformanceMonitor::new(5);
    for day in 0..10 {
        let pnl = if day < 5 { -100.0 } else { 100.0 };
        monitor.record_trade(trade(day, pnl, "TrendFollowing", Regime::Trend));
    }
    // Window of 5 sees only the winning tail.
    let metrics = monitor.metrics(5);
    assert_eq!(metrics.trades, 5);
    assert!((metrics.win_rate - 1.0).abs() < 1e-12);
}
