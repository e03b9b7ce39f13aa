//! Unit tests for the strategy selector and its switch protocol.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::exchange::types::PositionSide;
use crate::meta::performance::{PerformanceMonitor, TradeRecord};
use crate::meta::regime::{Regime, RegimeReading};
use crate::meta::selector::{SelectorConfig, StrategySelector, SwitchReason};
use crate::strategies::StrategySet;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

fn reading(regime: Regime, confidence: f64) -> RegimeReading {
    let rest = (1.0 - confidence) / 2.0;
    let (t, s, v) = match regime {
        Regime::Trend => (confidence, rest, rest),
        Regime::Sideways => (rest, confidence, rest),
        Regime::Volatile => (rest, rest, confidence),
    };
    RegimeReading {
        regime,
        confidence_trend: t,
        confidence_sideways: s,
        confidence_volatile: v,
        computed_at: now(),
        initializing: false,
    }
}

fn selector() -> StrategySelector {
    StrategySelector::new(SelectorConfig::default(), 50)
}

fn losing_trade(day: i64, strategy: &str, regime: Regime, pnl: f64) -> TradeRecord {
    let closed = now() + Duration::days(day);
    TradeRecord {
        symbol: "SPY".to_string(),
        side: PositionSide::Long,
        qty: 10.0,
        entry_price: 100.0,
        exit_price: 100.0 + pnl / 10.0,
        opened_at: closed - Duration::hours(2),
        closed_at: closed,
        realized_pnl: pnl,
        capital_at_entry: 10_000.0,
        strategy_name: strategy.to_string(),
        regime_at_entry: regime,
    }
}

#[test]
fn initial_selection_matches_regime_and_is_silent() {
    let strategies = StrategySet::builtin();
    let perf = PerformanceMonitor::new(50);

    let mut sel = selector();
    let (active, switch) = sel.select(&reading(Regime::Trend, 0.8), &strategies, &perf, now());
    assert_eq!(active, "TrendFollowing");
    assert!(switch.is_none());

    let mut sel = selector();
    let (active, _) = sel.select(&reading(Regime::Sideways, 0.8), &strategies, &perf, now());
    assert_eq!(active, "MeanReversion");

    let mut sel = selector();
    let (active, _) = sel.select(&reading(Regime::Volatile, 0.8), &strategies, &perf, now());
    assert_eq!(active, "VolatilityBreakout");
}

#[test]
fn constant_inputs_never_switch() {
    let strategies = StrategySet::builtin();
    let perf = PerformanceMonitor::new(50);
    let mut sel = selector();
    let r = reading(Regime::Trend, 0.7);

    let (first, _) = sel.select(&r, &strategies, &perf, now());
    for _ in 0..10 {
        let (active, switch) = sel.select(&r, &strategies, &perf, now());
        assert_eq!(active, first);
        assert!(switch.is_none());
    }
}

#[test]
fn regime_change_switches_when_incumbent_is_unsuited() {
    let strategies = StrategySet::builtin();
    let perf = PerformanceMonitor::new(50);
    let mut sel = selector();

    sel.select(&reading(Regime::Sideways, 0.8), &strategies, &perf, now());
    let (active, switch) = sel.select(&reading(Regime::Trend, 0.8), &strategies, &perf, now());

    assert_eq!(active, "TrendFollowing");
    let event = switch.expect("switch expected");
    assert_eq!(event.from, "MeanReversion");
    assert_eq!(event.to, "TrendFollowing");
    assert_eq!(event.reason, SwitchReason::RegimeChange);
    assert_eq!(event.regime, Regime::Trend);
}

#[test]
fn regime_change_keeps_a_still_suited_incumbent_inside_hysteresis() {
    let strategies = StrategySet::builtin();
    let perf = PerformanceMonitor::new(50);
    let mut sel = selector();

    // VolatilityBreakout is the incumbent; in TREND its suitability is
    // 0.6 (>= 0.5) and with a weak reading the score gap to
    // TrendFollowing stays inside the hysteresis band.
    sel.select(&reading(Regime::Volatile, 0.8), &strategies, &perf, now());
    let (active, switch) = sel.select(&reading(Regime::Trend, 0.3), &strategies, &perf, now());
    assert_eq!(active, "VolatilityBreakout");
    assert!(switch.is_none());

    // A confident reading widens the gap beyond hysteresis.
    let (active, switch) = sel.select(&reading(Regime::Trend, 0.9), &strategies, &perf, now());
    assert_eq!(active, "TrendFollowing");
    assert_eq!(switch.unwrap().reason, SwitchReason::ScoreExceeded);
}

#[test]
fn two_degrading_windows_force_a_switch() {
    let strategies = StrategySet::builtin();
    let mut sel = selector();

    // Establish TrendFollowing as the incumbent on clean history.
    let perf = PerformanceMonitor::new(50);
    let (active, _) = sel.select(&reading(Regime::Trend, 0.8), &strategies, &perf, now());
    assert_eq!(active, "TrendFollowing");

    // Then it keeps losing in TREND: Poor health and a bias that drags
    // its score under the challenger without clearing hysteresis.
    let mut perf = perf;
    for (day, pnl) in [-100.0, -200.0, -100.0, -300.0, -200.0].iter().enumerate() {
        perf.record_trade(losing_trade(day as i64, "TrendFollowing", Regime::Trend, *pnl));
    }

    let r = reading(Regime::Trend, 0.34);
    let (active, switch) = sel.select(&r, &strategies, &perf, now());
    // First degraded evaluation: streak is 1, hysteresis still holds.
    assert_eq!(active, "TrendFollowing");
    assert!(switch.is_none());

    let (active, switch) = sel.select(&r, &strategies, &perf, now());
    assert_eq!(active, "VolatilityBreakout");
    assert_eq!(switch.unwrap().reason, SwitchReason::PerformanceDegraded);
}
