//! Unit tests for the three built-in strategies.

use chrono::{Duration, TimeZone, Utc};

use crate::data::{Bar, BarBuffer, BarWindow};
use crate::exchange::types::PositionSide;
use crate::meta::regime::Regime;

use super::{MeanReversion, SignalKind, Strategy, StrategySet, TrendFollowing, VolatilityBreakout};

fn window_from(closes: &[f64]) -> BarWindow {
    let mut buffer = BarBuffer::new("SPY", 500);
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let mut prev = closes[0];
    for (i, close) in closes.iter().enumerate() {
        let open = prev;
        buffer.append_or_update(Bar {
            symbol: "SPY".to_string(),
            open_time: base + Duration::minutes(i as i64 + 1),
            open,
            high: open.max(*close) + 0.25,
            low: open.min(*close) - 0.25,
            close: *close,
            volume: 1000.0,
        });
        prev = *close;
    }
    buffer.snapshot(500)
}

fn decline_then_rise() -> Vec<f64> {
    let mut closes: Vec<f64> = (1..=50).map(|i| 100.0 - 0.2 * i as f64).collect();
    closes.extend((1..=30).map(|j| 90.0 + 1.0 * j as f64));
    closes
}

fn rise_then_decline() -> Vec<f64> {
    let mut closes: Vec<f64> = (1..=50).map(|i| 100.0 + 0.2 * i as f64).collect();
    closes.extend((1..=30).map(|j| 110.0 - 1.0 * j as f64));
    closes
}

#[test]
fn all_strategies_hold_during_warmup() {
    let strategies = StrategySet::builtin();
    for n in [1usize, 5, 10, 19] {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        let window = window_from(&closes);
        for strategy in strategies.iter() {
            assert_eq!(
                strategy.generate_signal(&window, None),
                SignalKind::Hold,
                "{} must hold below warmup at {} bars",
                strategy.name(),
                n
            );
        }
    }
    // Just under each strategy's own warmup too.
    for strategy in strategies.iter() {
        let n = strategy.warmup_bars() - 1;
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + 0.1 * i as f64).collect();
        assert_eq!(
            strategy.generate_signal(&window_from(&closes), None),
            SignalKind::Hold
        );
    }
}

#[test]
fn trend_following_buys_the_golden_cross() {
    let strategy = TrendFollowing::default();
    let closes = decline_then_rise();
    // Verified crossing point: fast SMA overtakes slow at bar 63.
    assert_eq!(
        strategy.generate_signal(&window_from(&closes[..62]), None),
        SignalKind::Hold
    );
    assert_eq!(
        strategy.generate_signal(&window_from(&closes[..63]), None),
        SignalKind::Buy
    );
    assert_eq!(
        strategy.generate_signal(&window_from(&closes[..64]), None),
        SignalKind::Hold
    );
}

#[test]
fn trend_following_sells_the_death_cross() {
    let strategy = TrendFollowing::default();
    let closes = rise_then_decline();
    assert_eq!(
        strategy.generate_signal(&window_from(&closes[..62]), None),
        SignalKind::Hold
    );
    assert_eq!(
        strategy.generate_signal(&window_from(&closes[..63]), None),
        SignalKind::Sell
    );
}

#[test]
fn trend_following_treats_first_available_separation_as_cross() {
    let strategy = TrendFollowing::default();
    // Steadily rising: at the first bar where the slow average exists
    // the fast one is already above it.
    let closes: Vec<f64> = (1..=50).map(|i| 100.0 + 0.5 * i as f64).collect();
    assert_eq!(
        strategy.generate_signal(&window_from(&closes), None),
        SignalKind::Buy
    );
}

#[test]
fn trend_following_volatility_cap_suppresses_entries() {
    let strategy = TrendFollowing::new(20, 50).with_volatility_cap(0.001);
    let closes: Vec<f64> = (1..=50).map(|i| 100.0 + 0.5 * i as f64).collect();
    assert_eq!(
        strategy.generate_signal(&window_from(&closes), None),
        SignalKind::Hold
    );
}

fn s3_closes() -> Vec<f64> {
    // Tight oscillation, then a seven-bar slide through the lower band.
    let pattern = [0.0, 0.3, 0.0, -0.3];
    let mut closes: Vec<f64> = (1..=40).map(|i| 100.0 + pattern[i % 4]).collect();
    for j in 1..=7 {
        closes.push(100.0 - 0.3 * j as f64);
    }
    closes
}

#[test]
fn mean_reversion_buys_oversold_at_lower_band() {
    let strategy = MeanReversion::default();
    let closes = s3_closes();
    assert_eq!(
        strategy.generate_signal(&window_from(&closes), None),
        SignalKind::Buy
    );
    // One bar earlier the band is not breached yet.
    assert_eq!(
        strategy.generate_signal(&window_from(&closes[..closes.len() - 1]), None),
        SignalKind::Hold
    );
}

#[test]
fn mean_reversion_sells_overbought_at_upper_band() {
    let pattern = [0.0, 0.3, 0.0, -0.3];
    let mut closes: Vec<f64> = (1..=40).map(|i| 100.0 + pattern[i % 4]).collect();
    for j in 1..=7 {
        closes.push(100.0 + 0.35 * j as f64);
    }
    let strategy = MeanReversion::default();
    assert_eq!(
        strategy.generate_signal(&window_from(&closes), None),
        SignalKind::Sell
    );
}

#[test]
fn mean_reversion_exits_a_long_on_middle_band_retouch() {
    let pattern = [0.0, 0.5, 0.0, -0.5];
    let mut closes: Vec<f64> = (1..=24).map(|i| 100.0 + pattern[i % 4]).collect();
    closes.push(98.0);
    closes.push(101.0); // crosses up through the middle band
    let strategy = MeanReversion::default();
    let window = window_from(&closes);
    assert_eq!(
        strategy.generate_signal(&window, Some(PositionSide::Long)),
        SignalKind::Sell
    );
    // Without a position the retouch is not a signal.
    assert_eq!(strategy.generate_signal(&window, None), SignalKind::Hold);
}

fn squeeze_then(last: f64) -> Vec<f64> {
    let wide = [0.0, 1.0, 0.0, -1.0];
    let tight = [0.0, 0.1, 0.0, -0.1];
    let mut closes: Vec<f64> = (1..=30).map(|i| 100.0 + wide[i % 4]).collect();
    closes.extend((31..=55).map(|i: usize| 100.0 + tight[i % 4]));
    closes.push(last);
    closes
}

#[test]
fn volatility_breakout_buys_after_a_squeeze() {
    let strategy = VolatilityBreakout::default();
    assert_eq!(
        strategy.generate_signal(&window_from(&squeeze_then(101.5)), None),
        SignalKind::Buy
    );
}

#[test]
fn volatility_breakout_sells_the_breakdown() {
    let strategy = VolatilityBreakout::default();
    assert_eq!(
        strategy.generate_signal(&window_from(&squeeze_then(98.0)), None),
        SignalKind::Sell
    );
}

#[test]
fn volatility_breakout_holds_inside_the_channel() {
    let strategy = VolatilityBreakout::default();
    assert_eq!(
        strategy.generate_signal(&window_from(&squeeze_then(100.05)), None),
        SignalKind::Hold
    );
}

#[test]
fn suitability_tables() {
    let tf = TrendFollowing::default();
    assert_eq!(tf.suitability(Regime::Trend), 0.9);
    assert_eq!(tf.suitability(Regime::Volatile), 0.6);
    assert_eq!(tf.suitability(Regime::Sideways), 0.3);

    let mr = MeanReversion::default();
    assert_eq!(mr.suitability(Regime::Sideways), 0.9);
    assert_eq!(mr.suitability(Regime::Volatile), 0.5);
    assert_eq!(mr.suitability(Regime::Trend), 0.3);

    let vb = VolatilityBreakout::default();
    assert_eq!(vb.suitability(Regime::Volatile), 0.9);
    assert_eq!(vb.suitability(Regime::Trend), 0.6);
    assert_eq!(vb.suitability(Regime::Sideways), 0.4);
}

#[test]
fn strategy_set_lookup_by_name() {
    let set = StrategySet::builtin();
    assert_eq!(set.len(), 3);
    assert!(set.get("TrendFollowing").is_some());
    assert!(set.get("MeanReversion").is_some());
    assert!(set.get("VolatilityBreakout").is_some());
    assert!(set.get("Momentum").is_none());
}
