//! Unit tests for the per-symbol bar buffer.

use chrono::{Duration, TimeZone, Utc};

use super::bar_buffer::{AppendOutcome, Bar, BarBuffer};

fn bar_at(minute: i64, close: f64) -> Bar {
    Bar {
        symbol: "SPY".to_string(),
        open_time: Utc.with_ymd_and_hms(2025, 1, 1, 9, 30, 0).unwrap() + Duration::minutes(minute),
        open: close - 0.5,
        high: close + 0.25,
        low: close - 0.75,
        close,
        volume: 1000.0,
    }
}

#[test]
fn appends_keep_open_time_strictly_increasing() {
    let mut buffer = BarBuffer::new("SPY", 100);
    for i in 0..10 {
        assert_eq!(
            buffer.append_or_update(bar_at(i, 100.0 + i as f64)),
            AppendOutcome::Appended
        );
    }
    let window = buffer.snapshot(100);
    for pair in window.bars.windows(2) {
        assert!(pair[0].open_time < pair[1].open_time);
    }
}

#[test]
fn same_open_time_replaces_the_tail() {
    let mut buffer = BarBuffer::new("SPY", 100);
    buffer.append_or_update(bar_at(0, 100.0));
    buffer.append_or_update(bar_at(1, 101.0));
    assert_eq!(
        buffer.append_or_update(bar_at(1, 105.0)),
        AppendOutcome::Replaced
    );
    assert_eq!(buffer.len(), 2);
    assert_eq!(buffer.latest_price(), Some(105.0));
}

#[test]
fn out_of_order_is_rejected_without_mutation() {
    let mut buffer = BarBuffer::new("SPY", 100);
    buffer.append_or_update(bar_at(5, 100.0));
    assert_eq!(
        buffer.append_or_update(bar_at(3, 99.0)),
        AppendOutcome::OutOfOrder
    );
    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer.latest_price(), Some(100.0));
}

#[test]
fn capacity_evicts_oldest() {
    let mut buffer = BarBuffer::new("SPY", 3);
    for i in 0..5 {
        buffer.append_or_update(bar_at(i, 100.0 + i as f64));
    }
    assert_eq!(buffer.len(), 3);
    let window = buffer.snapshot(10);
    assert_eq!(window.bars[0].close, 102.0);
    assert_eq!(window.bars[2].close, 104.0);
}

#[test]
fn snapshot_takes_the_suffix() {
    let mut buffer = BarBuffer::new("SPY", 100);
    for i in 0..30 {
        buffer.append_or_update(bar_at(i, 100.0 + i as f64));
    }
    let window = buffer.snapshot(5);
    assert_eq!(window.len(), 5);
    assert_eq!(window.bars[0].close, 125.0);
    assert_eq!(window.indicators.len(), 5);
}

#[test]
fn indicator_rows_respect_warmup() {
    let mut buffer = BarBuffer::new("SPY", 100);
    for i in 0..19 {
        buffer.append_or_update(bar_at(i, 100.0 + i as f64));
    }
    let window = buffer.snapshot(100);
    assert!(window.last_row().unwrap().sma20.is_none());

    let mut buffer = BarBuffer::new("SPY", 100);
    for i in 0..20 {
        buffer.append_or_update(bar_at(i, 100.0 + i as f64));
    }
    let window = buffer.snapshot(100);
    let row = window.last_row().unwrap();
    // mean of 100..119
    assert!((row.sma20.unwrap() - 109.5).abs() < 1e-9);
    assert!(row.sma50.is_none());
    assert!(row.rsi14.is_some());
}

#[test]
fn replacement_recomputes_the_tail_row() {
    let mut buffer = BarBuffer::new("SPY", 100);
    for i in 0..20 {
        buffer.append_or_update(bar_at(i, 100.0));
    }
    let before = buffer.snapshot(1).last_row().unwrap().sma20.unwrap();
    assert!((before - 100.0).abs() < 1e-9);

    buffer.append_or_update(bar_at(19, 120.0));
    let after = buffer.snapshot(1).last_row().unwrap().sma20.unwrap();
    assert!((after - 101.0).abs() < 1e-9);
}

#[test]
fn non_finite_bars_are_detectable() {
    let mut bad = bar_at(0, 100.0);
    bad.close = f64::NAN;
    assert!(!bad.is_finite());
    assert!(bar_at(0, 100.0).is_finite());
}
