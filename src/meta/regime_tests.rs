//! Unit tests for the regime classifier.

use chrono::{Duration, TimeZone, Utc};

use crate::data::{Bar, BarBuffer, BarWindow};

use super::regime::{Regime, RegimeClassifier};

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

fn rising(n: usize) -> Vec<f64> {
    (1..=n).map(|i| 100.0 + 0.5 * i as f64).collect()
}

fn oscillating(n: usize, amplitude: f64) -> Vec<f64> {
    let pattern = [0.0, amplitude, 0.0, -amplitude];
    (1..=n).map(|i| 100.0 + pattern[i % 4]).collect()
}

#[test]
fn short_window_is_initializing_with_uniform_confidence() {
    let clf = RegimeClassifier::new();
    let now = Utc::now();
    let reading = clf.classify(&window_from(&[100.0; 10]), now);
    assert!(reading.initializing);
    assert!((reading.confidence_trend - 1.0 / 3.0).abs() < 1e-12);
    assert!((reading.confidence_sideways - 1.0 / 3.0).abs() < 1e-12);
    assert!((reading.confidence_volatile - 1.0 / 3.0).abs() < 1e-12);
}

#[test]
fn classification_is_deterministic() {
    let clf = RegimeClassifier::new();
    let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    let window = window_from(&rising(60));
    let a = clf.classify(&window, now);
    let b = clf.classify(&window, now);
    assert_eq!(a, b);
}

#[test]
fn confidences_sum_to_one() {
    let clf = RegimeClassifier::new();
    let now = Utc::now();
    for closes in [rising(60), oscillating(60, 0.4), rising(25)] {
        let reading = clf.classify(&window_from(&closes), now);
        let sum =
            reading.confidence_trend + reading.confidence_sideways + reading.confidence_volatile;
        assert!((sum - 1.0).abs() < 1e-9, "sum was {sum}");
        assert!(reading.confidence_trend >= 0.0);
        assert!(reading.confidence_sideways >= 0.0);
        assert!(reading.confidence_volatile >= 0.0);
    }
}

#[test]
fn steady_rise_reads_as_trend() {
    let clf = RegimeClassifier::new();
    let reading = clf.classify(&window_from(&rising(60)), Utc::now());
    assert_eq!(reading.regime, Regime::Trend);
    assert!(reading.confidence_trend >= 0.5);
}

#[test]
fn tight_oscillation_reads_as_sideways() {
    let clf = RegimeClassifier::new();
    let reading = clf.classify(&window_from(&oscillating(60, 0.4)), Utc::now());
    assert_eq!(reading.regime, Regime::Sideways);
    assert!(reading.confidence_sideways >= 0.5);
}

#[test]
fn violent_swings_read_as_volatile() {
    // Calm range, then +/-5 whipsaws.
    let mut closes = oscillating(40, 0.2);
    for i in 0..10 {
        closes.push(if i % 2 == 0 { 105.0 } else { 95.0 });
    }
    let clf = RegimeClassifier::new();
    let reading = clf.classify(&window_from(&closes), Utc::now());
    assert_eq!(reading.regime, Regime::Volatile);
    assert!(reading.confidence_volatile >= 0.5);
}

#[test]
fn top_confidence_matches_detected_regime() {
    let clf = RegimeClassifier::new();
    let reading = clf.classify(&window_from(&rising(60)), Utc::now());
    assert_eq!(reading.top_confidence(), reading.confidence(reading.regime));
    assert!(reading.top_confidence() >= reading.confidence_sideways);
    assert!(reading.top_confidence() >= reading.confidence_volatile);
}
