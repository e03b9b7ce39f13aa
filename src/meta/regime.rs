//! Three-way market regime classification.
//!
//! The classifier is a pure function of the bar window: identical inputs
//! produce identical readings. It scores TREND / SIDEWAYS / VOLATILE from
//! a small feature vector and turns the scores into confidences with a
//! sharpened softmax.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{indicators, BarWindow};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    Trend,
    Sideways,
    Volatile,
}

impl Regime {
    pub const ALL: [Regime; 3] = [Regime::Trend, Regime::Sideways, Regime::Volatile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Trend => "TREND",
            Regime::Sideways => "SIDEWAYS",
            Regime::Volatile => "VOLATILE",
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classification result. Confidences are non-negative and sum to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct RegimeReading {
    pub regime: Regime,
    pub confidence_trend: f64,
    pub confidence_sideways: f64,
    pub confidence_volatile: f64,
    pub computed_at: DateTime<Utc>,
    /// Set while the window is shorter than the minimum lookback; callers
    /// treat the reading as provisional.
    pub initializing: bool,
}

impl RegimeReading {
    pub fn confidence(&self, regime: Regime) -> f64 {
        match regime {
            Regime::Trend => self.confidence_trend,
            Regime::Sideways => self.confidence_sideways,
            Regime::Volatile => self.confidence_volatile,
        }
    }

    /// Confidence of the detected regime.
    pub fn top_confidence(&self) -> f64 {
        self.confidence(self.regime)
    }
}

/// Feature weights and the softmax sharpness. All weights default to 1.0;
/// sharpness > 1 makes a clear winner resolve with high confidence.
#[derive(Clone, Copy, Debug)]
pub struct ClassifierParams {
    pub w_momentum: f64,
    pub w_trend_strength: f64,
    pub w_quiet: f64,
    pub w_low_vol: f64,
    pub w_vol: f64,
    pub w_expansion: f64,
    pub sharpness: f64,
    pub min_bars: usize,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            w_momentum: 1.0,
            w_trend_strength: 1.0,
            w_quiet: 1.0,
            w_low_vol: 1.0,
            w_vol: 1.0,
            w_expansion: 1.0,
            sharpness: 2.0,
            min_bars: 20,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RegimeClassifier {
    params: ClassifierParams,
}

const MOMENTUM_LOOKBACK: usize = 20;
const VOL_LOOKBACK: usize = 20;
const VOL_BASELINE_CAP: usize = 100;
const ATR_BASELINE_CAP: usize = 50;

impl RegimeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: ClassifierParams) -> Self {
        Self { params }
    }

    /// Classify the window. Windows shorter than `min_bars` return an
    /// initializing reading with uniform confidences.
    pub fn classify(&self, window: &BarWindow, now: DateTime<Utc>) -> RegimeReading {
        if window.len() < self.params.min_bars {
            return RegimeReading {
                regime: Regime::Trend,
                confidence_trend: 1.0 / 3.0,
                confidence_sideways: 1.0 / 3.0,
                confidence_volatile: 1.0 / 3.0,
                computed_at: now,
                initializing: true,
            };
        }

        let closes = window.closes();
        let close = *closes.last().unwrap_or(&0.0);
        let p = &self.params;

        // Momentum, scaled so a 5% move over the lookback saturates.
        let momentum = indicators::roc(&closes, MOMENTUM_LOOKBACK).unwrap_or(0.0);
        let m = (momentum.abs() * 20.0).clamp(0.0, 1.0);

        // MA separation relative to price, with a shorter slow MA while
        // fewer than 50 bars are available.
        let fast = indicators::sma(&closes, 20).unwrap_or(close);
        let slow_n = closes.len().min(50);
        let slow = indicators::sma(&closes, slow_n).unwrap_or(close);
        let trend_strength = if close > 0.0 {
            ((fast - slow).abs() / close).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Short-horizon volatility against a longer baseline, mapped so a
        // 2x expansion saturates at 1 and parity sits at 0.5.
        let vol_short = indicators::volatility(&closes, VOL_LOOKBACK);
        let baseline_n = (closes.len() - 1).min(VOL_BASELINE_CAP);
        let vol_long = indicators::volatility(&closes, baseline_n);
        let vol_z = match (vol_short, vol_long) {
            (Some(s), Some(l)) if l > f64::EPSILON => (s / l / 2.0).clamp(0.0, 1.0),
            (Some(s), _) if s > f64::EPSILON => 1.0,
            _ => 0.5,
        };

        // ATR expansion above its longer-horizon baseline.
        let atr_short = indicators::atr(&window.bars, 14);
        let atr_base_n = (window.bars.len() - 1).min(ATR_BASELINE_CAP);
        let atr_long = indicators::atr(&window.bars, atr_base_n);
        let expansion = match (atr_short, atr_long) {
            (Some(s), Some(l)) if l > f64::EPSILON => (s / l - 1.0).clamp(0.0, 1.0),
            _ => 0.0,
        };

        let trend_score = (p.w_momentum * m + p.w_trend_strength * trend_strength).max(0.0);
        let range_score = (p.w_quiet * (1.0 - m) + p.w_low_vol * (1.0 - vol_z)).max(0.0);
        let vol_score = (p.w_vol * vol_z + p.w_expansion * expansion).max(0.0);

        let (ct, cs, cv) = softmax3(
            trend_score * p.sharpness,
            range_score * p.sharpness,
            vol_score * p.sharpness,
        );

        // Argmax with the tie order TREND > SIDEWAYS > VOLATILE.
        let regime = if trend_score >= range_score && trend_score >= vol_score {
            Regime::Trend
        } else if range_score >= vol_score {
            Regime::Sideways
        } else {
            Regime::Volatile
        };

        RegimeReading {
            regime,
            confidence_trend: ct,
            confidence_sideways: cs,
            confidence_volatile: cv,
            computed_at: now,
            initializing: false,
        }
    }
}

fn softmax3(a: f64, b: f64, c: f64) -> (f64, f64, f64) {
    // Subtract the max for numeric stability.
    let m = a.max(b).max(c);
    let ea = (a - m).exp();
    let eb = (b - m).exp();
    let ec = (c - m).exp();
    let sum = ea + eb + ec;
    (ea / sum, eb / sum, ec / sum)
}
