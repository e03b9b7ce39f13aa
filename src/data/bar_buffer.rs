//! Per-symbol rolling bar storage with derived indicator rows.
//!
//! The buffer is exclusively owned by the analysis worker; everything it
//! hands out is a copy of the requested suffix, so readers never hold a
//! reference into live state.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::indicators;

/// One OHLCV candle at the configured timeframe. Immutable once closed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// True when every numeric field is finite. Non-finite bars are
    /// dropped upstream as data-integrity events.
    pub fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
    }
}

/// A single trade print, used only for latest-price tracking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeTick {
    pub symbol: String,
    pub time: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
}

/// Derived scalars aligned with one bar. `None` means the indicator is
/// still warming up at that point; consumers must check availability.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndicatorRow {
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
    pub ema12: Option<f64>,
    pub ema26: Option<f64>,
    pub rsi14: Option<f64>,
    pub volatility20: Option<f64>,
    pub atr14: Option<f64>,
    pub donchian_upper: Option<f64>,
    pub donchian_lower: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_middle: Option<f64>,
    pub bollinger_lower: Option<f64>,
}

impl IndicatorRow {
    /// Compute the row for the most recent bar of `bars`.
    fn compute(bars: &[Bar]) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let (donchian_upper, donchian_lower) = match indicators::donchian(bars, 20) {
            Some((u, l)) => (Some(u), Some(l)),
            None => (None, None),
        };
        let (bollinger_upper, bollinger_middle, bollinger_lower) =
            match indicators::bollinger(&closes, 20, 2.0) {
                Some((u, m, l)) => (Some(u), Some(m), Some(l)),
                None => (None, None, None),
            };
        Self {
            sma20: indicators::sma(&closes, 20),
            sma50: indicators::sma(&closes, 50),
            sma200: indicators::sma(&closes, 200),
            ema12: indicators::ema(&closes, 12),
            ema26: indicators::ema(&closes, 26),
            rsi14: indicators::rsi(&closes, 14),
            volatility20: indicators::volatility(&closes, 20),
            atr14: indicators::atr(bars, 14),
            donchian_upper,
            donchian_lower,
            bollinger_upper,
            bollinger_middle,
            bollinger_lower,
        }
    }
}

/// Result of feeding one bar into the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Strictly newer open_time: appended as a new bar.
    Appended,
    /// Same open_time as the tail: partial-bar update replaced it.
    Replaced,
    /// Older than the tail: rejected, caller logs and counts it.
    OutOfOrder,
}

/// Copy-on-read view of the most recent bars with their indicator rows,
/// oldest first. `indicators[i]` belongs to `bars[i]`.
#[derive(Clone, Debug, Default)]
pub struct BarWindow {
    pub bars: Vec<Bar>,
    pub indicators: Vec<IndicatorRow>,
}

impl BarWindow {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn last_row(&self) -> Option<&IndicatorRow> {
        self.indicators.last()
    }

    /// The row one bar before the latest.
    pub fn prev_row(&self) -> Option<&IndicatorRow> {
        if self.indicators.len() < 2 {
            return None;
        }
        self.indicators.get(self.indicators.len() - 2)
    }

    pub fn prev_bar(&self) -> Option<&Bar> {
        if self.bars.len() < 2 {
            return None;
        }
        self.bars.get(self.bars.len() - 2)
    }
}

/// Fixed-capacity ring of recent bars plus indicator rows, keyed to one
/// symbol. Invariant: `open_time` strictly increasing.
#[derive(Debug)]
pub struct BarBuffer {
    symbol: String,
    capacity: usize,
    bars: VecDeque<Bar>,
    rows: VecDeque<IndicatorRow>,
}

impl BarBuffer {
    pub fn new(symbol: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            symbol: symbol.into(),
            capacity,
            bars: VecDeque::with_capacity(capacity),
            rows: VecDeque::with_capacity(capacity),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Close price of the most recent bar.
    pub fn latest_price(&self) -> Option<f64> {
        self.bars.back().map(|b| b.close)
    }

    pub fn latest_open_time(&self) -> Option<DateTime<Utc>> {
        self.bars.back().map(|b| b.open_time)
    }

    /// Feed one bar. Equal `open_time` replaces the tail (live partial-bar
    /// updates until close), strictly greater appends, strictly lesser is
    /// rejected. The indicator row for the affected bar is recomputed from
    /// the batch formulas over the stored tail.
    pub fn append_or_update(&mut self, bar: Bar) -> AppendOutcome {
        match self.bars.back() {
            Some(tail) if bar.open_time < tail.open_time => AppendOutcome::OutOfOrder,
            Some(tail) if bar.open_time == tail.open_time => {
                *self.bars.back_mut().unwrap() = bar;
                let row = self.compute_tail_row();
                *self.rows.back_mut().unwrap() = row;
                AppendOutcome::Replaced
            }
            _ => {
                if self.bars.len() == self.capacity {
                    self.bars.pop_front();
                    self.rows.pop_front();
                }
                self.bars.push_back(bar);
                let row = self.compute_tail_row();
                self.rows.push_back(row);
                AppendOutcome::Appended
            }
        }
    }

    fn compute_tail_row(&self) -> IndicatorRow {
        let bars: Vec<Bar> = self.bars.iter().cloned().collect();
        IndicatorRow::compute(&bars)
    }

    /// Copy out up to the `n` most recent bars with their rows.
    pub fn snapshot(&self, n: usize) -> BarWindow {
        let take = n.min(self.bars.len());
        let skip = self.bars.len() - take;
        BarWindow {
            bars: self.bars.iter().skip(skip).cloned().collect(),
            indicators: self.rows.iter().skip(skip).cloned().collect(),
        }
    }
}
