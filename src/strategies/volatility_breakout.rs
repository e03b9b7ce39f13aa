//! Donchian breakout after volatility contraction.

use crate::data::{indicators, BarWindow};
use crate::exchange::types::PositionSide;
use crate::meta::regime::Regime;

use super::{SignalKind, Strategy};

/// BUY when the close breaks above the Donchian upper channel of the
/// preceding bars after an ATR squeeze (ATR14 below its rolling median),
/// SELL on a break below the lower channel. The channel excludes the
/// current bar so a breakout can actually exceed it.
pub struct VolatilityBreakout {
    atr_period: usize,
    donchian_period: usize,
    median_lookback: usize,
}

impl Default for VolatilityBreakout {
    fn default() -> Self {
        Self {
            atr_period: 14,
            donchian_period: 20,
            median_lookback: 50,
        }
    }
}

impl VolatilityBreakout {
    /// ATR14 values for the bars preceding the current one, newest last,
    /// capped at `median_lookback` samples.
    fn atr_history(&self, window: &BarWindow) -> Vec<f64> {
        let n = window.indicators.len();
        window.indicators[..n - 1]
            .iter()
            .rev()
            .filter_map(|row| row.atr14)
            .take(self.median_lookback)
            .collect()
    }
}

impl Strategy for VolatilityBreakout {
    fn name(&self) -> &'static str {
        "VolatilityBreakout"
    }

    fn warmup_bars(&self) -> usize {
        self.median_lookback
    }

    fn suitability(&self, regime: Regime) -> f64 {
        match regime {
            Regime::Volatile => 0.9,
            Regime::Trend => 0.6,
            Regime::Sideways => 0.4,
        }
    }

    fn generate_signal(&self, window: &BarWindow, _position: Option<PositionSide>) -> SignalKind {
        if window.len() < self.warmup_bars() {
            return SignalKind::Hold;
        }
        let close = match window.last_bar() {
            Some(b) => b.close,
            None => return SignalKind::Hold,
        };

        // Channel over the bars before the breakout candidate.
        let prior = &window.bars[..window.bars.len() - 1];
        let (upper, lower) = match indicators::donchian(prior, self.donchian_period) {
            Some(channel) => channel,
            None => return SignalKind::Hold,
        };

        let atr_now = match indicators::atr(prior, self.atr_period) {
            Some(v) => v,
            None => return SignalKind::Hold,
        };
        let history = self.atr_history(window);
        let squeezed = match indicators::median(&history) {
            Some(med) if med > 0.0 => atr_now < med,
            _ => false,
        };

        if close > upper && squeezed {
            SignalKind::Buy
        } else if close < lower {
            SignalKind::Sell
        } else {
            SignalKind::Hold
        }
    }
}
