//! RSI + Bollinger mean reversion.

use crate::data::{indicators, BarWindow};
use crate::exchange::types::PositionSide;
use crate::meta::regime::Regime;

use super::{SignalKind, Strategy};

/// BUY when oversold at the lower band, SELL when overbought at the
/// upper band. While a position is open, a re-touch of the middle band
/// closes it: crossing up through the middle exits a long, crossing down
/// exits a short.
pub struct MeanReversion {
    rsi_period: usize,
    rsi_oversold: f64,
    rsi_overbought: f64,
    bb_period: usize,
    bb_k: f64,
}

impl Default for MeanReversion {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            bb_period: 20,
            bb_k: 2.0,
        }
    }
}

impl Strategy for MeanReversion {
    fn name(&self) -> &'static str {
        "MeanReversion"
    }

    fn warmup_bars(&self) -> usize {
        self.bb_period.max(self.rsi_period + 1)
    }

    fn suitability(&self, regime: Regime) -> f64 {
        match regime {
            Regime::Sideways => 0.9,
            Regime::Volatile => 0.5,
            Regime::Trend => 0.3,
        }
    }

    fn generate_signal(&self, window: &BarWindow, position: Option<PositionSide>) -> SignalKind {
        if window.len() < self.warmup_bars() {
            return SignalKind::Hold;
        }
        let closes = window.closes();
        let close = *closes.last().unwrap();

        let rsi = match indicators::rsi(&closes, self.rsi_period) {
            Some(v) => v,
            None => return SignalKind::Hold,
        };
        let (upper, middle, lower) = match indicators::bollinger(&closes, self.bb_period, self.bb_k)
        {
            Some(bands) => bands,
            None => return SignalKind::Hold,
        };

        // Position exits take precedence over fresh entries.
        if let Some(side) = position {
            let prev_close = closes[closes.len() - 2];
            let prev_middle = indicators::bollinger(&closes[..closes.len() - 1], self.bb_period, self.bb_k)
                .map(|(_, m, _)| m);
            if let Some(pm) = prev_middle {
                match side {
                    PositionSide::Long if close > middle && prev_close <= pm => {
                        return SignalKind::Sell;
                    }
                    PositionSide::Short if close < middle && prev_close >= pm => {
                        return SignalKind::Buy;
                    }
                    _ => {}
                }
            }
        }

        if rsi < self.rsi_oversold && close <= lower {
            SignalKind::Buy
        } else if rsi > self.rsi_overbought && close >= upper {
            SignalKind::Sell
        } else {
            SignalKind::Hold
        }
    }
}
