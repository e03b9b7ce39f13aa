//! Moving-average crossover trend following.

use crate::data::{indicators, BarWindow};
use crate::exchange::types::PositionSide;
use crate::meta::regime::Regime;

use super::{SignalKind, Strategy};

/// BUY when the fast SMA crosses above the slow SMA, SELL on the inverse
/// cross. The first bar at which both averages are available counts as a
/// cross when they are already separated, so an engine joining mid-trend
/// still takes the position.
pub struct TrendFollowing {
    fast: usize,
    slow: usize,
    /// Entries are suppressed while ATR14 / close exceeds this cap.
    volatility_cap: Option<f64>,
}

impl Default for TrendFollowing {
    fn default() -> Self {
        Self {
            fast: 20,
            slow: 50,
            volatility_cap: None,
        }
    }
}

impl TrendFollowing {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self {
            fast,
            slow,
            volatility_cap: None,
        }
    }

    pub fn with_volatility_cap(mut self, cap: f64) -> Self {
        self.volatility_cap = Some(cap);
        self
    }
}

impl Strategy for TrendFollowing {
    fn name(&self) -> &'static str {
        "TrendFollowing"
    }

    fn warmup_bars(&self) -> usize {
        self.slow
    }

    fn suitability(&self, regime: Regime) -> f64 {
        match regime {
            Regime::Trend => 0.9,
            Regime::Volatile => 0.6,
            Regime::Sideways => 0.3,
        }
    }

    fn generate_signal(&self, window: &BarWindow, _position: Option<PositionSide>) -> SignalKind {
        if window.len() < self.warmup_bars() {
            return SignalKind::Hold;
        }
        let closes = window.closes();
        let (fast_now, slow_now) = match (
            indicators::sma(&closes, self.fast),
            indicators::sma(&closes, self.slow),
        ) {
            (Some(f), Some(s)) => (f, s),
            _ => return SignalKind::Hold,
        };

        if let (Some(cap), Some(atr), Some(bar)) = (
            self.volatility_cap,
            window.last_row().and_then(|r| r.atr14),
            window.last_bar(),
        ) {
            if bar.close > 0.0 && atr / bar.close > cap {
                return SignalKind::Hold;
            }
        }

        // A missing previous reading means the slow average only just
        // became available; treat the current separation as the cross.
        let prev_closes = &closes[..closes.len() - 1];
        let prev_fast = indicators::sma(prev_closes, self.fast);
        let prev_slow = indicators::sma(prev_closes, self.slow);

        let crossed_up = fast_now > slow_now
            && match (prev_fast, prev_slow) {
                (Some(f), Some(s)) => f <= s,
                _ => true,
            };
        let crossed_down = fast_now < slow_now
            && match (prev_fast, prev_slow) {
                (Some(f), Some(s)) => f >= s,
                _ => true,
            };

        if crossed_up {
            SignalKind::Buy
        } else if crossed_down {
            SignalKind::Sell
        } else {
            SignalKind::Hold
        }
    }
}
