//! Signal-generating strategies.
//!
//! Each strategy is an independent value behind a narrow capability set:
//! a signal rule over the bar window, a warm-up length, and a static
//! per-regime suitability score. No registration magic; the built-in set
//! is constructed explicitly.

use serde::{Deserialize, Serialize};

use crate::data::BarWindow;
use crate::exchange::types::PositionSide;
use crate::meta::regime::Regime;

pub mod mean_reversion;
pub mod trend_following;
pub mod volatility_breakout;

pub use mean_reversion::MeanReversion;
pub use trend_following::TrendFollowing;
pub use volatility_breakout::VolatilityBreakout;

#[cfg(test)]
mod strategy_tests;

/// Discrete decision produced at one bar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Buy => "BUY",
            SignalKind::Sell => "SELL",
            SignalKind::Hold => "HOLD",
        }
    }
}

pub trait Strategy: Send + Sync {
    /// Stable identity used for selection, suppression and attribution.
    fn name(&self) -> &'static str;

    /// Bars required before the signal rule is meaningful. Shorter
    /// windows always produce `Hold`.
    fn warmup_bars(&self) -> usize;

    /// Static fit score for a regime, in [0, 1].
    fn suitability(&self, regime: Regime) -> f64;

    /// Evaluate the most recent bar. `position` carries the side of the
    /// currently open position for this symbol, if any, so reversion
    /// exits can distinguish take-profit from entry.
    fn generate_signal(&self, window: &BarWindow, position: Option<PositionSide>) -> SignalKind;
}

/// The built-in strategies, iterated in registration order so that
/// selection is reproducible.
pub struct StrategySet {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategySet {
    pub fn builtin() -> Self {
        Self {
            strategies: vec![
                Box::new(TrendFollowing::default()),
                Box::new(MeanReversion::default()),
                Box::new(VolatilityBreakout::default()),
            ],
        }
    }

    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Strategy> {
        self.strategies
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Strategy> {
        self.strategies.iter().map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
