//! The meta layer: regime classification, performance monitoring, and
//! the strategy-selection policy that sits on top of both.

pub mod performance;
pub mod regime;
pub mod selector;

pub use performance::{PerformanceMonitor, PerformanceWindow, StrategyHealth, TradeRecord};
pub use regime::{Regime, RegimeClassifier, RegimeReading};
pub use selector::{SelectorConfig, StrategySelector, SwitchEvent, SwitchReason};

#[cfg(test)]
mod performance_tests;
#[cfg(test)]
mod regime_tests;
#[cfg(test)]
mod selector_tests;
