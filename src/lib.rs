//! Adaptive regime-switching trading engine.
//!
//! A stream of bars drives a rolling per-symbol buffer; a regime
//! classifier and a meta-selector decide which strategy is in charge;
//! signals are suppression-gated, risk-sized, and published as
//! recommendations; accepted plans are routed to the brokerage by a
//! dedicated execution worker that feeds realized performance back into
//! selection.

pub mod bus;
pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod exchange;
pub mod meta;
pub mod services;
pub mod strategies;

pub use bus::EventBus;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, EngineMode};
pub use events::{EngineEvent, EngineSnapshot, Recommendation, StatusCode};
pub use services::{ControlHandle, EngineConfig, TradingEngine};

#[cfg(test)]
mod bus_tests;
#[cfg(test)]
mod events_tests;
#[cfg(test)]
mod config_tests;
