pub mod bar_buffer;
pub mod indicators;

pub use bar_buffer::{AppendOutcome, Bar, BarBuffer, BarWindow, IndicatorRow, TradeTick};

#[cfg(test)]
mod bar_buffer_tests;
