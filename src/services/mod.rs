pub mod account_cache;
pub mod analysis;
pub mod control;
pub mod engine;
pub mod execution;
pub mod position_tracker;
pub mod risk;
pub mod stream;
pub mod suppressor;

pub use engine::{ControlHandle, EngineConfig, TradingEngine};
pub use position_tracker::{PositionTracker, TrackedPosition};
pub use risk::{OrderPlan, RiskConfig, RiskLevel, RiskManager, StopLossMethod};
pub use suppressor::{SignalSuppressor, SuppressionKey};
