//! Typed messages flowing between workers and out to consumers.
//!
//! Inbound stream events become engine messages on the analysis inbox;
//! the decision pipeline publishes engine events on the broadcast bus;
//! the control surface speaks commands with typed replies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::data::{Bar, TradeTick};
use crate::error::ErrorCounterSnapshot;
use crate::meta::performance::PerformanceSummary;
use crate::meta::regime::Regime;
use crate::meta::selector::SwitchEvent;
use crate::services::risk::RiskLevel;
use crate::strategies::SignalKind;

/// Events produced by a market-data subscription.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    /// A completed candle.
    BarClose(Bar),
    /// Partial update of the still-open candle; same `open_time` as the
    /// eventual close.
    BarUpdate(Bar),
    /// Individual trade print, used for latest-price tracking only.
    Trade(TradeTick),
    /// The connection is gone; the receiver ends after this.
    Disconnect { reason: String },
}

/// Messages consumed by the analysis worker. All buffer and suppressor
/// mutations happen through this inbox, which is what makes them
/// single-threaded without locks.
#[derive(Debug)]
pub enum EngineMessage {
    BarClose(Bar),
    BarUpdate(Bar),
    TradeTick(TradeTick),
    /// Advisory decision tick; never fabricates signals.
    Tick,
    /// User verdict on a published recommendation.
    Feedback { signal_id: Uuid, accepted: bool },
    /// Snapshot served from the analysis worker so it sees a consistent
    /// view of the buffers.
    SnapshotRequest {
        reply: oneshot::Sender<EngineSnapshot>,
    },
}

/// A discrete strategy decision at a point in time.
#[derive(Clone, Debug)]
pub struct Signal {
    pub id: Uuid,
    pub side: SignalKind,
    pub symbol: String,
    pub reference_price: f64,
    pub strategy_name: String,
    pub regime: Regime,
    pub generated_at: DateTime<Utc>,
}

/// A signed, sized, risk-checked proposal published to the outside.
#[derive(Clone, Debug)]
pub struct Recommendation {
    pub signal_id: Uuid,
    pub symbol: String,
    pub side: SignalKind,
    pub reference_price: f64,
    pub strategy_name: String,
    pub regime: Regime,
    pub regime_confidence: f64,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub suggested_qty: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub generated_at: DateTime<Utc>,
    pub rationale: String,
}

/// Machine-readable status codes for the UI collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Initializing,
    Scanning,
    SignalSuppressed,
    SignalEmitted,
    RiskRejected,
    OrderAccepted,
    OrderRejected,
    StreamGap,
    SymbolQuarantined,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct StatusEvent {
    pub code: StatusCode,
    pub symbol: Option<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Everything published on the outbound bus.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    Status(StatusEvent),
    Recommendation(Recommendation),
    Switch(SwitchEvent),
}

/// Commands accepted by the control port.
#[derive(Debug)]
pub enum ControlCommand {
    Start {
        reply: oneshot::Sender<ControlResponse>,
    },
    Stop {
        timeout: Duration,
        reply: oneshot::Sender<ControlResponse>,
    },
    Snapshot {
        reply: oneshot::Sender<EngineSnapshot>,
    },
    Accept {
        signal_id: Uuid,
        reply: oneshot::Sender<ControlResponse>,
    },
    Skip {
        signal_id: Uuid,
        reply: oneshot::Sender<ControlResponse>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlResponse {
    Ok,
    Refused { reason: String },
}

/// Engine lifecycle state. Stopped engines are single-use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Idle,
    Running,
    Stopped { reason: String },
}

/// Per-symbol view inside a snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct SymbolSnapshot {
    pub symbol: String,
    pub bars: usize,
    pub latest_price: Option<f64>,
    pub regime: Option<Regime>,
    pub quarantined: bool,
}

/// Consistent view of the engine served by the analysis worker.
#[derive(Clone, Debug, Serialize)]
pub struct EngineSnapshot {
    pub state: EngineState,
    pub active_strategy: Option<String>,
    pub symbols: Vec<SymbolSnapshot>,
    pub performance: PerformanceSummary,
    pub counters: ErrorCounterSnapshot,
    pub taken_at: DateTime<Utc>,
}
