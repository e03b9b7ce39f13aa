//! Typed errors for the trading engine.
//!
//! Every recoverable failure is represented as a value; workers convert
//! component errors into status events at the boundary instead of raising.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Market-data stream failures.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Disconnects, timeouts, parse hiccups. The stream worker recovers
    /// these with backoff.
    #[error("transient stream error: {0}")]
    Transient(String),

    /// The upstream refused a new subscription. Fatal for this engine
    /// instance; a restart is only allowed after the configured cooldown.
    #[error("connection limit exceeded: {0}")]
    ConnectionLimit(String),
}

/// Brokerage failures.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("order rejected: {reason}")]
    Rejected { reason: String },

    #[error("order not found: {order_id}")]
    OrderNotFound { order_id: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Local trade-validation rejections. These are informational: the
/// recommendation becomes a "no trade" status carrying the reason.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskReject {
    #[error("position size rounded to zero")]
    ZeroQuantity,

    #[error("insufficient buying power: need {needed:.2}, have {available:.2}")]
    InsufficientBuyingPower { needed: f64, available: f64 },

    #[error("portfolio too concentrated: {would_be:.1}% > {limit:.1}%")]
    ConcentrationExceeded { would_be: f64, limit: f64 },

    #[error("portfolio drawdown {drawdown:.1}% exceeds limit {limit:.1}%")]
    DrawdownExceeded { drawdown: f64, limit: f64 },

    #[error("no open position to close for {symbol}")]
    NoPositionToClose { symbol: String },
}

/// Engine lifecycle errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine already started")]
    AlreadyStarted,

    #[error("engine is not running")]
    NotRunning,

    #[error("engine stopped: {reason}")]
    Stopped { reason: String },

    #[error("restart refused, cooldown active for {remaining_secs}s")]
    CooldownActive { remaining_secs: i64 },

    #[error("shutdown timed out, workers abandoned")]
    ShutdownTimeout,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Monotonic counters for every handled error class. No error is silently
/// swallowed: each recovery path bumps exactly one of these, and the
/// snapshot exposes them.
#[derive(Debug, Default)]
pub struct ErrorCounters {
    pub stream_transient: AtomicU64,
    pub broker_rejects: AtomicU64,
    pub risk_rejects: AtomicU64,
    pub data_integrity: AtomicU64,
    pub out_of_order_bars: AtomicU64,
    pub fatal: AtomicU64,
}

/// Plain-value copy of [`ErrorCounters`] for snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ErrorCounterSnapshot {
    pub stream_transient: u64,
    pub broker_rejects: u64,
    pub risk_rejects: u64,
    pub data_integrity: u64,
    pub out_of_order_bars: u64,
    pub fatal: u64,
}

impl ErrorCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump_stream_transient(&self) {
        self.stream_transient.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_broker_reject(&self) {
        self.broker_rejects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_risk_reject(&self) {
        self.risk_rejects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_data_integrity(&self) {
        self.data_integrity.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_out_of_order(&self) {
        self.out_of_order_bars.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_fatal(&self) {
        self.fatal.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ErrorCounterSnapshot {
        ErrorCounterSnapshot {
            stream_transient: self.stream_transient.load(Ordering::Relaxed),
            broker_rejects: self.broker_rejects.load(Ordering::Relaxed),
            risk_rejects: self.risk_rejects.load(Ordering::Relaxed),
            data_integrity: self.data_integrity.load(Ordering::Relaxed),
            out_of_order_bars: self.out_of_order_bars.load(Ordering::Relaxed),
            fatal: self.fatal.load(Ordering::Relaxed),
        }
    }
}
