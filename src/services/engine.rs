//! The trading engine: construction, lifecycle, and the control port.
//!
//! One engine value owns the four workers of the runtime. There is no
//! process-wide state; everything hangs off this struct and the handles
//! it gives out. The engine itself is a cheap clone over shared inner
//! state so the control worker can route `Start`/`Stop` commands back
//! through the same lifecycle paths. A stopped engine is single-use:
//! build a new one to trade again.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::config::{AppConfig, ReconnectPolicy};
use crate::data::{Bar, TradeTick};
use crate::error::{EngineError, ErrorCounters};
use crate::events::{
    ControlCommand, ControlResponse, EngineEvent, EngineMessage, EngineSnapshot, EngineState,
    StatusCode, StatusEvent,
};
use crate::exchange::traits::{BrokerPort, MarketDataPort};
use crate::meta::performance::PerformanceMonitor;
use crate::meta::selector::SelectorConfig;
use crate::services::risk::RiskConfig;

use super::account_cache::AccountCache;
use super::analysis::AnalysisWorker;
use super::control::ControlWorker;
use super::execution::ExecutionWorker;
use super::position_tracker::PositionTracker;
use super::stream::StreamWorker;

const INBOX_CAPACITY: usize = 1024;
const EXEC_CAPACITY: usize = 64;
const CONTROL_CAPACITY: usize = 32;

/// Engine-level knobs, separated from env parsing so tests construct it
/// directly.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub min_bars: usize,
    pub buffer_capacity: usize,
    pub perf_window: usize,
    pub tick_period: Duration,
    pub suppression_ttl: Duration,
    pub auto_execute: bool,
    pub close_on_shutdown: bool,
    pub reconnect: ReconnectPolicy,
    pub restart_cooldown: Duration,
    pub bus_capacity: usize,
    pub risk: RiskConfig,
    pub selector: SelectorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["SPY".to_string()],
            timeframe: "1Min".to_string(),
            min_bars: 20,
            buffer_capacity: 500,
            perf_window: 50,
            tick_period: Duration::from_secs(3),
            suppression_ttl: Duration::from_secs(900),
            auto_execute: false,
            close_on_shutdown: false,
            reconnect: ReconnectPolicy::default(),
            restart_cooldown: Duration::from_secs(300),
            bus_capacity: 1024,
            risk: RiskConfig::default(),
            selector: SelectorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            symbols: config.symbols.clone(),
            timeframe: config.timeframe.clone(),
            min_bars: config.min_bars,
            buffer_capacity: config.buffer_capacity,
            perf_window: config.perf_window,
            tick_period: config.tick_period,
            suppression_ttl: config.suppression_ttl,
            auto_execute: config.auto_execute,
            close_on_shutdown: config.close_on_shutdown,
            reconnect: config.reconnect,
            restart_cooldown: config.restart_cooldown,
            bus_capacity: config.bus_capacity,
            risk: config.risk(),
            selector: SelectorConfig::default(),
        }
    }
}

/// Shared lifecycle state, written by the control worker and the stop
/// path, read by snapshots.
#[derive(Debug)]
pub struct EngineStatus {
    pub state: EngineState,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            state: EngineState::Idle,
            cooldown_until: None,
        }
    }
}

/// Cloneable command surface over the engine. Every command travels the
/// control channel and is dispatched by the control worker.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlCommand>,
}

impl ControlHandle {
    pub async fn start(&self) -> Result<ControlResponse, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlCommand::Start { reply })
            .await
            .map_err(|_| EngineError::NotRunning)?;
        rx.await.map_err(|_| EngineError::NotRunning)
    }

    pub async fn stop(&self, timeout: Duration) -> Result<ControlResponse, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlCommand::Stop { timeout, reply })
            .await
            .map_err(|_| EngineError::NotRunning)?;
        rx.await.map_err(|_| EngineError::NotRunning)
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlCommand::Snapshot { reply })
            .await
            .map_err(|_| EngineError::NotRunning)?;
        rx.await.map_err(|_| EngineError::NotRunning)
    }

    pub async fn accept(&self, signal_id: Uuid) -> Result<ControlResponse, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlCommand::Accept { signal_id, reply })
            .await
            .map_err(|_| EngineError::NotRunning)?;
        rx.await.map_err(|_| EngineError::NotRunning)
    }

    pub async fn skip(&self, signal_id: Uuid) -> Result<ControlResponse, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlCommand::Skip { signal_id, reply })
            .await
            .map_err(|_| EngineError::NotRunning)?;
        rx.await.map_err(|_| EngineError::NotRunning)
    }
}

struct EngineInner {
    config: EngineConfig,
    broker: Arc<dyn BrokerPort>,
    market: Arc<dyn MarketDataPort>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    cancel: CancellationToken,
    counters: Arc<ErrorCounters>,
    tracker: PositionTracker,
    perf: Arc<RwLock<PerformanceMonitor>>,
    status: Arc<Mutex<EngineStatus>>,
    inbox_tx: mpsc::Sender<EngineMessage>,
    inbox_rx: Mutex<Option<mpsc::Receiver<EngineMessage>>>,
    control_tx: mpsc::Sender<ControlCommand>,
    control_rx: Mutex<Option<mpsc::Receiver<ControlCommand>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct TradingEngine {
    inner: Arc<EngineInner>,
}

impl TradingEngine {
    pub fn new(
        config: EngineConfig,
        broker: Arc<dyn BrokerPort>,
        market: Arc<dyn MarketDataPort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let bus = EventBus::new(config.bus_capacity);
        let perf = Arc::new(RwLock::new(PerformanceMonitor::new(config.perf_window)));
        Self {
            inner: Arc::new(EngineInner {
                broker,
                market,
                clock,
                bus,
                cancel: CancellationToken::new(),
                counters: Arc::new(ErrorCounters::new()),
                tracker: PositionTracker::new(),
                perf,
                status: Arc::new(Mutex::new(EngineStatus::default())),
                inbox_tx,
                inbox_rx: Mutex::new(Some(inbox_rx)),
                control_tx,
                control_rx: Mutex::new(Some(control_rx)),
                workers: Mutex::new(Vec::new()),
                config,
            }),
        }
    }

    /// Subscribe to the outbound event stream (status, recommendations,
    /// strategy switches).
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.bus.subscribe()
    }

    /// The command surface handed to UIs and tests.
    pub fn handle(&self) -> ControlHandle {
        ControlHandle {
            tx: self.inner.control_tx.clone(),
        }
    }

    pub fn position_tracker(&self) -> PositionTracker {
        self.inner.tracker.clone()
    }

    /// Spawn the four workers and the decision-tick timer. Fails when
    /// the engine was already started or a fatal stop armed the restart
    /// cooldown.
    pub fn start(&self) -> Result<(), EngineError> {
        let inner = &self.inner;
        {
            let mut status = inner.status.lock().unwrap();
            match &status.state {
                EngineState::Idle => {}
                EngineState::Running => return Err(EngineError::AlreadyStarted),
                EngineState::Stopped { reason } => {
                    if let Some(until) = status.cooldown_until {
                        let remaining = (until - inner.clock.now()).num_seconds();
                        if remaining > 0 {
                            return Err(EngineError::CooldownActive {
                                remaining_secs: remaining,
                            });
                        }
                    }
                    return Err(EngineError::Stopped {
                        reason: reason.clone(),
                    });
                }
            }
            status.state = EngineState::Running;
        }

        let inbox_rx = inner
            .inbox_rx
            .lock()
            .unwrap()
            .take()
            .ok_or(EngineError::AlreadyStarted)?;
        let control_rx = inner
            .control_rx
            .lock()
            .unwrap()
            .take()
            .ok_or(EngineError::AlreadyStarted)?;

        let (exec_tx, exec_rx) = mpsc::channel(EXEC_CAPACITY);
        let (fatal_tx, fatal_rx) = mpsc::channel(4);
        let account = AccountCache::new();

        let stream = StreamWorker::new(
            inner.market.clone(),
            inner.config.symbols.clone(),
            inner.config.timeframe.clone(),
            inner.inbox_tx.clone(),
            fatal_tx,
            inner.config.reconnect,
            inner.clock.clone(),
            inner.cancel.clone(),
            inner.counters.clone(),
            inner.bus.clone(),
        );

        let analysis = AnalysisWorker::new(
            inner.config.clone(),
            inbox_rx,
            exec_tx,
            inner.bus.clone(),
            inner.clock.clone(),
            inner.cancel.clone(),
            inner.counters.clone(),
            inner.perf.clone(),
            inner.tracker.clone(),
            account.clone(),
            inner.status.clone(),
        );

        let execution = ExecutionWorker::new(
            exec_rx,
            inner.broker.clone(),
            inner.bus.clone(),
            inner.clock.clone(),
            inner.cancel.clone(),
            inner.counters.clone(),
            inner.perf.clone(),
            inner.tracker.clone(),
            account,
            inner.config.risk.capital,
        );

        let control = ControlWorker::new(
            control_rx,
            fatal_rx,
            inner.inbox_tx.clone(),
            self.clone(),
            inner.cancel.clone(),
            inner.status.clone(),
            inner.bus.clone(),
            inner.clock.clone(),
            inner.config.restart_cooldown,
        );

        let tick_inbox = inner.inbox_tx.clone();
        let tick_clock = inner.clock.clone();
        let tick_cancel = inner.cancel.clone();
        let tick_period = inner.config.tick_period;
        let ticker = async move {
            loop {
                tokio::select! {
                    _ = tick_cancel.cancelled() => break,
                    _ = tick_clock.sleep(tick_period) => {
                        if tick_inbox.send(EngineMessage::Tick).await.is_err() {
                            break;
                        }
                    }
                }
            }
        };

        let mut workers = inner.workers.lock().unwrap();
        workers.push(tokio::spawn(stream.run()));
        workers.push(tokio::spawn(analysis.run()));
        workers.push(tokio::spawn(execution.run()));
        workers.push(tokio::spawn(control.run()));
        workers.push(tokio::spawn(ticker));

        info!(
            "[ENGINE] started: {:?} @ {} via {} (auto_execute={})",
            inner.config.symbols,
            inner.config.timeframe,
            inner.broker.name(),
            inner.config.auto_execute
        );
        Ok(())
    }

    /// Cancel all workers and join them within `timeout`. After this
    /// returns nothing further is published. Optionally closes open
    /// positions best-effort first. Safe to race with the control-port
    /// stop path: the worker handles drain exactly once.
    pub async fn stop(&self, timeout: Duration) -> Result<(), EngineError> {
        let inner = &self.inner;
        let newly_stopped = {
            let mut status = inner.status.lock().unwrap();
            if matches!(status.state, EngineState::Idle) {
                return Err(EngineError::NotRunning);
            }
            let first = !matches!(status.state, EngineState::Stopped { .. });
            if first {
                status.state = EngineState::Stopped {
                    reason: "stop requested".to_string(),
                };
            }
            first
        };
        if newly_stopped {
            inner.bus.publish(EngineEvent::Status(StatusEvent {
                code: StatusCode::Stopped,
                symbol: None,
                message: "stop requested".to_string(),
                at: inner.clock.now(),
            }));
        }

        if inner.config.close_on_shutdown {
            for position in inner.tracker.all() {
                info!("[ENGINE] closing {} on shutdown", position.symbol);
                if let Err(e) = inner.broker.close_position(&position.symbol).await {
                    warn!("[ENGINE] close failed for {}: {}", position.symbol, e);
                }
            }
        }

        inner.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = inner.workers.lock().unwrap().drain(..).collect();
        let deadline = tokio::time::Instant::now() + timeout;
        for handle in handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("[ENGINE] worker did not stop in time, abandoning");
                    return Err(EngineError::ShutdownTimeout);
                }
            }
        }
        info!("[ENGINE] stopped");
        Ok(())
    }

    /// Feed one bar directly into the pipeline, bypassing the stream
    /// worker. Used by embedders that own their own data source.
    pub async fn on_bar(&self, bar: Bar, closed: bool) -> Result<(), EngineError> {
        let msg = if closed {
            EngineMessage::BarClose(bar)
        } else {
            EngineMessage::BarUpdate(bar)
        };
        self.inner
            .inbox_tx
            .send(msg)
            .await
            .map_err(|_| EngineError::NotRunning)
    }

    pub async fn on_trade_tick(&self, tick: TradeTick) -> Result<(), EngineError> {
        self.inner
            .inbox_tx
            .send(EngineMessage::TradeTick(tick))
            .await
            .map_err(|_| EngineError::NotRunning)
    }

    /// Route a user verdict to the pipeline.
    pub async fn apply_feedback(&self, signal_id: Uuid, accepted: bool) -> Result<(), EngineError> {
        self.inner
            .inbox_tx
            .send(EngineMessage::Feedback {
                signal_id,
                accepted,
            })
            .await
            .map_err(|_| EngineError::NotRunning)
    }

    /// Consistent snapshot served by the analysis worker.
    pub async fn snapshot(&self) -> Result<EngineSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .inbox_tx
            .send(EngineMessage::SnapshotRequest { reply })
            .await
            .map_err(|_| EngineError::NotRunning)?;
        rx.await.map_err(|_| EngineError::NotRunning)
    }

    pub fn state(&self) -> EngineState {
        self.inner.status.lock().unwrap().state.clone()
    }
}
