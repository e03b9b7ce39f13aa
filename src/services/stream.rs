//! The stream worker: owner of the market-data subscription.
//!
//! Converts inbound events into typed engine messages and keeps the
//! subscription alive across disconnects with bounded exponential
//! backoff. Upstream connection caps are respected: the previous
//! connection gets a quiescent delay before re-dialing, a latch forbids
//! concurrent attempts, and a connection-limit refusal is fatal for the
//! engine instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::config::ReconnectPolicy;
use crate::error::{ErrorCounters, StreamError};
use crate::events::{EngineEvent, EngineMessage, StatusCode, StatusEvent, StreamEvent};
use crate::exchange::traits::MarketDataPort;

pub(crate) struct StreamWorker {
    market: Arc<dyn MarketDataPort>,
    symbols: Vec<String>,
    timeframe: String,
    inbox: mpsc::Sender<EngineMessage>,
    fatal_tx: mpsc::Sender<String>,
    policy: ReconnectPolicy,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    counters: Arc<ErrorCounters>,
    bus: EventBus,
    connecting: AtomicBool,
}

enum ConnectionEnd {
    Dropped(String),
    Fatal(String),
    Cancelled,
}

impl StreamWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        market: Arc<dyn MarketDataPort>,
        symbols: Vec<String>,
        timeframe: String,
        inbox: mpsc::Sender<EngineMessage>,
        fatal_tx: mpsc::Sender<String>,
        policy: ReconnectPolicy,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
        counters: Arc<ErrorCounters>,
        bus: EventBus,
    ) -> Self {
        Self {
            market,
            symbols,
            timeframe,
            inbox,
            fatal_tx,
            policy,
            clock,
            cancel,
            counters,
            bus,
            connecting: AtomicBool::new(false),
        }
    }

    pub(crate) async fn run(self) {
        info!("[STREAM] worker started for {:?}", self.symbols);
        let mut attempts: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // Connecting latch: a second dial while one is underway is a
            // bug, not a race we ride out.
            if self.connecting.swap(true, Ordering::SeqCst) {
                warn!("[STREAM] connect attempt while already connecting, skipping");
                return;
            }
            let subscribed = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.connecting.store(false, Ordering::SeqCst);
                    break;
                }
                r = self.market.subscribe(&self.symbols, &self.timeframe) => r,
            };
            self.connecting.store(false, Ordering::SeqCst);

            match subscribed {
                Ok(rx) => {
                    attempts = 0;
                    info!("[STREAM] subscribed to {:?}", self.symbols);
                    match self.pump(rx).await {
                        ConnectionEnd::Cancelled => break,
                        ConnectionEnd::Fatal(reason) => {
                            self.counters.bump_fatal();
                            error!("[STREAM] fatal: {}", reason);
                            let _ = self.fatal_tx.send(reason).await;
                            return;
                        }
                        ConnectionEnd::Dropped(reason) => {
                            self.counters.bump_stream_transient();
                            self.publish_gap(format!("stream dropped: {reason}"));
                        }
                    }
                }
                Err(StreamError::ConnectionLimit(reason)) => {
                    self.counters.bump_fatal();
                    error!("[STREAM] connection limit: {}", reason);
                    let _ = self.fatal_tx.send(reason).await;
                    return;
                }
                Err(StreamError::Transient(reason)) => {
                    self.counters.bump_stream_transient();
                    self.publish_gap(format!("connect failed: {reason}"));
                }
            }

            attempts += 1;
            if attempts > self.policy.max_attempts {
                let reason = format!(
                    "reconnect attempts exhausted ({})",
                    self.policy.max_attempts
                );
                self.counters.bump_fatal();
                error!("[STREAM] {}", reason);
                let _ = self.fatal_tx.send(reason).await;
                return;
            }

            // Let the old connection fully close before dialing again.
            let backoff = self.policy.backoff_for(attempts);
            info!(
                "[STREAM] reconnect {}/{} in {:?} (+{:?} quiescent)",
                attempts, self.policy.max_attempts, backoff, self.policy.quiescent_delay
            );
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.clock.sleep(self.policy.quiescent_delay) => {}
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.clock.sleep(backoff) => {}
            }
        }
        info!("[STREAM] worker stopped");
    }

    /// Forward events until the connection ends.
    async fn pump(&self, mut rx: mpsc::Receiver<StreamEvent>) -> ConnectionEnd {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => return ConnectionEnd::Cancelled,
                ev = rx.recv() => ev,
            };
            let msg = match event {
                Some(StreamEvent::BarClose(bar)) => EngineMessage::BarClose(bar),
                Some(StreamEvent::BarUpdate(bar)) => EngineMessage::BarUpdate(bar),
                Some(StreamEvent::Trade(tick)) => EngineMessage::TradeTick(tick),
                Some(StreamEvent::Disconnect { reason }) => {
                    if reason.contains("connection limit") {
                        return ConnectionEnd::Fatal(reason);
                    }
                    return ConnectionEnd::Dropped(reason);
                }
                None => return ConnectionEnd::Dropped("stream ended".into()),
            };
            if self.inbox.send(msg).await.is_err() {
                return ConnectionEnd::Cancelled;
            }
        }
    }

    fn publish_gap(&self, message: String) {
        self.bus.publish(EngineEvent::Status(StatusEvent {
            code: StatusCode::StreamGap,
            symbol: None,
            message,
            at: self.clock.now(),
        }));
    }
}
