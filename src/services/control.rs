//! The control worker: command dispatch and fatal-error handling.
//!
//! Commands arrive on the control channel with typed replies. Start and
//! stop are routed back into the engine's own lifecycle paths so the
//! control port gives the same guarantees as the direct methods —
//! stop joins all workers within the requested timeout. Snapshots are
//! relayed to the analysis worker so they reflect a consistent view of
//! the buffers. A fatal notice from the stream worker transitions the
//! engine to Stopped and arms the restart cooldown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::events::{
    ControlCommand, ControlResponse, EngineEvent, EngineMessage, EngineState, StatusCode,
    StatusEvent,
};

use super::engine::{EngineStatus, TradingEngine};

pub(crate) struct ControlWorker {
    rx: mpsc::Receiver<ControlCommand>,
    fatal_rx: mpsc::Receiver<String>,
    inbox: mpsc::Sender<EngineMessage>,
    engine: TradingEngine,
    cancel: CancellationToken,
    status: Arc<Mutex<EngineStatus>>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    restart_cooldown: Duration,
}

impl ControlWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        rx: mpsc::Receiver<ControlCommand>,
        fatal_rx: mpsc::Receiver<String>,
        inbox: mpsc::Sender<EngineMessage>,
        engine: TradingEngine,
        cancel: CancellationToken,
        status: Arc<Mutex<EngineStatus>>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
        restart_cooldown: Duration,
    ) -> Self {
        Self {
            rx,
            fatal_rx,
            inbox,
            engine,
            cancel,
            status,
            bus,
            clock,
            restart_cooldown,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("[CONTROL] worker started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.dispatch(cmd).await,
                    None => break,
                },
                fatal = self.fatal_rx.recv() => if let Some(reason) = fatal {
                    self.on_fatal(reason);
                    break;
                },
            }
        }
        info!("[CONTROL] worker stopped");
    }

    async fn dispatch(&mut self, cmd: ControlCommand) {
        match cmd {
            ControlCommand::Start { reply } => {
                // The worker only runs once the engine is up, so this
                // normally reports why a second start is refused.
                let response = match self.engine.start() {
                    Ok(()) => ControlResponse::Ok,
                    Err(e) => ControlResponse::Refused {
                        reason: e.to_string(),
                    },
                };
                let _ = reply.send(response);
            }
            ControlCommand::Stop { timeout, reply } => {
                info!("[CONTROL] stop requested (timeout {:?})", timeout);
                // Run the real stop path on its own task: it joins every
                // worker, including this one, within the timeout.
                let engine = self.engine.clone();
                tokio::spawn(async move {
                    let response = match engine.stop(timeout).await {
                        Ok(()) => ControlResponse::Ok,
                        Err(e) => ControlResponse::Refused {
                            reason: e.to_string(),
                        },
                    };
                    let _ = reply.send(response);
                });
            }
            ControlCommand::Snapshot { reply } => {
                // Forward the caller's reply slot; the analysis worker
                // answers directly.
                if self
                    .inbox
                    .send(EngineMessage::SnapshotRequest { reply })
                    .await
                    .is_err()
                {
                    // Receiver is dropped with the message; the caller
                    // observes a closed channel.
                }
            }
            ControlCommand::Accept { signal_id, reply } => {
                let sent = self
                    .inbox
                    .send(EngineMessage::Feedback {
                        signal_id,
                        accepted: true,
                    })
                    .await
                    .is_ok();
                let _ = reply.send(if sent {
                    ControlResponse::Ok
                } else {
                    ControlResponse::Refused {
                        reason: "engine not running".into(),
                    }
                });
            }
            ControlCommand::Skip { signal_id, reply } => {
                let sent = self
                    .inbox
                    .send(EngineMessage::Feedback {
                        signal_id,
                        accepted: false,
                    })
                    .await
                    .is_ok();
                let _ = reply.send(if sent {
                    ControlResponse::Ok
                } else {
                    ControlResponse::Refused {
                        reason: "engine not running".into(),
                    }
                });
            }
        }
    }

    fn on_fatal(&self, reason: String) {
        error!("[CONTROL] fatal stream error: {}", reason);
        self.mark_stopped(reason);
        self.cancel.cancel();
    }

    /// Record a fatal stop in shared state, arm the restart cooldown,
    /// and publish the final status.
    fn mark_stopped(&self, reason: String) {
        {
            let mut status = self.status.lock().unwrap();
            if matches!(status.state, EngineState::Stopped { .. }) {
                return;
            }
            status.state = EngineState::Stopped {
                reason: reason.clone(),
            };
            let cooldown = ChronoDuration::from_std(self.restart_cooldown)
                .unwrap_or_else(|_| ChronoDuration::seconds(300));
            status.cooldown_until = Some(self.clock.now() + cooldown);
        }
        self.bus.publish(EngineEvent::Status(StatusEvent {
            code: StatusCode::Stopped,
            symbol: None,
            message: reason,
            at: self.clock.now(),
        }));
    }
}
