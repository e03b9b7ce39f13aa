//! The execution worker: sole user of the broker port.
//!
//! Accepted recommendations become limit orders at the reference price.
//! Submissions for the same symbol are serialized: while one is in
//! flight, later BUY plans coalesce (latest wins) and opposing sides
//! queue behind it. Fills feed the position tracker and the performance
//! monitor, which this worker alone writes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::error::{BrokerError, ErrorCounters};
use crate::events::{EngineEvent, Recommendation, StatusCode, StatusEvent};
use crate::exchange::traits::BrokerPort;
use crate::exchange::types::{
    OrderState, OrderType, PlaceOrderRequest, PositionSide, Side, TimeInForce,
};
use crate::meta::performance::{PerformanceMonitor, TradeRecord};
use crate::strategies::SignalKind;

use super::account_cache::AccountCache;
use super::position_tracker::{PositionTracker, TrackedPosition};

const FILL_POLL_LIMIT: u32 = 20;
const FILL_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Everything an order task needs, cheap to clone.
#[derive(Clone)]
struct ExecCtx {
    broker: Arc<dyn BrokerPort>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    counters: Arc<ErrorCounters>,
    perf: Arc<RwLock<PerformanceMonitor>>,
    tracker: PositionTracker,
    account: AccountCache,
    capital_fallback: f64,
}

pub(crate) struct ExecutionWorker {
    rx: mpsc::Receiver<Recommendation>,
    cancel: CancellationToken,
    ctx: ExecCtx,
}

impl ExecutionWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        rx: mpsc::Receiver<Recommendation>,
        broker: Arc<dyn BrokerPort>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
        counters: Arc<ErrorCounters>,
        perf: Arc<RwLock<PerformanceMonitor>>,
        tracker: PositionTracker,
        account: AccountCache,
        capital_fallback: f64,
    ) -> Self {
        Self {
            rx,
            cancel,
            ctx: ExecCtx {
                broker,
                bus,
                clock,
                counters,
                perf,
                tracker,
                account,
                capital_fallback,
            },
        }
    }

    pub(crate) async fn run(mut self) {
        info!("[EXECUTION] worker started ({})", self.ctx.broker.name());
        refresh_account(&self.ctx).await;

        let mut in_flight: HashSet<String> = HashSet::new();
        let mut queued: HashMap<String, VecDeque<Recommendation>> = HashMap::new();
        let (done_tx, mut done_rx) = mpsc::channel::<String>(64);
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                rec = self.rx.recv() => match rec {
                    Some(rec) => {
                        let symbol = rec.symbol.clone();
                        if in_flight.contains(&symbol) {
                            coalesce(&mut queued, rec);
                        } else {
                            in_flight.insert(symbol);
                            spawn_order(&mut tasks, self.ctx.clone(), rec, done_tx.clone());
                        }
                    }
                    None => break,
                },
                done = done_rx.recv() => if let Some(symbol) = done {
                    in_flight.remove(&symbol);
                    if let Some(next) = pop_queued(&mut queued, &symbol) {
                        in_flight.insert(symbol);
                        spawn_order(&mut tasks, self.ctx.clone(), next, done_tx.clone());
                    }
                },
            }
        }

        // Drain in-flight orders best-effort before exiting.
        drop(done_tx);
        while tasks.join_next().await.is_some() {}
        info!("[EXECUTION] worker stopped");
    }
}

/// Queue a plan behind an in-flight order. Same-side BUYs coalesce to
/// the latest plan; opposing sides are never merged.
fn coalesce(queued: &mut HashMap<String, VecDeque<Recommendation>>, rec: Recommendation) {
    let queue = queued.entry(rec.symbol.clone()).or_default();
    let replaces_tail = matches!(
        queue.back(),
        Some(back) if back.side == SignalKind::Buy && rec.side == SignalKind::Buy
    );
    if replaces_tail {
        info!(
            "[EXECUTION] coalescing BUY for {} (latest wins)",
            rec.symbol
        );
        if let Some(back) = queue.back_mut() {
            *back = rec;
        }
    } else {
        queue.push_back(rec);
    }
}

fn pop_queued(
    queued: &mut HashMap<String, VecDeque<Recommendation>>,
    symbol: &str,
) -> Option<Recommendation> {
    let queue = queued.get_mut(symbol)?;
    let next = queue.pop_front();
    if queue.is_empty() {
        queued.remove(symbol);
    }
    next
}

fn spawn_order(
    tasks: &mut JoinSet<()>,
    ctx: ExecCtx,
    rec: Recommendation,
    done_tx: mpsc::Sender<String>,
) {
    tasks.spawn(async move {
        let symbol = rec.symbol.clone();
        submit_and_settle(&ctx, rec).await;
        let _ = done_tx.send(symbol).await;
    });
}

async fn submit_and_settle(ctx: &ExecCtx, rec: Recommendation) {
    let side = match rec.side {
        SignalKind::Buy => Side::Buy,
        SignalKind::Sell => Side::Sell,
        SignalKind::Hold => return,
    };
    let req = PlaceOrderRequest {
        symbol: rec.symbol.clone(),
        side,
        order_type: OrderType::Limit,
        qty: rec.suggested_qty,
        limit_price: Some(rec.reference_price),
        time_in_force: TimeInForce::Day,
    };
    info!(
        "[EXECUTION] submitting {} {} {:.4} @ {:.2}",
        side.as_str(),
        req.symbol,
        req.qty,
        rec.reference_price
    );

    let ack = match ctx.broker.place_order(req).await {
        Ok(ack) => ack,
        Err(BrokerError::Rejected { reason }) => {
            ctx.counters.bump_broker_reject();
            warn!("[EXECUTION] broker rejected {}: {}", rec.symbol, reason);
            publish_status(
                ctx,
                StatusCode::OrderRejected,
                &rec.symbol,
                format!("rejected_by_broker: {reason}"),
            );
            return;
        }
        Err(e) => {
            ctx.counters.bump_broker_reject();
            error!("[EXECUTION] submit failed for {}: {}", rec.symbol, e);
            publish_status(
                ctx,
                StatusCode::OrderRejected,
                &rec.symbol,
                format!("submit failed: {e}"),
            );
            return;
        }
    };

    // Submits are never retried; the broker may not be idempotent.
    // Settlement is a bounded poll of the order status.
    let mut filled: Option<(f64, f64)> = None;
    for _ in 0..FILL_POLL_LIMIT {
        match ctx.broker.order_status(&ack.order_id).await {
            Ok(report) => match report.state {
                OrderState::Filled => {
                    filled = Some((
                        report.filled_qty,
                        report.avg_fill_price.unwrap_or(rec.reference_price),
                    ));
                    break;
                }
                OrderState::Canceled | OrderState::Rejected => {
                    ctx.counters.bump_broker_reject();
                    publish_status(
                        ctx,
                        StatusCode::OrderRejected,
                        &rec.symbol,
                        format!("order {} ended {:?}", ack.order_id, report.state),
                    );
                    return;
                }
                _ => ctx.clock.sleep(FILL_POLL_INTERVAL).await,
            },
            Err(e) => {
                warn!("[EXECUTION] status poll failed: {}", e);
                ctx.clock.sleep(FILL_POLL_INTERVAL).await;
            }
        }
    }

    let Some((fill_qty, fill_price)) = filled else {
        publish_status(
            ctx,
            StatusCode::OrderRejected,
            &rec.symbol,
            format!("order {} not filled within poll window", ack.order_id),
        );
        return;
    };

    settle_fill(ctx, &rec, side, fill_qty, fill_price).await;
}

async fn settle_fill(ctx: &ExecCtx, rec: &Recommendation, side: Side, qty: f64, price: f64) {
    let now = ctx.clock.now();
    match side {
        Side::Buy => {
            let capital_at_entry = ctx
                .account
                .account()
                .map(|a| a.portfolio_value)
                .unwrap_or(ctx.capital_fallback);
            ctx.tracker.add(TrackedPosition {
                symbol: rec.symbol.clone(),
                side: PositionSide::Long,
                qty,
                entry_price: price,
                stop_loss: rec.stop_loss,
                take_profit: rec.take_profit,
                opened_at: now,
                strategy_name: rec.strategy_name.clone(),
                regime_at_entry: rec.regime,
                capital_at_entry,
            });
        }
        Side::Sell => {
            if let Some(position) = ctx.tracker.remove(&rec.symbol) {
                let pnl = (price - position.entry_price) * qty;
                let trade = TradeRecord {
                    symbol: rec.symbol.clone(),
                    side: position.side,
                    qty,
                    entry_price: position.entry_price,
                    exit_price: price,
                    opened_at: position.opened_at,
                    closed_at: now,
                    realized_pnl: pnl,
                    capital_at_entry: position.capital_at_entry,
                    strategy_name: position.strategy_name,
                    regime_at_entry: position.regime_at_entry,
                };
                info!(
                    "[EXECUTION] closed {} for {:+.2} ({} -> {})",
                    rec.symbol, pnl, position.entry_price, price
                );
                ctx.perf.write().unwrap().record_trade(trade);
            }
        }
    }

    refresh_account(ctx).await;
    publish_status(
        ctx,
        StatusCode::OrderAccepted,
        &rec.symbol,
        format!("{} {:.4} filled @ {:.2}", side.as_str(), qty, price),
    );
}

/// Pull account + positions into the shared cache and sample the equity
/// curve. Called at startup and after every fill.
async fn refresh_account(ctx: &ExecCtx) {
    let account = match ctx.broker.get_account().await {
        Ok(a) => a,
        Err(e) => {
            warn!("[EXECUTION] account refresh failed: {}", e);
            return;
        }
    };
    let positions = ctx.broker.get_positions().await.unwrap_or_default();
    ctx.perf
        .write()
        .unwrap()
        .record_equity(ctx.clock.now(), account.portfolio_value);
    ctx.account.update(account, positions);
}

fn publish_status(ctx: &ExecCtx, code: StatusCode, symbol: &str, message: String) {
    ctx.bus.publish(EngineEvent::Status(StatusEvent {
        code,
        symbol: Some(symbol.to_string()),
        message,
        at: ctx.clock.now(),
    }));
}
