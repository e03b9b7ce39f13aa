//! The analysis worker: owner of all per-symbol state and the decision
//! pipeline.
//!
//! Consumes the engine inbox exclusively, so bar buffers, the selector
//! and the suppressor need no locks. Each decision walks the pipeline:
//! regime -> strategy selection -> signal -> suppression -> risk ->
//! recommendation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::data::{BarBuffer, BarWindow};
use crate::error::{ErrorCounters, RiskReject};
use crate::events::{
    EngineMessage, EngineEvent, EngineSnapshot, Recommendation, StatusCode, StatusEvent,
    SymbolSnapshot,
};
use crate::exchange::types::{AccountSnapshot, Side};
use crate::meta::performance::PerformanceMonitor;
use crate::meta::regime::{RegimeClassifier, RegimeReading};
use crate::meta::selector::StrategySelector;
use crate::strategies::{SignalKind, StrategySet};

use super::account_cache::AccountCache;
use super::engine::{EngineConfig, EngineStatus};
use super::position_tracker::PositionTracker;
use super::risk::RiskManager;
use super::suppressor::{SignalSuppressor, SuppressionKey};

/// Consecutive integrity errors on one symbol within this span escalate
/// to a per-symbol fatal.
const INTEGRITY_LIMIT: u32 = 3;
const INTEGRITY_WINDOW_SECS: i64 = 60;

pub(crate) struct AnalysisWorker {
    config: EngineConfig,
    inbox: mpsc::Receiver<EngineMessage>,
    exec_tx: mpsc::Sender<Recommendation>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    counters: Arc<ErrorCounters>,
    perf: Arc<RwLock<PerformanceMonitor>>,
    tracker: PositionTracker,
    account: AccountCache,
    status: Arc<Mutex<EngineStatus>>,

    buffers: HashMap<String, BarBuffer>,
    classifier: RegimeClassifier,
    strategies: StrategySet,
    selector: StrategySelector,
    suppressor: SignalSuppressor,
    risk: RiskManager,

    pending: HashMap<Uuid, Recommendation>,
    last_readings: HashMap<String, RegimeReading>,
    last_decided: HashMap<String, DateTime<Utc>>,
    latest_trade: HashMap<String, f64>,
    integrity: HashMap<String, (u32, DateTime<Utc>)>,
    quarantined: HashSet<String>,
    closing: HashSet<String>,
}

#[allow(clippy::too_many_arguments)]
impl AnalysisWorker {
    pub(crate) fn new(
        config: EngineConfig,
        inbox: mpsc::Receiver<EngineMessage>,
        exec_tx: mpsc::Sender<Recommendation>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
        counters: Arc<ErrorCounters>,
        perf: Arc<RwLock<PerformanceMonitor>>,
        tracker: PositionTracker,
        account: AccountCache,
        status: Arc<Mutex<EngineStatus>>,
    ) -> Self {
        let selector = StrategySelector::new(config.selector, config.perf_window);
        let suppressor = SignalSuppressor::new(config.suppression_ttl);
        let risk = RiskManager::new(config.risk);
        Self {
            inbox,
            exec_tx,
            bus,
            clock,
            cancel,
            counters,
            perf,
            tracker,
            account,
            status,
            buffers: HashMap::new(),
            classifier: RegimeClassifier::new(),
            strategies: StrategySet::builtin(),
            selector,
            suppressor,
            risk,
            pending: HashMap::new(),
            last_readings: HashMap::new(),
            last_decided: HashMap::new(),
            latest_trade: HashMap::new(),
            integrity: HashMap::new(),
            quarantined: HashSet::new(),
            closing: HashSet::new(),
            config,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("[ANALYSIS] worker started ({} symbols)", self.config.symbols.len());
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                msg = self.inbox.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
            }
        }
        info!("[ANALYSIS] worker stopped");
    }

    async fn handle(&mut self, msg: EngineMessage) {
        match msg {
            EngineMessage::BarClose(bar) => {
                let symbol = bar.symbol.clone();
                if self.quarantined.contains(&symbol) {
                    return;
                }
                if !bar.is_finite() {
                    self.integrity_event(&symbol, "non-finite bar field");
                    return;
                }
                let buffer = self
                    .buffers
                    .entry(symbol.clone())
                    .or_insert_with(|| BarBuffer::new(symbol.clone(), self.config.buffer_capacity));
                match buffer.append_or_update(bar) {
                    crate::data::AppendOutcome::OutOfOrder => {
                        self.counters.bump_out_of_order();
                        self.integrity_event(&symbol, "out-of-order bar");
                    }
                    _ => self.decide(&symbol).await,
                }
            }
            EngineMessage::BarUpdate(bar) => {
                let symbol = bar.symbol.clone();
                if self.quarantined.contains(&symbol) {
                    return;
                }
                if !bar.is_finite() {
                    self.integrity_event(&symbol, "non-finite bar field");
                    return;
                }
                let buffer = self
                    .buffers
                    .entry(symbol.clone())
                    .or_insert_with(|| BarBuffer::new(symbol.clone(), self.config.buffer_capacity));
                if buffer.append_or_update(bar) == crate::data::AppendOutcome::OutOfOrder {
                    self.counters.bump_out_of_order();
                    self.integrity_event(&symbol, "out-of-order bar update");
                }
            }
            EngineMessage::TradeTick(tick) => {
                if tick.price.is_finite() && tick.price > 0.0 {
                    self.latest_trade.insert(tick.symbol.clone(), tick.price);
                    self.protective_exit(&tick.symbol).await;
                } else {
                    self.integrity_event(&tick.symbol.clone(), "non-finite trade price");
                }
            }
            EngineMessage::Tick => {
                let symbols = self.config.symbols.clone();
                for symbol in symbols {
                    if self.quarantined.contains(&symbol) {
                        continue;
                    }
                    let (len, latest) = match self.buffers.get(&symbol) {
                        Some(b) => (b.len(), b.latest_open_time()),
                        None => (0, None),
                    };
                    if len < self.config.min_bars {
                        self.publish_initializing(&symbol, len);
                        continue;
                    }
                    // Advisory: only re-decide when a bar arrived since
                    // the last decision, never fabricate from a timer.
                    let fresh = match (latest, self.last_decided.get(&symbol)) {
                        (Some(t), Some(last)) => t > *last,
                        (Some(_), None) => true,
                        _ => false,
                    };
                    if fresh {
                        self.decide(&symbol).await;
                    } else {
                        self.publish_status(
                            StatusCode::Scanning,
                            Some(symbol.as_str()),
                            "no new data since last decision".to_string(),
                        );
                    }
                }
            }
            EngineMessage::Feedback { signal_id, accepted } => {
                self.apply_feedback(signal_id, accepted).await;
            }
            EngineMessage::SnapshotRequest { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn apply_feedback(&mut self, signal_id: Uuid, accepted: bool) {
        let now = self.clock.now();
        match self.pending.remove(&signal_id) {
            Some(rec) => {
                let key = SuppressionKey {
                    strategy: rec.strategy_name.clone(),
                    regime: rec.regime,
                    side: rec.side,
                };
                self.suppressor.record_decision(key, accepted, now);
                if accepted {
                    info!("[ANALYSIS] {} accepted, forwarding to execution", signal_id);
                    if self.exec_tx.send(rec).await.is_err() {
                        warn!("[ANALYSIS] execution channel closed");
                    }
                } else {
                    info!(
                        "[ANALYSIS] {} skipped, suppressing context for {:?}",
                        signal_id, self.config.suppression_ttl
                    );
                }
            }
            None => warn!("[ANALYSIS] feedback for unknown signal {}", signal_id),
        }
    }

    /// One decision pass for a symbol whose buffer holds a fresh bar.
    async fn decide(&mut self, symbol: &str) {
        let (window, latest_open) = match self.buffers.get(symbol) {
            Some(b) if b.len() >= self.config.min_bars => {
                (b.snapshot(self.config.buffer_capacity), b.latest_open_time())
            }
            Some(b) => {
                let len = b.len();
                self.publish_initializing(symbol, len);
                return;
            }
            None => return,
        };
        if let Some(t) = latest_open {
            self.last_decided.insert(symbol.to_string(), t);
        }
        let now = self.clock.now();

        let reading = self.classifier.classify(&window, now);
        self.last_readings.insert(symbol.to_string(), reading.clone());

        let active = {
            let perf = self.perf.read().unwrap();
            let (active, switch) = self
                .selector
                .select(&reading, &self.strategies, &perf, now);
            drop(perf);
            if let Some(event) = switch {
                info!(
                    "[ANALYSIS] strategy switch {} -> {} ({})",
                    event.from,
                    event.to,
                    event.reason.as_str()
                );
                self.bus.publish(EngineEvent::Switch(event));
            }
            active
        };

        self.suppressor.tick(now);

        if self.protective_exit(symbol).await {
            return;
        }

        let position_side = self.tracker.get(symbol).map(|p| p.side);
        let side = match self.strategies.get(&active) {
            Some(strategy) => strategy.generate_signal(&window, position_side),
            None => return,
        };
        let price = match window.last_bar() {
            Some(b) => b.close,
            None => return,
        };

        if side == SignalKind::Hold {
            self.publish_status(
                StatusCode::Scanning,
                Some(symbol),
                format!("{} holding in {} regime", active, reading.regime),
            );
            return;
        }

        // Long-only gating: one position per symbol, sells only close.
        if side == SignalKind::Buy && self.tracker.has(symbol) {
            self.publish_status(
                StatusCode::Scanning,
                Some(symbol),
                "buy signal ignored, position already open".to_string(),
            );
            return;
        }
        if side == SignalKind::Sell && !self.tracker.has(symbol) {
            self.publish_status(
                StatusCode::Scanning,
                Some(symbol),
                "sell signal ignored, no open position".to_string(),
            );
            return;
        }

        let key = SuppressionKey {
            strategy: active.clone(),
            regime: reading.regime,
            side,
        };
        if !self.suppressor.should_emit(&key, now) {
            self.publish_status(
                StatusCode::SignalSuppressed,
                Some(symbol),
                format!("{} {} suppressed by earlier skip", active, side.as_str()),
            );
            return;
        }

        match side {
            SignalKind::Buy => self.recommend_entry(symbol, &window, &reading, &active, price, now).await,
            SignalKind::Sell => self.recommend_close(symbol, &reading, &active, price, now).await,
            SignalKind::Hold => {}
        }
    }

    async fn recommend_entry(
        &mut self,
        symbol: &str,
        window: &BarWindow,
        reading: &RegimeReading,
        strategy: &str,
        price: f64,
        now: DateTime<Utc>,
    ) {
        let atr = window.last_row().and_then(|r| r.atr14);
        let stop = self.risk.derive_stop_loss(price, atr, Side::Buy);
        let account = self.account.account().unwrap_or(AccountSnapshot {
            portfolio_value: self.config.risk.capital,
            cash: self.config.risk.capital,
            buying_power: self.config.risk.capital,
        });
        let positions = self.account.positions();

        match self
            .risk
            .size_and_validate(symbol, price, stop, atr, reading, &account, &positions)
        {
            Ok(plan) => {
                let rationale = format!(
                    "{} regime at {:.0}% confidence; {} signals entry at {:.2}; \
                     stop {:.2}, target {:.2}; {} risk ({:.0}/100)",
                    reading.regime,
                    reading.top_confidence() * 100.0,
                    strategy,
                    price,
                    plan.stop_loss,
                    plan.take_profit,
                    plan.risk_level.as_str(),
                    plan.risk_score,
                );
                let rec = Recommendation {
                    signal_id: Uuid::new_v4(),
                    symbol: symbol.to_string(),
                    side: SignalKind::Buy,
                    reference_price: price,
                    strategy_name: strategy.to_string(),
                    regime: reading.regime,
                    regime_confidence: reading.top_confidence(),
                    risk_score: plan.risk_score,
                    risk_level: plan.risk_level,
                    suggested_qty: plan.qty,
                    stop_loss: plan.stop_loss,
                    take_profit: plan.take_profit,
                    generated_at: now,
                    rationale,
                };
                self.publish_recommendation(rec).await;
            }
            Err(reason) => {
                self.counters.bump_risk_reject();
                self.publish_status(
                    StatusCode::RiskRejected,
                    Some(symbol),
                    format!("no trade: {reason}"),
                );
            }
        }
    }

    async fn recommend_close(
        &mut self,
        symbol: &str,
        reading: &RegimeReading,
        strategy: &str,
        price: f64,
        now: DateTime<Utc>,
    ) {
        // The execution worker can close the position between the
        // pipeline's gate check and here; that race is a risk reject,
        // not a silent drop.
        let Some(position) = self.tracker.get(symbol) else {
            self.counters.bump_risk_reject();
            let reason = RiskReject::NoPositionToClose {
                symbol: symbol.to_string(),
            };
            self.publish_status(
                StatusCode::RiskRejected,
                Some(symbol),
                format!("no trade: {reason}"),
            );
            return;
        };
        let risk_score = self
            .risk
            .entry_risk_score(price, position.stop_loss, None, reading);
        let rationale = format!(
            "{} signals exit at {:.2} for {:.4} held since {}",
            strategy,
            price,
            position.qty,
            position.opened_at.format("%Y-%m-%d %H:%M")
        );
        let rec = Recommendation {
            signal_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side: SignalKind::Sell,
            reference_price: price,
            strategy_name: strategy.to_string(),
            regime: reading.regime,
            regime_confidence: reading.top_confidence(),
            risk_score,
            risk_level: super::risk::RiskLevel::from_score(risk_score),
            suggested_qty: position.qty,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            generated_at: now,
            rationale,
        };
        self.publish_recommendation(rec).await;
    }

    async fn publish_recommendation(&mut self, rec: Recommendation) {
        self.publish_status(
            StatusCode::SignalEmitted,
            Some(rec.symbol.as_str()),
            format!(
                "{} {} {:.4} @ {:.2}",
                rec.strategy_name,
                rec.side.as_str(),
                rec.suggested_qty,
                rec.reference_price
            ),
        );
        self.pending.insert(rec.signal_id, rec.clone());
        self.bus.publish(EngineEvent::Recommendation(rec.clone()));
        if self.config.auto_execute {
            if self.exec_tx.send(rec).await.is_err() {
                warn!("[ANALYSIS] execution channel closed");
            }
        }
    }

    /// Emit a protective close when the latest price has crossed the
    /// tracked stop or target. Bypasses suppression: a stop is not a
    /// signal the user can skip. Returns true when an exit was emitted
    /// or is already in flight.
    async fn protective_exit(&mut self, symbol: &str) -> bool {
        let Some(position) = self.tracker.get(symbol) else {
            self.closing.remove(symbol);
            return false;
        };
        if self.closing.contains(symbol) {
            return true;
        }
        let price = self
            .latest_trade
            .get(symbol)
            .copied()
            .or_else(|| self.buffers.get(symbol).and_then(|b| b.latest_price()));
        let Some(price) = price else { return false };

        let hit_stop = price <= position.stop_loss;
        let hit_target = price >= position.take_profit;
        if !hit_stop && !hit_target {
            return false;
        }
        let cause = if hit_stop { "stop-loss" } else { "take-profit" };
        info!(
            "[ANALYSIS] {} {} hit at {:.2} (sl {:.2} / tp {:.2})",
            symbol, cause, price, position.stop_loss, position.take_profit
        );
        let now = self.clock.now();
        let reading = self
            .last_readings
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| self.classifier.classify(&BarWindow::default(), now));
        let rec = Recommendation {
            signal_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side: SignalKind::Sell,
            reference_price: price,
            strategy_name: position.strategy_name.clone(),
            regime: reading.regime,
            regime_confidence: reading.top_confidence(),
            risk_score: 0.0,
            risk_level: super::risk::RiskLevel::Low,
            suggested_qty: position.qty,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            generated_at: now,
            rationale: format!("{cause} exit at {price:.2}"),
        };
        self.closing.insert(symbol.to_string());
        self.bus.publish(EngineEvent::Recommendation(rec.clone()));
        if self.exec_tx.send(rec).await.is_err() {
            warn!("[ANALYSIS] execution channel closed");
        }
        true
    }

    fn integrity_event(&mut self, symbol: &str, what: &str) {
        self.counters.bump_data_integrity();
        let now = self.clock.now();
        let entry = self
            .integrity
            .entry(symbol.to_string())
            .or_insert((0, now));
        if (now - entry.1).num_seconds() > INTEGRITY_WINDOW_SECS {
            *entry = (0, now);
        }
        entry.0 += 1;
        warn!("[ANALYSIS] dropped event for {}: {} ({} recent)", symbol, what, entry.0);
        if entry.0 >= INTEGRITY_LIMIT {
            self.counters.bump_fatal();
            self.quarantined.insert(symbol.to_string());
            self.publish_status(
                StatusCode::SymbolQuarantined,
                Some(symbol),
                format!("{INTEGRITY_LIMIT} integrity errors within {INTEGRITY_WINDOW_SECS}s, symbol halted"),
            );
        }
    }

    fn publish_initializing(&self, symbol: &str, len: usize) {
        let remaining = self.config.min_bars.saturating_sub(len);
        self.publish_status(
            StatusCode::Initializing,
            Some(symbol),
            format!("initializing: {remaining} more bars needed"),
        );
    }

    fn publish_status(&self, code: StatusCode, symbol: Option<&str>, message: String) {
        self.bus.publish(EngineEvent::Status(StatusEvent {
            code,
            symbol: symbol.map(String::from),
            message,
            at: self.clock.now(),
        }));
    }

    fn snapshot(&self) -> EngineSnapshot {
        let state = self.status.lock().unwrap().state.clone();
        let symbols = self
            .config
            .symbols
            .iter()
            .map(|s| SymbolSnapshot {
                symbol: s.clone(),
                bars: self.buffers.get(s).map_or(0, |b| b.len()),
                latest_price: self.buffers.get(s).and_then(|b| b.latest_price()),
                regime: self.last_readings.get(s).map(|r| r.regime),
                quarantined: self.quarantined.contains(s),
            })
            .collect();
        EngineSnapshot {
            state,
            active_strategy: self.selector.current().map(String::from),
            symbols,
            performance: self.perf.read().unwrap().summary(),
            counters: self.counters.snapshot(),
            taken_at: self.clock.now(),
        }
    }
}
