//! In-memory tracking of positions opened by this engine.
//!
//! The tracker keeps what the broker cannot tell us: the protective
//! stop/target attached to each fill and the strategy/regime context the
//! entry was taken in, which later becomes part of the closed trade
//! record. Written by the execution worker, read by analysis.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;

use crate::exchange::types::PositionSide;
use crate::meta::regime::Regime;

#[derive(Clone, Debug)]
pub struct TrackedPosition {
    pub symbol: String,
    pub side: PositionSide,
    pub qty: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub opened_at: DateTime<Utc>,
    pub strategy_name: String,
    pub regime_at_entry: Regime,
    pub capital_at_entry: f64,
}

#[derive(Clone, Default)]
pub struct PositionTracker {
    positions: Arc<DashMap<String, TrackedPosition>>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, position: TrackedPosition) {
        info!(
            "[TRACKER] opened {} {:.4} @ {:.4} (sl {:.4}, tp {:.4})",
            position.symbol, position.qty, position.entry_price, position.stop_loss,
            position.take_profit
        );
        self.positions.insert(position.symbol.clone(), position);
    }

    pub fn remove(&self, symbol: &str) -> Option<TrackedPosition> {
        let removed = self.positions.remove(symbol).map(|(_, p)| p);
        if removed.is_some() {
            info!("[TRACKER] closed {}", symbol);
        }
        removed
    }

    pub fn get(&self, symbol: &str) -> Option<TrackedPosition> {
        self.positions.get(symbol).map(|p| p.clone())
    }

    pub fn has(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn all(&self) -> Vec<TrackedPosition> {
        self.positions.iter().map(|p| p.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
