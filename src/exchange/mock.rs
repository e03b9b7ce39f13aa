//! In-process doubles for the two ports.
//!
//! [`MockBroker`] backs MOCK mode and the test suite: immediate fills at
//! the limit price against a simulated account, with scriptable rejects.
//! [`ScriptedMarketData`] hands out pre-built event channels so tests
//! control exactly what the stream delivers, including reconnects.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;

use crate::error::{BrokerError, StreamError};
use crate::events::StreamEvent;

use super::traits::{BrokerPort, BrokerResult, MarketDataPort};
use super::types::{
    AccountSnapshot, BrokerPosition, OrderAck, OrderState, OrderStatusReport, PlaceOrderRequest,
    PositionSide, Side,
};

struct MockAccount {
    cash: f64,
    positions: HashMap<String, BrokerPosition>,
}

impl MockAccount {
    fn portfolio_value(&self) -> f64 {
        self.cash
            + self
                .positions
                .values()
                .map(BrokerPosition::market_value)
                .sum::<f64>()
    }
}

struct MockState {
    account: MockAccount,
    orders: HashMap<String, OrderStatusReport>,
    /// Reasons queued by tests; each submit consumes one.
    scripted_rejects: Vec<String>,
}

/// Simulated brokerage with an internal cash ledger. Orders fill
/// instantly at the limit price (market orders are refused since the
/// mock has no tape of its own).
pub struct MockBroker {
    state: Mutex<MockState>,
}

impl MockBroker {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            state: Mutex::new(MockState {
                account: MockAccount {
                    cash: initial_cash,
                    positions: HashMap::new(),
                },
                orders: HashMap::new(),
                scripted_rejects: Vec::new(),
            }),
        }
    }

    /// Queue a rejection for the next submitted order.
    pub fn reject_next(&self, reason: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .scripted_rejects
            .push(reason.into());
    }

    pub fn position_count(&self) -> usize {
        self.state.lock().unwrap().account.positions.len()
    }

    fn gen_order_id() -> String {
        let n: u64 = rand::thread_rng().gen();
        format!("mock-{n:016x}")
    }
}

#[async_trait]
impl BrokerPort for MockBroker {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn place_order(&self, req: PlaceOrderRequest) -> BrokerResult<OrderAck> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.scripted_rejects.pop() {
            return Err(BrokerError::Rejected { reason });
        }
        let price = match req.limit_price {
            Some(p) if p > 0.0 => p,
            _ => {
                return Err(BrokerError::Rejected {
                    reason: "mock broker requires a limit price".into(),
                })
            }
        };
        if req.qty <= 0.0 {
            return Err(BrokerError::Rejected {
                reason: "non-positive quantity".into(),
            });
        }

        match req.side {
            Side::Buy => {
                let cost = req.qty * price;
                if cost > state.account.cash {
                    return Err(BrokerError::Rejected {
                        reason: "insufficient buying power".into(),
                    });
                }
                state.account.cash -= cost;
                let entry = state
                    .account
                    .positions
                    .entry(req.symbol.clone())
                    .or_insert(BrokerPosition {
                        symbol: req.symbol.clone(),
                        side: PositionSide::Long,
                        qty: 0.0,
                        avg_entry_price: 0.0,
                        opened_at: None,
                    });
                let total_cost = entry.qty * entry.avg_entry_price + cost;
                entry.qty += req.qty;
                entry.avg_entry_price = total_cost / entry.qty;
            }
            Side::Sell => {
                let held = state
                    .account
                    .positions
                    .get(&req.symbol)
                    .map(|p| p.qty)
                    .unwrap_or(0.0);
                if held < req.qty {
                    return Err(BrokerError::Rejected {
                        reason: format!("insufficient position: have {held}, want {}", req.qty),
                    });
                }
                state.account.cash += req.qty * price;
                let remaining = held - req.qty;
                if remaining <= f64::EPSILON {
                    state.account.positions.remove(&req.symbol);
                } else if let Some(p) = state.account.positions.get_mut(&req.symbol) {
                    p.qty = remaining;
                }
            }
        }

        let order_id = Self::gen_order_id();
        state.orders.insert(
            order_id.clone(),
            OrderStatusReport {
                order_id: order_id.clone(),
                state: OrderState::Filled,
                filled_qty: req.qty,
                avg_fill_price: Some(price),
            },
        );
        Ok(OrderAck {
            order_id,
            status: "filled".into(),
        })
    }

    async fn get_positions(&self) -> BrokerResult<Vec<BrokerPosition>> {
        let state = self.state.lock().unwrap();
        Ok(state.account.positions.values().cloned().collect())
    }

    async fn get_account(&self) -> BrokerResult<AccountSnapshot> {
        let state = self.state.lock().unwrap();
        let value = state.account.portfolio_value();
        Ok(AccountSnapshot {
            portfolio_value: value,
            cash: state.account.cash,
            buying_power: state.account.cash,
        })
    }

    async fn close_position(&self, symbol: &str) -> BrokerResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.account.positions.remove(symbol) {
            Some(p) => {
                state.account.cash += p.market_value();
                Ok(())
            }
            None => Err(BrokerError::Rejected {
                reason: format!("no position for {symbol}"),
            }),
        }
    }

    async fn order_status(&self, order_id: &str) -> BrokerResult<OrderStatusReport> {
        let state = self.state.lock().unwrap();
        state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| BrokerError::OrderNotFound {
                order_id: order_id.to_string(),
            })
    }
}

enum ScriptedConnection {
    Events(mpsc::Receiver<StreamEvent>),
    Fail(StreamError),
}

/// Market-data double: each `subscribe` pops the next scripted
/// connection. Tests hold the senders and drive events by hand.
#[derive(Default)]
pub struct ScriptedMarketData {
    connections: Mutex<Vec<ScriptedConnection>>,
}

impl ScriptedMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful connection; returns the sender half the test
    /// feeds events through.
    pub fn push_connection(&self) -> mpsc::Sender<StreamEvent> {
        let (tx, rx) = mpsc::channel(256);
        self.connections
            .lock()
            .unwrap()
            .insert(0, ScriptedConnection::Events(rx));
        tx
    }

    /// Queue a failed connection attempt.
    pub fn push_failure(&self, err: StreamError) {
        self.connections
            .lock()
            .unwrap()
            .insert(0, ScriptedConnection::Fail(err));
    }
}

#[async_trait]
impl MarketDataPort for ScriptedMarketData {
    async fn subscribe(
        &self,
        _symbols: &[String],
        _timeframe: &str,
    ) -> Result<mpsc::Receiver<StreamEvent>, StreamError> {
        let next = self.connections.lock().unwrap().pop();
        match next {
            Some(ScriptedConnection::Events(rx)) => Ok(rx),
            Some(ScriptedConnection::Fail(err)) => Err(err),
            None => Err(StreamError::Transient("no scripted connection".into())),
        }
    }
}
