//! Wire-level types shared by the broker and market-data ports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Direction of an open position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
    Gtc,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: f64,
    pub limit_price: Option<f64>,
    pub time_in_force: TimeInForce,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub status: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub order_id: String,
    pub state: OrderState,
    pub filled_qty: f64,
    pub avg_fill_price: Option<f64>,
}

/// Broker-side view of an open position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub side: PositionSide,
    pub qty: f64,
    pub avg_entry_price: f64,
    pub opened_at: Option<DateTime<Utc>>,
}

impl BrokerPosition {
    pub fn market_value(&self) -> f64 {
        self.qty * self.avg_entry_price
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub portfolio_value: f64,
    pub cash: f64,
    pub buying_power: f64,
}
