//! The two external ports: order routing and market data.
//!
//! Everything the engine knows about the outside world goes through
//! these traits, so tests and MOCK mode inject in-process doubles.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{BrokerError, StreamError};
use crate::events::StreamEvent;

use super::types::{
    AccountSnapshot, BrokerPosition, OrderAck, OrderStatusReport, PlaceOrderRequest,
};

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Outbound order placement and account state.
///
/// Used only by the execution worker. Brokers are expected to be
/// idempotent on order id within a short retry window; submit is never
/// retried here regardless.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    fn name(&self) -> &'static str;

    async fn place_order(&self, req: PlaceOrderRequest) -> BrokerResult<OrderAck>;

    async fn get_positions(&self) -> BrokerResult<Vec<BrokerPosition>>;

    async fn get_account(&self) -> BrokerResult<AccountSnapshot>;

    async fn close_position(&self, symbol: &str) -> BrokerResult<()>;

    async fn order_status(&self, order_id: &str) -> BrokerResult<OrderStatusReport>;
}

/// Inbound bar/trade stream for subscribed symbols.
///
/// One call represents one upstream connection: the receiver ends (or
/// yields `Disconnect`) when the connection drops, and the stream worker
/// decides whether to dial again. Events for each symbol arrive in
/// non-decreasing `open_time` order.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    async fn subscribe(
        &self,
        symbols: &[String],
        timeframe: &str,
    ) -> Result<mpsc::Receiver<StreamEvent>, StreamError>;
}
