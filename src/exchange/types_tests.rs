//! Unit tests for wire types and the in-process broker double.

use crate::error::{BrokerError, StreamError};
use crate::exchange::mock::{MockBroker, ScriptedMarketData};
use crate::exchange::traits::{BrokerPort, MarketDataPort};
use crate::exchange::types::{
    OrderState, OrderType, PlaceOrderRequest, Side, TimeInForce,
};

fn limit_buy(symbol: &str, qty: f64, price: f64) -> PlaceOrderRequest {
    PlaceOrderRequest {
        symbol: symbol.to_string(),
        side: Side::Buy,
        order_type: OrderType::Limit,
        qty,
        limit_price: Some(price),
        time_in_force: TimeInForce::Day,
    }
}

fn limit_sell(symbol: &str, qty: f64, price: f64) -> PlaceOrderRequest {
    PlaceOrderRequest {
        side: Side::Sell,
        ..limit_buy(symbol, qty, price)
    }
}

#[test]
fn side_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"buy\"");
    assert_eq!(serde_json::to_string(&OrderType::Limit).unwrap(), "\"limit\"");
    assert_eq!(serde_json::to_string(&TimeInForce::Gtc).unwrap(), "\"gtc\"");
}

#[tokio::test]
async fn mock_broker_fills_and_updates_the_ledger() {
    let broker = MockBroker::new(10_000.0);

    let ack = broker.place_order(limit_buy("SPY", 20.0, 100.0)).await.unwrap();
    assert_eq!(ack.status, "filled");

    let report = broker.order_status(&ack.order_id).await.unwrap();
    assert_eq!(report.state, OrderState::Filled);
    assert_eq!(report.filled_qty, 20.0);
    assert_eq!(report.avg_fill_price, Some(100.0));

    let account = broker.get_account().await.unwrap();
    assert!((account.cash - 8_000.0).abs() < 1e-9);
    assert!((account.portfolio_value - 10_000.0).abs() < 1e-9);

    let positions = broker.get_positions().await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].qty, 20.0);

    // Sell above entry realizes a gain into cash.
    broker.place_order(limit_sell("SPY", 20.0, 110.0)).await.unwrap();
    let account = broker.get_account().await.unwrap();
    assert!((account.cash - 10_200.0).abs() < 1e-9);
    assert_eq!(broker.position_count(), 0);
}

#[tokio::test]
async fn mock_broker_rejects_overspend_and_oversell() {
    let broker = MockBroker::new(1_000.0);

    let err = broker.place_order(limit_buy("SPY", 20.0, 100.0)).await.unwrap_err();
    assert!(matches!(err, BrokerError::Rejected { .. }));

    let err = broker.place_order(limit_sell("SPY", 1.0, 100.0)).await.unwrap_err();
    assert!(matches!(err, BrokerError::Rejected { .. }));
}

#[tokio::test]
async fn mock_broker_scripted_reject_fires_once() {
    let broker = MockBroker::new(10_000.0);
    broker.reject_next("insufficient buying power");

    let err = broker.place_order(limit_buy("SPY", 1.0, 100.0)).await.unwrap_err();
    match err {
        BrokerError::Rejected { reason } => assert_eq!(reason, "insufficient buying power"),
        other => panic!("unexpected: {other}"),
    }
    // Next order goes through.
    assert!(broker.place_order(limit_buy("SPY", 1.0, 100.0)).await.is_ok());
}

#[tokio::test]
async fn mock_broker_close_position_liquidates() {
    let broker = MockBroker::new(10_000.0);
    broker.place_order(limit_buy("SPY", 10.0, 100.0)).await.unwrap();
    broker.close_position("SPY").await.unwrap();
    assert_eq!(broker.position_count(), 0);
    assert!(broker.close_position("SPY").await.is_err());
}

#[tokio::test]
async fn scripted_market_data_pops_connections_in_order() {
    let scripted = ScriptedMarketData::new();
    let _tx = scripted.push_connection();
    scripted.push_failure(StreamError::Transient("down".into()));

    assert!(scripted.subscribe(&["SPY".to_string()], "1Min").await.is_ok());
    assert!(matches!(
        scripted.subscribe(&["SPY".to_string()], "1Min").await,
        Err(StreamError::Transient(_))
    ));
    // Exhausted scripts refuse further dials.
    assert!(scripted.subscribe(&["SPY".to_string()], "1Min").await.is_err());
}
