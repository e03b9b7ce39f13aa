//! Alpaca REST broker client.
//!
//! Backs both PAPER and LIVE modes; only the base URL differs. All
//! responses are decoded defensively since Alpaca returns most numeric
//! fields as strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::AlpacaConfig;
use crate::error::BrokerError;

use super::traits::{BrokerPort, BrokerResult};
use super::types::{
    AccountSnapshot, BrokerPosition, OrderAck, OrderState, OrderStatusReport, OrderType,
    PlaceOrderRequest, PositionSide, Side, TimeInForce,
};

#[derive(Clone)]
pub struct AlpacaBroker {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct AlpacaAccount {
    buying_power: String,
    cash: String,
    portfolio_value: String,
}

#[derive(serde::Serialize)]
struct AlpacaOrderBody {
    symbol: String,
    qty: String,
    side: &'static str,
    #[serde(rename = "type")]
    type_: &'static str,
    time_in_force: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<String>,
}

fn parse_f64(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

impl AlpacaBroker {
    pub fn new(config: &AlpacaConfig, live: bool) -> Result<Self, BrokerError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| BrokerError::Auth("APCA_API_KEY_ID not set".into()))?;
        let secret_key = config
            .secret_key
            .clone()
            .ok_or_else(|| BrokerError::Auth("APCA_API_SECRET_KEY not set".into()))?;
        let base_url = if live {
            config.live_base_url.clone()
        } else {
            config.paper_base_url.clone()
        };
        Ok(Self {
            client: Client::new(),
            base_url,
            api_key,
            secret_key,
        })
    }

    async fn get(&self, path: &str) -> BrokerResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(BrokerError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn order_from_raw(raw: &Value) -> OrderStatusReport {
        let state = match raw.get("status").and_then(|v| v.as_str()).unwrap_or("") {
            "filled" => OrderState::Filled,
            "partially_filled" => OrderState::PartiallyFilled,
            "canceled" | "expired" => OrderState::Canceled,
            "rejected" => OrderState::Rejected,
            _ => OrderState::New,
        };
        OrderStatusReport {
            order_id: raw
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            state,
            filled_qty: parse_f64(raw.get("filled_qty")),
            avg_fill_price: raw
                .get("filled_avg_price")
                .filter(|v| !v.is_null())
                .map(|v| parse_f64(Some(v))),
        }
    }
}

#[async_trait]
impl BrokerPort for AlpacaBroker {
    fn name(&self) -> &'static str {
        "alpaca"
    }

    async fn place_order(&self, req: PlaceOrderRequest) -> BrokerResult<OrderAck> {
        let body = AlpacaOrderBody {
            symbol: req.symbol.clone(),
            qty: req.qty.to_string(),
            side: match req.side {
                Side::Buy => "buy",
                Side::Sell => "sell",
            },
            type_: match req.order_type {
                OrderType::Market => "market",
                OrderType::Limit => "limit",
            },
            time_in_force: match req.time_in_force {
                TimeInForce::Day => "day",
                TimeInForce::Gtc => "gtc",
            },
            limit_price: req.limit_price.map(|p| p.to_string()),
        };

        let url = format!("{}/v2/orders", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if status.as_u16() == 403 || status.as_u16() == 422 {
            // Validation failures come back with a message field.
            let reason = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or(text);
            return Err(BrokerError::Rejected { reason });
        }
        if !status.is_success() {
            return Err(BrokerError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        let raw: Value = serde_json::from_str(&text)?;
        Ok(OrderAck {
            order_id: raw
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            status: raw
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
        })
    }

    async fn get_positions(&self) -> BrokerResult<Vec<BrokerPosition>> {
        let raw = self.get("/v2/positions").await?;
        let items = raw.as_array().cloned().unwrap_or_default();
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let side = match item.get("side").and_then(|v| v.as_str()) {
                Some("short") => PositionSide::Short,
                _ => PositionSide::Long,
            };
            out.push(BrokerPosition {
                symbol: item
                    .get("symbol")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                side,
                qty: parse_f64(item.get("qty")).abs(),
                avg_entry_price: parse_f64(item.get("avg_entry_price")),
                opened_at: item
                    .get("created_at")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
            });
        }
        Ok(out)
    }

    async fn get_account(&self) -> BrokerResult<AccountSnapshot> {
        let raw = self.get("/v2/account").await?;
        let account: AlpacaAccount = serde_json::from_value(raw)?;
        Ok(AccountSnapshot {
            portfolio_value: account.portfolio_value.parse().unwrap_or(0.0),
            cash: account.cash.parse().unwrap_or(0.0),
            buying_power: account.buying_power.parse().unwrap_or(0.0),
        })
    }

    async fn close_position(&self, symbol: &str) -> BrokerResult<()> {
        let url = format!("{}/v2/positions/{}", self.base_url, symbol);
        let resp = self
            .client
            .delete(&url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await?;
            return Err(BrokerError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn order_status(&self, order_id: &str) -> BrokerResult<OrderStatusReport> {
        let raw = self.get(&format!("/v2/orders/{}", order_id)).await?;
        Ok(Self::order_from_raw(&raw))
    }
}
