//! Alpaca market-data websocket as a [`MarketDataPort`].
//!
//! One `subscribe` call is one upstream connection: a reader task parses
//! frames into typed stream events and forwards them until the socket
//! closes, at which point it emits `Disconnect` and ends the channel.
//! Reconnecting is the stream worker's job, not ours.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{error, info, warn};

use crate::config::AlpacaConfig;
use crate::data::{Bar, TradeTick};
use crate::error::StreamError;
use crate::events::StreamEvent;

use super::traits::MarketDataPort;

const CHANNEL_CAPACITY: usize = 256;

pub struct AlpacaMarketData {
    ws_url: String,
    api_key: String,
    secret_key: String,
}

impl AlpacaMarketData {
    pub fn new(config: &AlpacaConfig) -> Result<Self, StreamError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| StreamError::Transient("APCA_API_KEY_ID not set".into()))?;
        let secret_key = config
            .secret_key
            .clone()
            .ok_or_else(|| StreamError::Transient("APCA_API_SECRET_KEY not set".into()))?;
        Ok(Self {
            ws_url: config.data_ws_url.clone(),
            api_key,
            secret_key,
        })
    }

    fn parse_bar(item: &Value) -> Option<Bar> {
        let symbol = item.get("S")?.as_str()?.to_string();
        let open_time = item
            .get("t")?
            .as_str()?
            .parse::<DateTime<Utc>>()
            .ok()?;
        Some(Bar {
            symbol,
            open_time,
            open: item.get("o")?.as_f64()?,
            high: item.get("h")?.as_f64()?,
            low: item.get("l")?.as_f64()?,
            close: item.get("c")?.as_f64()?,
            volume: item.get("v").and_then(|v| v.as_f64()).unwrap_or(0.0),
        })
    }

    fn parse_trade(item: &Value) -> Option<TradeTick> {
        Some(TradeTick {
            symbol: item.get("S")?.as_str()?.to_string(),
            time: item.get("t")?.as_str()?.parse::<DateTime<Utc>>().ok()?,
            price: item.get("p")?.as_f64()?,
            size: item.get("s").and_then(|v| v.as_f64()).unwrap_or(0.0),
        })
    }

    /// Map one websocket frame into zero or more stream events.
    fn process_frame(text: &str, tx: &mpsc::Sender<StreamEvent>) {
        let val: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => {
                warn!("[STREAM] unparseable frame: {}", text);
                return;
            }
        };
        let Some(items) = val.as_array() else {
            return;
        };
        for item in items {
            match item.get("T").and_then(|v| v.as_str()) {
                // Completed minute bar.
                Some("b") => {
                    if let Some(bar) = Self::parse_bar(item) {
                        let _ = tx.try_send(StreamEvent::BarClose(bar));
                    }
                }
                // Correction/update of the current bar.
                Some("u") => {
                    if let Some(bar) = Self::parse_bar(item) {
                        let _ = tx.try_send(StreamEvent::BarUpdate(bar));
                    }
                }
                Some("t") => {
                    if let Some(tick) = Self::parse_trade(item) {
                        let _ = tx.try_send(StreamEvent::Trade(tick));
                    }
                }
                Some("success") => info!("[STREAM] {}", item.get("msg").unwrap_or(&serde_json::Value::Null)),
                Some("subscription") => info!("[STREAM] subscribed: {}", item),
                Some("error") => error!("[STREAM] upstream error: {}", item),
                _ => {}
            }
        }
    }
}

#[async_trait]
impl MarketDataPort for AlpacaMarketData {
    async fn subscribe(
        &self,
        symbols: &[String],
        _timeframe: &str,
    ) -> Result<mpsc::Receiver<StreamEvent>, StreamError> {
        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| StreamError::Transient(format!("connect failed: {e}")))?;
        info!("[STREAM] connected to {}", self.ws_url);
        let (mut write, mut read) = ws_stream.split();

        let auth = json!({"action": "auth", "key": self.api_key, "secret": self.secret_key});
        write
            .send(Message::Text(auth.to_string()))
            .await
            .map_err(|e| StreamError::Transient(format!("auth send failed: {e}")))?;

        // Alpaca answers auth/subscription errors in-band; a 406 means
        // the connection cap was hit.
        let sub = json!({"action": "subscribe", "bars": symbols, "updatedBars": symbols, "trades": symbols});
        write
            .send(Message::Text(sub.to_string()))
            .await
            .map_err(|e| StreamError::Transient(format!("subscribe send failed: {e}")))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if text.contains("\"code\":406") {
                            let _ = tx
                                .send(StreamEvent::Disconnect {
                                    reason: "connection limit exceeded".into(),
                                })
                                .await;
                            return;
                        }
                        Self::process_frame(&text, &tx);
                    }
                    Ok(Message::Ping(payload)) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            let _ = tx
                .send(StreamEvent::Disconnect {
                    reason: "socket closed".into(),
                })
                .await;
        });

        Ok(rx)
    }
}
