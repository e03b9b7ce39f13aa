//! Port construction per engine mode.

use std::sync::Arc;

use crate::config::{AppConfig, EngineMode};
use crate::error::EngineError;

use super::alpaca::AlpacaBroker;
use super::mock::MockBroker;
use super::traits::{BrokerPort, MarketDataPort};
use super::ws::AlpacaMarketData;

/// Build the broker and market-data ports for the configured mode.
/// The mode only decides the broker; MOCK still takes the live data
/// stream when credentials exist, and otherwise leaves the market port
/// to the caller (the library API can inject any source).
pub fn build_ports(
    config: &AppConfig,
) -> Result<(Arc<dyn BrokerPort>, Option<Arc<dyn MarketDataPort>>), EngineError> {
    let market: Option<Arc<dyn MarketDataPort>> = match AlpacaMarketData::new(&config.alpaca) {
        Ok(market) => Some(Arc::new(market)),
        Err(e) if config.mode == EngineMode::Mock => {
            tracing::warn!("[FACTORY] no market data source: {e}");
            None
        }
        Err(e) => return Err(e.into()),
    };
    let broker: Arc<dyn BrokerPort> = match config.mode {
        EngineMode::Paper => Arc::new(AlpacaBroker::new(&config.alpaca, false)?),
        EngineMode::Live => Arc::new(AlpacaBroker::new(&config.alpaca, true)?),
        EngineMode::Mock => Arc::new(MockBroker::new(config.capital)),
    };
    Ok((broker, market))
}
