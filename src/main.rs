mod bus;
mod clock;
mod config;
mod data;
mod error;
mod events;
mod exchange;
mod meta;
mod services;
mod strategies;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use clock::SystemClock;
use config::{AppConfig, EngineMode};
use exchange::factory::build_ports;
use services::{EngineConfig, TradingEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AppConfig::from_env();
    info!("starting regimeflow: {:?} symbols in {:?} mode", config.symbols, config.mode);

    if config.mode == EngineMode::Live {
        info!("LIVE mode: orders will use real funds");
    }

    let (broker, market) = build_ports(&config)?;
    let market = match market {
        Some(m) => m,
        None => {
            error!("mock mode needs an embedded data source; run through the library API");
            return Err("no market data source for mock mode".into());
        }
    };

    let engine = TradingEngine::new(
        EngineConfig::from_app(&config),
        broker,
        market,
        Arc::new(SystemClock),
    );
    engine.start()?;

    // Log the outbound stream; a dashboard would subscribe the same way.
    let mut event_stream = engine.subscribe_events();
    let log_task = tokio::spawn(async move {
        while let Ok(event) = event_stream.recv().await {
            match event {
                events::EngineEvent::Recommendation(rec) => info!(
                    "[RECOMMENDATION] {} {} {:.4} @ {:.2} ({})",
                    rec.side.as_str(),
                    rec.symbol,
                    rec.suggested_qty,
                    rec.reference_price,
                    rec.rationale
                ),
                events::EngineEvent::Switch(sw) => info!(
                    "[SWITCH] {} -> {} ({})",
                    sw.from,
                    sw.to,
                    sw.reason.as_str()
                ),
                events::EngineEvent::Status(status) => {
                    info!("[STATUS] {:?}: {}", status.code, status.message)
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    if let Err(e) = engine.stop(Duration::from_secs(10)).await {
        error!("shutdown: {}", e);
    }
    log_task.abort();
    Ok(())
}
