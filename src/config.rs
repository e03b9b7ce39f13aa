//! Environment-driven configuration, read once at startup.

use std::env;
use std::time::Duration;

use crate::services::risk::{RiskConfig, StopLossMethod};

/// Which broker implementation backs the engine. Core logic is identical
/// across all three.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineMode {
    Paper,
    Live,
    Mock,
}

impl EngineMode {
    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "live" => EngineMode::Live,
            "mock" => EngineMode::Mock,
            _ => EngineMode::Paper,
        }
    }
}

/// Stream reconnect policy: exponential backoff with a cap, a bounded
/// attempt count, and a quiescent delay so the previous connection is
/// fully gone before dialing again.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
    pub quiescent_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
            max_attempts: 3,
            quiescent_delay: Duration::from_secs(3),
        }
    }
}

impl ReconnectPolicy {
    /// Backoff before reconnect attempt `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Clone, Debug)]
pub struct AlpacaConfig {
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub paper_base_url: String,
    pub live_base_url: String,
    pub data_ws_url: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub mode: EngineMode,
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub capital: f64,
    pub risk_per_trade: f64,
    pub max_position_fraction: f64,
    pub max_portfolio_risk: f64,
    pub reward_risk_ratio: f64,
    pub max_concentration: f64,
    pub stop_loss_method: StopLossMethod,
    pub min_bars: usize,
    pub buffer_capacity: usize,
    pub perf_window: usize,
    pub tick_period: Duration,
    pub suppression_ttl: Duration,
    pub reconnect: ReconnectPolicy,
    pub restart_cooldown: Duration,
    /// Submit risk-approved plans without waiting for an Accept command.
    pub auto_execute: bool,
    /// Close open positions best-effort during shutdown.
    pub close_on_shutdown: bool,
    pub bus_capacity: usize,
    pub alpaca: AlpacaConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mode = EngineMode::parse(&env::var("ENGINE_MODE").unwrap_or_else(|_| "paper".into()));

        let symbols_env = env::var("TRADING_SYMBOLS").unwrap_or_else(|_| "SPY".to_string());
        let symbols: Vec<String> = symbols_env
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let stop_loss_method = match env::var("STOP_LOSS_METHOD")
            .unwrap_or_else(|_| "atr".into())
            .to_lowercase()
            .as_str()
        {
            "percent" => StopLossMethod::Percent(env_parse("STOP_LOSS_PERCENT", 0.02)),
            "fixed" => StopLossMethod::Fixed(env_parse("STOP_LOSS_OFFSET", 1.0)),
            _ => StopLossMethod::Atr {
                mult: env_parse("STOP_LOSS_ATR_MULT", 2.0),
            },
        };

        let reconnect = ReconnectPolicy {
            initial_backoff: Duration::from_secs(env_parse("STREAM_BACKOFF_SECS", 5u64)),
            max_backoff: Duration::from_secs(env_parse("STREAM_BACKOFF_CAP_SECS", 60u64)),
            max_attempts: env_parse("STREAM_MAX_RECONNECTS", 3u32),
            quiescent_delay: Duration::from_secs(env_parse("STREAM_QUIESCENT_SECS", 3u64)),
        };

        Self {
            mode,
            symbols,
            timeframe: env::var("TIMEFRAME").unwrap_or_else(|_| "1Min".to_string()),
            capital: env_parse("INITIAL_CAPITAL", 100_000.0),
            risk_per_trade: env_parse("MAX_RISK_PER_TRADE", 0.02),
            max_position_fraction: env_parse("MAX_POSITION_FRACTION", 0.10),
            max_portfolio_risk: env_parse("MAX_PORTFOLIO_RISK", 0.20),
            reward_risk_ratio: env_parse("REWARD_RISK_RATIO", 2.0),
            max_concentration: env_parse("MAX_CONCENTRATION", 0.95),
            stop_loss_method,
            min_bars: env_parse("MIN_BARS", 20usize),
            buffer_capacity: env_parse("BAR_BUFFER_CAPACITY", 500usize),
            perf_window: env_parse("PERF_WINDOW", 50usize),
            tick_period: Duration::from_secs(env_parse("DECISION_TICK_SECS", 3u64)),
            suppression_ttl: Duration::from_secs(env_parse("SUPPRESSION_TTL_SECS", 900u64)),
            reconnect,
            restart_cooldown: Duration::from_secs(env_parse("RESTART_COOLDOWN_SECS", 300u64)),
            auto_execute: env_bool("AUTO_EXECUTE", false),
            close_on_shutdown: env_bool("CLOSE_ON_SHUTDOWN", false),
            bus_capacity: env_parse("EVENT_BUS_CAPACITY", 1024usize),
            alpaca: AlpacaConfig {
                api_key: env::var("APCA_API_KEY_ID").ok(),
                secret_key: env::var("APCA_API_SECRET_KEY").ok(),
                paper_base_url: env::var("APCA_PAPER_BASE_URL")
                    .unwrap_or_else(|_| "https://paper-api.alpaca.markets".to_string()),
                live_base_url: env::var("APCA_LIVE_BASE_URL")
                    .unwrap_or_else(|_| "https://api.alpaca.markets".to_string()),
                data_ws_url: env::var("APCA_DATA_WS_URL")
                    .unwrap_or_else(|_| "wss://stream.data.alpaca.markets/v2/iex".to_string()),
            },
        }
    }

    pub fn risk(&self) -> RiskConfig {
        RiskConfig {
            capital: self.capital,
            risk_per_trade: self.risk_per_trade,
            max_position_fraction: self.max_position_fraction,
            max_portfolio_risk: self.max_portfolio_risk,
            reward_risk_ratio: self.reward_risk_ratio,
            max_concentration: self.max_concentration,
            stop_loss_method: self.stop_loss_method,
        }
    }
}
