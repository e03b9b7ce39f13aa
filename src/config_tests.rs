//! Unit tests for configuration parsing.
//!
//! Environment access is process-global, so everything runs inside one
//! test function to avoid races between parallel tests.

#[cfg(test)]
mod config_tests {
    use std::env;
    use std::time::Duration;

    use crate::config::{AppConfig, EngineMode, ReconnectPolicy};
    use crate::services::risk::StopLossMethod;

    #[test]
    fn env_parsing_round_trip() {
        // Defaults with a clean environment.
        for key in [
            "ENGINE_MODE",
            "TRADING_SYMBOLS",
            "TIMEFRAME",
            "INITIAL_CAPITAL",
            "MAX_RISK_PER_TRADE",
            "STOP_LOSS_METHOD",
            "DECISION_TICK_SECS",
            "SUPPRESSION_TTL_SECS",
            "AUTO_EXECUTE",
        ] {
            env::remove_var(key);
        }
        let config = AppConfig::from_env();
        assert_eq!(config.mode, EngineMode::Paper);
        assert_eq!(config.symbols, vec!["SPY".to_string()]);
        assert_eq!(config.timeframe, "1Min");
        assert_eq!(config.capital, 100_000.0);
        assert_eq!(config.risk_per_trade, 0.02);
        assert_eq!(config.tick_period, Duration::from_secs(3));
        assert_eq!(config.suppression_ttl, Duration::from_secs(900));
        assert!(!config.auto_execute);
        assert!(matches!(
            config.stop_loss_method,
            StopLossMethod::Atr { mult } if (mult - 2.0).abs() < 1e-12
        ));

        // Overrides.
        env::set_var("ENGINE_MODE", "mock");
        env::set_var("TRADING_SYMBOLS", "BTC/USD, ETH/USD");
        env::set_var("INITIAL_CAPITAL", "25000");
        env::set_var("MAX_RISK_PER_TRADE", "0.01");
        env::set_var("STOP_LOSS_METHOD", "percent");
        env::set_var("STOP_LOSS_PERCENT", "0.03");
        env::set_var("DECISION_TICK_SECS", "1");
        env::set_var("SUPPRESSION_TTL_SECS", "60");
        env::set_var("AUTO_EXECUTE", "true");

        let config = AppConfig::from_env();
        assert_eq!(config.mode, EngineMode::Mock);
        assert_eq!(
            config.symbols,
            vec!["BTC/USD".to_string(), "ETH/USD".to_string()]
        );
        assert_eq!(config.capital, 25_000.0);
        assert_eq!(config.risk_per_trade, 0.01);
        assert!(matches!(
            config.stop_loss_method,
            StopLossMethod::Percent(p) if (p - 0.03).abs() < 1e-12
        ));
        assert_eq!(config.tick_period, Duration::from_secs(1));
        assert_eq!(config.suppression_ttl, Duration::from_secs(60));
        assert!(config.auto_execute);

        // Garbage numeric input falls back to defaults.
        env::set_var("INITIAL_CAPITAL", "not-a-number");
        let config = AppConfig::from_env();
        assert_eq!(config.capital, 100_000.0);

        for key in [
            "ENGINE_MODE",
            "TRADING_SYMBOLS",
            "INITIAL_CAPITAL",
            "MAX_RISK_PER_TRADE",
            "STOP_LOSS_METHOD",
            "STOP_LOSS_PERCENT",
            "DECISION_TICK_SECS",
            "SUPPRESSION_TTL_SECS",
            "AUTO_EXECUTE",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn reconnect_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(5));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(10));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(20));
        assert_eq!(policy.backoff_for(4), Duration::from_secs(40));
        // Capped at the maximum.
        assert_eq!(policy.backoff_for(5), Duration::from_secs(60));
        assert_eq!(policy.backoff_for(10), Duration::from_secs(60));
    }

    #[test]
    fn risk_config_mirrors_app_config() {
        let config = AppConfig::from_env();
        let risk = config.risk();
        assert_eq!(risk.capital, config.capital);
        assert_eq!(risk.risk_per_trade, config.risk_per_trade);
        assert_eq!(risk.max_position_fraction, config.max_position_fraction);
        assert_eq!(risk.max_concentration, config.max_concentration);
    }
}
