//! Position sizing, trade validation, and entry-risk scoring.
//!
//! Pure calculation: the manager holds only its configuration and works
//! on the account snapshot it is handed, so it can run inside the
//! analysis worker without touching the broker.

use serde::Serialize;

use crate::error::RiskReject;
use crate::exchange::types::{AccountSnapshot, BrokerPosition, Side};
use crate::meta::regime::RegimeReading;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StopLossMethod {
    /// `stop = entry * (1 - p)` for longs.
    Percent(f64),
    /// `stop = entry - mult * ATR14` for longs.
    Atr { mult: f64 },
    /// Absolute price offset.
    Fixed(f64),
}

#[derive(Clone, Copy, Debug)]
pub struct RiskConfig {
    /// Configured trading capital; the numerator of the per-trade risk
    /// budget.
    pub capital: f64,
    pub risk_per_trade: f64,
    pub max_position_fraction: f64,
    pub max_portfolio_risk: f64,
    pub reward_risk_ratio: f64,
    /// Fraction of the account that may be deployed in total.
    pub max_concentration: f64,
    pub stop_loss_method: StopLossMethod,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            capital: 100_000.0,
            risk_per_trade: 0.02,
            max_position_fraction: 0.10,
            max_portfolio_risk: 0.20,
            reward_risk_ratio: 2.0,
            max_concentration: 0.95,
            stop_loss_method: StopLossMethod::Atr { mult: 2.0 },
        }
    }
}

/// Bucketed entry risk with its position-size scaling factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score <= 25.0 {
            RiskLevel::Low
        } else if score <= 50.0 {
            RiskLevel::Medium
        } else if score <= 75.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    pub fn scaling_factor(&self) -> f64 {
        match self {
            RiskLevel::Low => 1.0,
            RiskLevel::Medium => 0.75,
            RiskLevel::High => 0.5,
            RiskLevel::Critical => 0.25,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

/// A sized, validated order proposal.
#[derive(Clone, Debug)]
pub struct OrderPlan {
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

/// Portfolio-level view for status reporting.
#[derive(Clone, Debug, Serialize)]
pub struct RiskSummary {
    pub account_value: f64,
    pub drawdown: f64,
    pub concentration: f64,
    pub cash_fraction: f64,
    pub within_limits: bool,
}

pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Stop price for an entry. ATR-less windows fall back to the
    /// percent method so an entry always carries a stop.
    pub fn derive_stop_loss(&self, entry: f64, atr: Option<f64>, side: Side) -> f64 {
        let offset = match self.config.stop_loss_method {
            StopLossMethod::Percent(p) => entry * p,
            StopLossMethod::Atr { mult } => match atr {
                Some(a) => mult * a,
                None => entry * 0.02,
            },
            StopLossMethod::Fixed(off) => off,
        };
        let stop = match side {
            Side::Buy => entry - offset,
            Side::Sell => entry + offset,
        };
        stop.max(0.0)
    }

    /// Take-profit at the configured reward/risk multiple of the stop
    /// distance.
    pub fn derive_take_profit(&self, entry: f64, stop: f64, side: Side) -> f64 {
        let risk = (entry - stop).abs();
        match side {
            Side::Buy => entry + self.config.reward_risk_ratio * risk,
            Side::Sell => (entry - self.config.reward_risk_ratio * risk).max(0.0),
        }
    }

    /// Entry-risk score in [0, 100]: weighted blend of normalized stop
    /// distance (0.4), ATR/price volatility (0.3), and the regime's
    /// volatile confidence (0.3).
    pub fn entry_risk_score(
        &self,
        entry: f64,
        stop: f64,
        atr: Option<f64>,
        reading: &RegimeReading,
    ) -> f64 {
        if entry <= 0.0 {
            return 100.0;
        }
        // A 5% stop distance or 3% per-bar range saturates its component.
        let stop_component = ((entry - stop).abs() / entry / 0.05).clamp(0.0, 1.0);
        let vol_component = atr
            .map(|a| (a / entry / 0.03).clamp(0.0, 1.0))
            .unwrap_or(0.5);
        let regime_component = reading.confidence_volatile.clamp(0.0, 1.0);

        let score = 100.0 * (0.4 * stop_component + 0.3 * vol_component + 0.3 * regime_component);
        score.clamp(0.0, 100.0)
    }

    /// Size a BUY and validate it against the account. The risk budget
    /// is computed on configured capital; the concentration and position
    /// caps are computed on the live account snapshot.
    pub fn size_and_validate(
        &self,
        symbol: &str,
        entry: f64,
        stop: f64,
        atr: Option<f64>,
        reading: &RegimeReading,
        account: &AccountSnapshot,
        open_positions: &[BrokerPosition],
    ) -> Result<OrderPlan, RiskReject> {
        let cfg = &self.config;
        let account_value = if account.portfolio_value > 0.0 {
            account.portfolio_value
        } else {
            cfg.capital
        };

        // Portfolio drawdown gate comes first: when breached, no new
        // exposure at all.
        let peak = cfg.capital.max(account_value);
        let drawdown = if peak > 0.0 {
            (peak - account_value) / peak
        } else {
            0.0
        };
        if drawdown > cfg.max_portfolio_risk {
            return Err(RiskReject::DrawdownExceeded {
                drawdown: drawdown * 100.0,
                limit: cfg.max_portfolio_risk * 100.0,
            });
        }

        let risk_per_share = (entry - stop).abs();
        if risk_per_share <= 0.0 || entry <= 0.0 {
            return Err(RiskReject::ZeroQuantity);
        }

        let mut qty = (cfg.capital * cfg.risk_per_trade / risk_per_share).floor();

        // Cap the position value against the account and buying power.
        let max_position_value = cfg.max_position_fraction * account_value;
        qty = qty.min((max_position_value / entry).floor());

        let affordable = (account.buying_power / entry).floor();
        if affordable < 1.0 {
            return Err(RiskReject::InsufficientBuyingPower {
                needed: entry,
                available: account.buying_power,
            });
        }
        qty = qty.min(affordable);

        let risk_score = self.entry_risk_score(entry, stop, atr, reading);
        let risk_level = RiskLevel::from_score(risk_score);
        qty = (qty * risk_level.scaling_factor()).floor();

        if qty < 1.0 {
            return Err(RiskReject::ZeroQuantity);
        }

        let notional = qty * entry;
        let deployed: f64 = open_positions.iter().map(BrokerPosition::market_value).sum();
        let concentration = (deployed + notional) / account_value;
        if concentration > cfg.max_concentration {
            return Err(RiskReject::ConcentrationExceeded {
                would_be: concentration * 100.0,
                limit: cfg.max_concentration * 100.0,
            });
        }

        Ok(OrderPlan {
            symbol: symbol.to_string(),
            side: Side::Buy,
            qty,
            entry_price: entry,
            stop_loss: stop,
            take_profit: self.derive_take_profit(entry, stop, Side::Buy),
            risk_score,
            risk_level,
        })
    }

    /// Portfolio-level risk summary for status reporting.
    pub fn portfolio_risk(
        &self,
        account: &AccountSnapshot,
        open_positions: &[BrokerPosition],
    ) -> RiskSummary {
        let account_value = if account.portfolio_value > 0.0 {
            account.portfolio_value
        } else {
            self.config.capital
        };
        let deployed: f64 = open_positions.iter().map(BrokerPosition::market_value).sum();
        let peak = self.config.capital.max(account_value);
        let drawdown = if peak > 0.0 {
            (peak - account_value) / peak
        } else {
            0.0
        };
        RiskSummary {
            account_value,
            drawdown,
            concentration: if account_value > 0.0 {
                deployed / account_value
            } else {
                0.0
            },
            cash_fraction: if account_value > 0.0 {
                account.cash / account_value
            } else {
                0.0
            },
            within_limits: drawdown <= self.config.max_portfolio_risk,
        }
    }
}
