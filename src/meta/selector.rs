//! The meta-policy that picks the active strategy.
//!
//! Scoring combines static regime suitability, the confidence of the
//! current reading, and a bias from the strategy's recent risk-adjusted
//! performance inside the same regime. Switching is damped by hysteresis
//! so that scores oscillating near the threshold cannot thrash the
//! active strategy.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::meta::performance::PerformanceMonitor;
use crate::meta::regime::{Regime, RegimeReading};
use crate::strategies::StrategySet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SwitchReason {
    /// The challenger's score cleared the incumbent's by the hysteresis
    /// margin.
    ScoreExceeded,
    /// The incumbent's health was DEGRADING or worse for two consecutive
    /// evaluations.
    PerformanceDegraded,
    /// The regime changed and the incumbent is unsuited to the new one.
    RegimeChange,
}

impl SwitchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchReason::ScoreExceeded => "score_exceeded",
            SwitchReason::PerformanceDegraded => "performance_degraded",
            SwitchReason::RegimeChange => "regime_change",
        }
    }
}

/// Emitted on every actual change of the active strategy.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchEvent {
    pub from: String,
    pub to: String,
    pub reason: SwitchReason,
    pub regime: Regime,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug)]
pub struct SelectorConfig {
    /// Weight of the performance bias in the score.
    pub lambda: f64,
    /// Minimum score advantage a challenger needs.
    pub hysteresis: f64,
    /// Suitability under which a regime change forces a re-pick.
    pub min_suitability: f64,
    /// Consecutive degrading evaluations before a performance switch.
    pub degrading_limit: u32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            lambda: 0.2,
            hysteresis: 0.1,
            min_suitability: 0.5,
            degrading_limit: 2,
        }
    }
}

/// Owns only the one-slot "current strategy" and the counters the switch
/// rules need; everything else is read from the inputs each call.
pub struct StrategySelector {
    config: SelectorConfig,
    current: Option<String>,
    last_regime: Option<Regime>,
    degrading_streak: u32,
    perf_window: usize,
}

impl StrategySelector {
    pub fn new(config: SelectorConfig, perf_window: usize) -> Self {
        Self {
            config,
            current: None,
            last_regime: None,
            degrading_streak: 0,
            perf_window: perf_window.max(1),
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Score one strategy under the reading.
    fn score(
        &self,
        name: &str,
        suitability: f64,
        reading: &RegimeReading,
        perf: &PerformanceMonitor,
    ) -> f64 {
        let bias = perf
            .strategy_regime_sharpe(name, reading.regime)
            .map(|sharpe| (sharpe / 2.0).clamp(-1.0, 1.0))
            .unwrap_or(0.0);
        suitability * reading.top_confidence() + self.config.lambda * bias
    }

    /// Pick the active strategy for this reading, returning a switch
    /// event when the active strategy actually changed. The very first
    /// call selects silently.
    pub fn select(
        &mut self,
        reading: &RegimeReading,
        strategies: &StrategySet,
        perf: &PerformanceMonitor,
        now: DateTime<Utc>,
    ) -> (String, Option<SwitchEvent>) {
        let regime = reading.regime;

        // Challenger: best score in registration order, so equal scores
        // resolve deterministically.
        let mut best_name: Option<&str> = None;
        let mut best_score = f64::MIN;
        for strategy in strategies.iter() {
            let s = self.score(strategy.name(), strategy.suitability(regime), reading, perf);
            if s > best_score {
                best_score = s;
                best_name = Some(strategy.name());
            }
        }
        let challenger = match best_name {
            Some(n) => n.to_string(),
            None => return (String::new(), None),
        };

        let incumbent = match self.current.clone() {
            Some(name) => name,
            None => {
                self.current = Some(challenger.clone());
                self.last_regime = Some(regime);
                return (challenger, None);
            }
        };

        // Track the incumbent's health streak.
        let health = perf.strategy_state(&incumbent, self.perf_window);
        if health.is_degrading_or_worse() {
            self.degrading_streak += 1;
        } else {
            self.degrading_streak = 0;
        }

        let regime_changed = self.last_regime.map_or(false, |r| r != regime);
        self.last_regime = Some(regime);

        if challenger == incumbent {
            return (incumbent, None);
        }

        let incumbent_suitability = strategies
            .get(&incumbent)
            .map(|s| s.suitability(regime))
            .unwrap_or(0.0);
        let incumbent_score = self.score(&incumbent, incumbent_suitability, reading, perf);

        let reason = if regime_changed && incumbent_suitability < self.config.min_suitability {
            Some(SwitchReason::RegimeChange)
        } else if self.degrading_streak >= self.config.degrading_limit {
            Some(SwitchReason::PerformanceDegraded)
        } else if best_score > incumbent_score + self.config.hysteresis {
            Some(SwitchReason::ScoreExceeded)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                let event = SwitchEvent {
                    from: incumbent,
                    to: challenger.clone(),
                    reason,
                    regime,
                    at: now,
                };
                self.current = Some(challenger.clone());
                self.degrading_streak = 0;
                (challenger, Some(event))
            }
            None => (incumbent, None),
        }
    }
}
