//! Unit tests for the event and message types.

#[cfg(test)]
mod events_tests {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::events::{EngineState, Recommendation, StatusCode};
    use crate::meta::regime::Regime;
    use crate::services::risk::RiskLevel;
    use crate::strategies::SignalKind;

    #[test]
    fn signal_kind_labels() {
        assert_eq!(SignalKind::Buy.as_str(), "BUY");
        assert_eq!(SignalKind::Sell.as_str(), "SELL");
        assert_eq!(SignalKind::Hold.as_str(), "HOLD");
    }

    #[test]
    fn regime_labels() {
        assert_eq!(Regime::Trend.as_str(), "TREND");
        assert_eq!(Regime::Sideways.as_str(), "SIDEWAYS");
        assert_eq!(Regime::Volatile.as_str(), "VOLATILE");
        assert_eq!(format!("{}", Regime::Volatile), "VOLATILE");
    }

    #[test]
    fn status_codes_serialize_snake_case() {
        let json = serde_json::to_string(&StatusCode::SignalSuppressed).unwrap();
        assert_eq!(json, "\"signal_suppressed\"");
        let json = serde_json::to_string(&StatusCode::OrderRejected).unwrap();
        assert_eq!(json, "\"order_rejected\"");
    }

    #[test]
    fn engine_state_carries_the_stop_reason() {
        let state = EngineState::Stopped {
            reason: "connection limit exceeded".to_string(),
        };
        assert_ne!(state, EngineState::Running);
        match state {
            EngineState::Stopped { reason } => assert!(reason.contains("limit")),
            _ => unreachable!(),
        }
    }

    #[test]
    fn recommendation_is_cloneable_for_fanout() {
        let rec = Recommendation {
            signal_id: Uuid::new_v4(),
            symbol: "SPY".to_string(),
            side: SignalKind::Buy,
            reference_price: 125.0,
            strategy_name: "TrendFollowing".to_string(),
            regime: Regime::Trend,
            regime_confidence: 0.7,
            risk_score: 22.0,
            risk_level: RiskLevel::Low,
            suggested_qty: 40.0,
            stop_loss: 123.0,
            take_profit: 129.0,
            generated_at: Utc::now(),
            rationale: "trend entry".to_string(),
        };
        let copy = rec.clone();
        assert_eq!(copy.signal_id, rec.signal_id);
        assert_eq!(copy.side, SignalKind::Buy);
        assert_eq!(copy.risk_level, RiskLevel::Low);
    }
}
