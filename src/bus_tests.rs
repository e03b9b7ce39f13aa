//! Unit tests for the outbound event bus.

#[cfg(test)]
mod bus_tests {
    use chrono::Utc;

    use crate::bus::EventBus;
    use crate::events::{EngineEvent, StatusCode, StatusEvent};

    fn status(message: &str) -> EngineEvent {
        EngineEvent::Status(StatusEvent {
            code: StatusCode::Scanning,
            symbol: Some("SPY".to_string()),
            message: message.to_string(),
            at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn publish_reaches_a_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(status("hello"));

        match rx.recv().await.unwrap() {
            EngineEvent::Status(event) => {
                assert_eq!(event.code, StatusCode::Scanning);
                assert_eq!(event.message, "hello");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn all_subscribers_receive() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(status("fanout"));

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(16);
        // Must not panic or error.
        bus.publish(status("into the void"));
    }

    #[tokio::test]
    async fn lagging_subscriber_drops_oldest() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(status(&format!("event {i}")));
        }
        // The first recv reports the lag, later ones deliver the tail.
        let first = rx.recv().await;
        assert!(first.is_err());
        assert!(rx.recv().await.is_ok());
    }
}
