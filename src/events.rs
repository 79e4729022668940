use crate::http_server::WEBHOOK_COMPONENT;
use crate::monitor::ErrorMonitor;
use crate::types::PaymentEvent;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    PaymentCompleted,
    PaymentFailed,
    Ignored,
}

/// Classify one accepted event and log it. Failed payments also land in the error monitor.
pub fn handle_event(event: &PaymentEvent, monitor: &ErrorMonitor) -> EventOutcome {
    match event.event_type.as_str() {
        "checkout.session.completed" | "payment_intent.succeeded" => {
            tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                "payment completed"
            );
            EventOutcome::PaymentCompleted
        }
        "payment_intent.payment_failed" => {
            let reason = event
                .data
                .pointer("/object/last_payment_error/message")
                .and_then(Value::as_str)
                .unwrap_or("payment failed");
            let mut metadata = Map::new();
            metadata.insert("event_id".into(), Value::String(event.id.clone()));
            monitor.log_message(WEBHOOK_COMPONENT, "payment_failed", reason, Some(metadata));
            EventOutcome::PaymentFailed
        }
        other => {
            tracing::debug!(event_id = %event.id, event_type = other, "ignoring event");
            EventOutcome::Ignored
        }
    }
}

/// Drain the accepted-event queue until every sender is dropped.
pub async fn run_consumer(mut rx: mpsc::UnboundedReceiver<PaymentEvent>, monitor: ErrorMonitor) {
    while let Some(event) = rx.recv().await {
        handle_event(&event, &monitor);
    }
    tracing::info!("event consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, data: Value) -> PaymentEvent {
        PaymentEvent {
            id: "evt_123".into(),
            event_type: event_type.into(),
            created: Some(1_700_000_000),
            data,
        }
    }

    #[test]
    fn completed_payments_are_recognised() {
        let monitor = ErrorMonitor::new();
        assert_eq!(
            handle_event(&event("checkout.session.completed", Value::Null), &monitor),
            EventOutcome::PaymentCompleted
        );
        assert_eq!(
            handle_event(&event("payment_intent.succeeded", Value::Null), &monitor),
            EventOutcome::PaymentCompleted
        );
        assert!(monitor.is_empty());
    }

    #[test]
    fn failed_payment_is_recorded_with_reason() {
        let monitor = ErrorMonitor::new();
        let data = json!({ "object": { "last_payment_error": { "message": "card declined" } } });
        assert_eq!(
            handle_event(&event("payment_intent.payment_failed", data), &monitor),
            EventOutcome::PaymentFailed
        );
        let entries = monitor.by_component(WEBHOOK_COMPONENT);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "payment_failed");
        assert_eq!(entries[0].error, "card declined");
        assert_eq!(entries[0].metadata.as_ref().unwrap()["event_id"], "evt_123");
    }

    #[test]
    fn unknown_events_are_ignored() {
        let monitor = ErrorMonitor::new();
        assert_eq!(
            handle_event(&event("customer.created", Value::Null), &monitor),
            EventOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn consumer_drains_until_senders_drop() {
        let monitor = ErrorMonitor::new();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(event("payment_intent.payment_failed", Value::Null)).unwrap();
        tx.send(event("payment_intent.payment_failed", Value::Null)).unwrap();
        drop(tx);

        run_consumer(rx, monitor.clone()).await;
        assert_eq!(monitor.len(), 2);
        assert_eq!(monitor.recent(1)[0].error, "payment failed");
    }
}
