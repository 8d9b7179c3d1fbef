use std::sync::Arc;

use atro_core::EventReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{manager::ConnectionManager, messages};

/// The single writer between the core event bus and connected clients.
///
/// Events are serialized once and offered to every connection in bus
/// order, so each client observes the order the hub issued them in.
pub fn spawn_broadcaster(
    manager: Arc<ConnectionManager>,
    mut events: EventReceiver,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = events.recv().await {
            let kind = frame.event.kind();
            let text = match messages::event_frame(&frame.event) {
                Ok(text) => text,
                Err(err) => {
                    error!(sequence = frame.sequence, kind, error = %err, "failed to encode event");
                    continue;
                }
            };

            let report = manager.broadcast(frame.sequence, &text);
            debug!(
                sequence = frame.sequence,
                kind,
                delivered = report.delivered,
                skipped = report.skipped,
                pruned = report.pruned,
                "broadcast event"
            );
        }
        debug!("event bus closed; broadcaster stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::websocket::Connection;
    use atro_core::EventBus;
    use atro_model::DashboardEvent;
    use serde_json::Value;

    #[tokio::test]
    async fn clients_receive_events_in_bus_order() {
        let manager = Arc::new(ConnectionManager::new());
        let (first, mut first_rx) = Connection::channel();
        let (second, mut second_rx) = Connection::channel();
        manager.add_connection(Arc::new(first));
        manager.add_connection(Arc::new(second));

        let (bus, events) = EventBus::new();
        let task = spawn_broadcaster(Arc::clone(&manager), events);

        bus.publish(DashboardEvent::AgentsStatus(Vec::new()));
        bus.publish(DashboardEvent::NewAlert(serde_json::from_value(serde_json::json!({
            "id": 1,
            "severity": "critical",
            "title": "X",
            "description": "Y",
            "source": "Log Parser",
            "status": "new",
            "incidentId": null,
            "agentId": null,
            "metadata": {},
            "createdAt": "2025-01-02T03:04:05Z"
        })).unwrap()));
        drop(bus);
        task.await.unwrap();

        for rx in [&mut first_rx, &mut second_rx] {
            let kinds: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
                .map(|frame| {
                    let value: Value = serde_json::from_str(frame.as_str()).unwrap();
                    value["type"].as_str().unwrap().to_string()
                })
                .collect();
            assert_eq!(kinds, ["agents_status", "new_alert"]);
        }
    }
}
