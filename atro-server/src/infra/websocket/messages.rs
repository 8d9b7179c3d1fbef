use atro_model::DashboardEvent;
use axum::extract::ws::Utf8Bytes;

/// Serialize an event once so every client shares the same text frame.
pub fn event_frame(event: &DashboardEvent) -> Result<Utf8Bytes, serde_json::Error> {
    serde_json::to_string(event).map(Utf8Bytes::from)
}
