use atro_core::{store::StoreBackend, supervisor::WorkerSnapshot};
use atro_model::CacheHealth;
use axum::{Json, extract::State};
use serde::Serialize;
use serde_json::{Value, json};

use crate::infra::app_state::AppState;

pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub store: StoreBackend,
    pub cache: CacheHealth,
    pub classifier: String,
    pub connected_clients: usize,
    pub workers: Vec<WorkerSnapshot>,
}

pub async fn status_handler(State(state): State<AppState>) -> Json<StatusReport> {
    Json(StatusReport {
        store: state.store.backend(),
        cache: state.cache.health(),
        classifier: state.analyzer.classifier_name().to_string(),
        connected_clients: state.websocket_manager.connection_count(),
        workers: state.supervisor.snapshot().await,
    })
}
