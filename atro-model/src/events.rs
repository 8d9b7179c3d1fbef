//! Hub → client broadcast vocabulary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    agent::Agent, alert::Alert, incident::Incident, insight::Insight,
    log::LogEntry, response_action::ResponseAction,
};

/// Which context-cache implementation is serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    Redis,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    /// Networked backend not established yet; operations report unavailable.
    Connecting,
    Ready,
    /// Networked backend gave up; the in-process cache serves for good.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHealth {
    pub backend: CacheBackendKind,
    pub state: CacheState,
}

impl CacheHealth {
    pub fn is_available(&self) -> bool {
        self.state != CacheState::Connecting
    }
}

/// Context-cache view included in the connect snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpStatus {
    pub health: CacheHealth,
    /// Agent id (as text) → last status string the supervisor cached.
    pub agent_statuses: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub agents: Vec<Agent>,
    pub alerts: Vec<Alert>,
    pub incidents: Vec<Incident>,
    pub logs: Vec<LogEntry>,
    pub response_actions: Vec<ResponseAction>,
    pub insights: Vec<Insight>,
    pub mcp_status: McpStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DashboardEvent {
    InitialData(Box<DashboardSnapshot>),
    AgentsStatus(Vec<Agent>),
    NewAlert(Alert),
    NewIncident(Incident),
    IncidentUpdated(Incident),
    NewLog(LogEntry),
    NewInsight(Insight),
    ResponseActionUpdated(ResponseAction),
    NewResponseAction(ResponseAction),
}

impl DashboardEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitialData(_) => "initial_data",
            Self::AgentsStatus(_) => "agents_status",
            Self::NewAlert(_) => "new_alert",
            Self::NewIncident(_) => "new_incident",
            Self::IncidentUpdated(_) => "incident_updated",
            Self::NewLog(_) => "new_log",
            Self::NewInsight(_) => "new_insight",
            Self::ResponseActionUpdated(_) => "response_action_updated",
            Self::NewResponseAction(_) => "new_response_action",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AlertId, AlertStatus, Metadata, Severity};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn events_use_type_and_data_envelope() {
        let alert = Alert {
            id: AlertId(1),
            severity: Severity::Critical,
            title: "X".into(),
            description: "Y".into(),
            source: "Log Parser".into(),
            status: AlertStatus::New,
            incident_id: None,
            agent_id: None,
            metadata: Metadata::new(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        };
        let event = DashboardEvent::NewAlert(alert);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], json!(event.kind()));
        assert_eq!(value["data"]["severity"], json!("critical"));
        assert_eq!(value["data"]["status"], json!("new"));
        assert_eq!(value["data"]["incidentId"], json!(null));
    }

    #[test]
    fn cache_health_serializes_lowercase() {
        let health = CacheHealth {
            backend: CacheBackendKind::Redis,
            state: CacheState::Connecting,
        };
        assert_eq!(
            serde_json::to_value(health).unwrap(),
            json!({ "backend": "redis", "state": "connecting" })
        );
        assert!(!health.is_available());
    }
}
