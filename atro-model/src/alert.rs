use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Metadata,
    ids::{AgentId, AlertId, IncidentId},
    patch::{Patch, double_option},
    status::{AlertStatus, Severity},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: AlertId,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub source: String,
    pub status: AlertStatus,
    pub incident_id: Option<IncidentId>,
    pub agent_id: Option<AgentId>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub source: String,
    #[serde(default = "default_alert_status")]
    pub status: AlertStatus,
    #[serde(default)]
    pub incident_id: Option<IncidentId>,
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_alert_status() -> AlertStatus {
    AlertStatus::New
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AlertStatus>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub incident_id: Option<Option<IncidentId>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub agent_id: Option<Option<AgentId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Patch for AlertPatch {
    fn is_empty(&self) -> bool {
        self.severity.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.source.is_none()
            && self.status.is_none()
            && self.incident_id.is_none()
            && self.agent_id.is_none()
            && self.metadata.is_none()
    }
}

impl Alert {
    pub fn apply(&mut self, patch: AlertPatch) {
        if let Some(severity) = patch.severity {
            self.severity = severity;
        }
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(source) = patch.source {
            self.source = source;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(incident_id) = patch.incident_id {
            self.incident_id = incident_id;
        }
        if let Some(agent_id) = patch.agent_id {
            self.agent_id = agent_id;
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
    }
}
