use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Metadata,
    ids::IncidentId,
    patch::Patch,
    status::IncidentStatus,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: IncidentId,
    /// Human-readable key, unique across all incidents.
    pub incident_key: String,
    pub incident_type: String,
    pub status: IncidentStatus,
    pub source: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
    pub incident_key: String,
    pub incident_type: String,
    #[serde(default = "default_incident_status")]
    pub status: IncidentStatus,
    pub source: String,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_incident_status() -> IncidentStatus {
    IncidentStatus::Open
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Patch for IncidentPatch {
    fn is_empty(&self) -> bool {
        self.incident_key.is_none()
            && self.incident_type.is_none()
            && self.status.is_none()
            && self.source.is_none()
            && self.metadata.is_none()
    }
}

impl Incident {
    pub fn apply(&mut self, patch: IncidentPatch) {
        if let Some(key) = patch.incident_key {
            self.incident_key = key;
        }
        if let Some(incident_type) = patch.incident_type {
            self.incident_type = incident_type;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(source) = patch.source {
            self.source = source;
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
    }
}
