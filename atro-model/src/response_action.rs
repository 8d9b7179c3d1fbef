use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Metadata,
    ids::{IncidentId, ResponseActionId},
    patch::{Patch, double_option},
    status::ResponseActionStatus,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseAction {
    pub id: ResponseActionId,
    pub name: String,
    /// Human description of what fires the action.
    pub trigger: String,
    pub status: ResponseActionStatus,
    pub last_executed: Option<DateTime<Utc>>,
    pub incident_id: Option<IncidentId>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResponseAction {
    pub name: String,
    pub trigger: String,
    #[serde(default = "default_action_status")]
    pub status: ResponseActionStatus,
    #[serde(default)]
    pub last_executed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub incident_id: Option<IncidentId>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewResponseAction {
    pub fn new(name: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trigger: trigger.into(),
            status: default_action_status(),
            last_executed: None,
            incident_id: None,
            metadata: Metadata::new(),
        }
    }
}

fn default_action_status() -> ResponseActionStatus {
    ResponseActionStatus::Enabled
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseActionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseActionStatus>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_executed: Option<Option<DateTime<Utc>>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub incident_id: Option<Option<IncidentId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl ResponseActionPatch {
    pub fn status(status: ResponseActionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn executed_at(at: DateTime<Utc>) -> Self {
        Self {
            last_executed: Some(Some(at)),
            ..Self::default()
        }
    }
}

impl Patch for ResponseActionPatch {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.trigger.is_none()
            && self.status.is_none()
            && self.last_executed.is_none()
            && self.incident_id.is_none()
            && self.metadata.is_none()
    }
}

impl ResponseAction {
    pub fn apply(&mut self, patch: ResponseActionPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(trigger) = patch.trigger {
            self.trigger = trigger;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(last_executed) = patch.last_executed {
            self.last_executed = last_executed;
        }
        if let Some(incident_id) = patch.incident_id {
            self.incident_id = incident_id;
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
    }
}
