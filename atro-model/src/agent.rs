use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Metadata,
    ids::AgentId,
    patch::{Patch, double_option},
    status::{AgentCategory, AgentStatus},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub category: AgentCategory,
    pub status: AgentStatus,
    pub last_active: Option<DateTime<Utc>>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    pub name: String,
    pub category: AgentCategory,
    #[serde(default = "default_agent_status")]
    pub status: AgentStatus,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewAgent {
    pub fn new(name: impl Into<String>, category: AgentCategory) -> Self {
        Self {
            name: name.into(),
            category,
            status: default_agent_status(),
            last_active: None,
            metadata: Metadata::new(),
        }
    }
}

fn default_agent_status() -> AgentStatus {
    AgentStatus::Inactive
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<AgentCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_active: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl AgentPatch {
    /// Patch recording a supervisor lifecycle transition.
    pub fn status(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Same as [`AgentPatch::status`] but also stamps `lastActive`.
    pub fn status_active_at(status: AgentStatus, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            last_active: Some(Some(at)),
            ..Self::default()
        }
    }
}

impl Patch for AgentPatch {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.status.is_none()
            && self.last_active.is_none()
            && self.metadata.is_none()
    }
}

impl Agent {
    pub fn apply(&mut self, patch: AgentPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(last_active) = patch.last_active {
            self.last_active = last_active;
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_agent_ignores_client_identity_fields() {
        let new: NewAgent = serde_json::from_value(json!({
            "id": 99,
            "createdAt": "2020-01-01T00:00:00Z",
            "name": "Network Monitor",
            "category": "network"
        }))
        .unwrap();

        assert_eq!(new.name, "Network Monitor");
        assert_eq!(new.status, AgentStatus::Inactive);
        assert!(new.metadata.is_empty());
    }

    #[test]
    fn patch_distinguishes_absent_and_null() {
        let absent: AgentPatch =
            serde_json::from_value(json!({ "status": "active" })).unwrap();
        assert_eq!(absent.last_active, None);

        let cleared: AgentPatch =
            serde_json::from_value(json!({ "lastActive": null })).unwrap();
        assert_eq!(cleared.last_active, Some(None));
        assert!(!cleared.is_empty());
        assert!(AgentPatch::default().is_empty());
    }
}
