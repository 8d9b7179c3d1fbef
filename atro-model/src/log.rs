use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Metadata,
    ids::{AgentId, LogId},
    patch::{Patch, double_option},
    status::LogLevel,
};

/// One row of the `logs` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: LogId,
    pub level: LogLevel,
    pub message: String,
    pub source: String,
    pub agent_id: Option<AgentId>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLogEntry {
    pub level: LogLevel,
    pub message: String,
    pub source: String,
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub agent_id: Option<Option<AgentId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Patch for LogPatch {
    fn is_empty(&self) -> bool {
        self.level.is_none()
            && self.message.is_none()
            && self.source.is_none()
            && self.agent_id.is_none()
            && self.metadata.is_none()
    }
}

impl LogEntry {
    pub fn apply(&mut self, patch: LogPatch) {
        if let Some(level) = patch.level {
            self.level = level;
        }
        if let Some(message) = patch.message {
            self.message = message;
        }
        if let Some(source) = patch.source {
            self.source = source;
        }
        if let Some(agent_id) = patch.agent_id {
            self.agent_id = agent_id;
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
    }
}
