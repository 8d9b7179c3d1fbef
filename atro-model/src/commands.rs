//! Client → hub command vocabulary.
//!
//! Commands arrive as `{"type": ..., "data": ...}` text frames. Parsing is
//! two-step: the envelope is read first so unknown command types can be
//! ignored without treating the frame as malformed.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    error::{ModelError, Result},
    ids::{AgentId, LogId, ResponseActionId},
    status::ResponseActionStatus,
};

/// Agents targeted by `start_agents` / `stop_agents`. Absent or empty
/// means every managed agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_ids: Option<Vec<AgentId>>,
}

impl AgentSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(ids: impl IntoIterator<Item = AgentId>) -> Self {
        Self {
            agent_ids: Some(ids.into_iter().collect()),
        }
    }

    /// `None` when the selection covers every agent.
    pub fn ids(&self) -> Option<&[AgentId]> {
        match &self.agent_ids {
            Some(ids) if !ids.is_empty() => Some(ids),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponseAction {
    pub id: ResponseActionId,
    pub status: ResponseActionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeLog {
    pub log_id: LogId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DashboardCommand {
    StartAgents(AgentSelection),
    StopAgents(AgentSelection),
    ToggleResponseAction(ToggleResponseAction),
    AnalyzeLog(AnalyzeLog),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl DashboardCommand {
    /// Parse one inbound frame.
    ///
    /// Returns `Ok(None)` for a well-formed envelope naming a command this
    /// hub does not know; those are ignored without a diagnostic.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|err| ModelError::MalformedMessage(err.to_string()))?;

        let command = match envelope.kind.as_str() {
            "start_agents" => {
                Self::StartAgents(payload(&envelope.kind, envelope.data)?)
            }
            "stop_agents" => {
                Self::StopAgents(payload(&envelope.kind, envelope.data)?)
            }
            "toggle_response_action" => Self::ToggleResponseAction(payload(
                &envelope.kind,
                envelope.data,
            )?),
            "analyze_log" => {
                Self::AnalyzeLog(payload(&envelope.kind, envelope.data)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartAgents(_) => "start_agents",
            Self::StopAgents(_) => "stop_agents",
            Self::ToggleResponseAction(_) => "toggle_response_action",
            Self::AnalyzeLog(_) => "analyze_log",
        }
    }
}

fn payload<T: DeserializeOwned>(command: &str, data: Value) -> Result<T> {
    // Selection commands may omit `data` entirely.
    let data = if data.is_null() {
        Value::Object(Default::default())
    } else {
        data
    };
    serde_json::from_value(data).map_err(|err| ModelError::MalformedPayload {
        command: command.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        let toggle = DashboardCommand::parse(
            r#"{"type":"toggle_response_action","data":{"id":7,"status":"disabled"}}"#,
        )
        .unwrap();
        assert_eq!(
            toggle,
            Some(DashboardCommand::ToggleResponseAction(
                ToggleResponseAction {
                    id: ResponseActionId(7),
                    status: ResponseActionStatus::Disabled,
                }
            ))
        );

        let analyze =
            DashboardCommand::parse(r#"{"type":"analyze_log","data":{"logId":3}}"#)
                .unwrap();
        assert_eq!(
            analyze,
            Some(DashboardCommand::AnalyzeLog(AnalyzeLog { log_id: LogId(3) }))
        );
    }

    #[test]
    fn selection_defaults_to_all_agents() {
        let start = DashboardCommand::parse(r#"{"type":"start_agents"}"#)
            .unwrap()
            .unwrap();
        let DashboardCommand::StartAgents(selection) = start else {
            panic!("expected start_agents, got {start:?}");
        };
        assert_eq!(selection.ids(), None);

        let stop = DashboardCommand::parse(
            r#"{"type":"stop_agents","data":{"agentIds":[1,2]}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            stop,
            DashboardCommand::StopAgents(AgentSelection::only([
                AgentId(1),
                AgentId(2)
            ]))
        );
    }

    #[test]
    fn unknown_commands_are_ignored() {
        let parsed =
            DashboardCommand::parse(r#"{"type":"reboot_universe","data":{}}"#)
                .unwrap();
        assert_eq!(parsed, None);
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(
            DashboardCommand::parse("not json"),
            Err(ModelError::MalformedMessage(_))
        ));
        assert!(matches!(
            DashboardCommand::parse(
                r#"{"type":"toggle_response_action","data":{"id":7,"status":"sideways"}}"#
            ),
            Err(ModelError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn serialized_form_matches_wire_envelope() {
        let value = serde_json::to_value(DashboardCommand::AnalyzeLog(
            AnalyzeLog { log_id: LogId(5) },
        ))
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "type": "analyze_log", "data": { "logId": 5 } })
        );
    }
}
