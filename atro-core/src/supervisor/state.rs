use std::fmt;

use atro_model::{AgentId, AgentStatus};
use serde::Serialize;

/// Supervisor-side lifecycle of one agent's worker process.
///
/// ```text
/// stopped ─▶ starting ─▶ running ─▶ stopped | crashed
///               └────────────────▶ crashed (launch failure)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Stopped,
    Starting,
    Running,
    Crashed,
}

impl WorkerState {
    pub fn is_running(self) -> bool {
        matches!(self, WorkerState::Running)
    }

    /// Status recorded on the agent row when this state is entered.
    pub fn agent_status(self) -> Option<AgentStatus> {
        match self {
            WorkerState::Stopped => Some(AgentStatus::Stopped),
            WorkerState::Running => Some(AgentStatus::Active),
            WorkerState::Crashed => Some(AgentStatus::Error),
            WorkerState::Starting => None,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Crashed => "crashed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSnapshot {
    pub agent_id: AgentId,
    pub state: WorkerState,
    pub pid: Option<u32>,
}
