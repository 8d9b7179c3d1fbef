use atro_model::{AgentCategory, NewAgent, NewResponseAction};
use tracing::info;

use super::EventStore;
use crate::Result;

/// Agents present on first run, one per worker family.
pub fn default_agents() -> Vec<NewAgent> {
    vec![
        NewAgent::new("Network Monitor", AgentCategory::Network),
        NewAgent::new("Log Parser", AgentCategory::Log),
        NewAgent::new("Response Agent", AgentCategory::Response),
        NewAgent::new("Threat Intelligence", AgentCategory::Intelligence),
    ]
}

pub fn default_response_actions() -> Vec<NewResponseAction> {
    vec![
        NewResponseAction::new(
            "Block Malicious IP",
            "Network threat detected from an external address",
        ),
        NewResponseAction::new(
            "Isolate Compromised Endpoint",
            "Malware or lateral movement detected on a host",
        ),
        NewResponseAction::new(
            "Reset Compromised Credentials",
            "Repeated authentication failures or credential misuse",
        ),
        NewResponseAction::new(
            "Update Firewall Rules",
            "Port scan or suspicious inbound traffic pattern",
        ),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded { agents: usize, response_actions: usize },
    /// At least one agent already existed; nothing was written.
    Skipped,
}

/// Create the default agents and response actions unless any agent exists.
pub async fn seed_defaults(store: &dyn EventStore) -> Result<SeedOutcome> {
    if !store.list_agents(Some(1)).await?.is_empty() {
        return Ok(SeedOutcome::Skipped);
    }

    let agents = default_agents();
    let actions = default_response_actions();
    let outcome = SeedOutcome::Seeded {
        agents: agents.len(),
        response_actions: actions.len(),
    };

    for agent in agents {
        store.create_agent(agent).await?;
    }
    for action in actions {
        store.create_response_action(action).await?;
    }

    info!(backend = %store.backend(), "seeded default agents and response actions");
    Ok(outcome)
}
