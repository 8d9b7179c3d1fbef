use std::collections::BTreeMap;

use atro_core::cache::{ContextCache, namespaces};
use atro_model::{DashboardSnapshot, McpStatus};
use tracing::debug;

use crate::infra::{app_state::AppState, errors::AppResult};

pub const ALERT_PAGE_SIZE: usize = 10;
pub const INCIDENT_PAGE_SIZE: usize = 10;
pub const LOG_PAGE_SIZE: usize = 20;
pub const INSIGHT_PAGE_SIZE: usize = 10;

/// The `initial_data` payload sent once to every new client.
pub async fn initial_snapshot(state: &AppState) -> AppResult<DashboardSnapshot> {
    let store = state.store.as_ref();
    let (agents, alerts, incidents, logs, response_actions, insights) = tokio::try_join!(
        store.list_agents(None),
        store.list_alerts(Some(ALERT_PAGE_SIZE)),
        store.list_incidents(Some(INCIDENT_PAGE_SIZE)),
        store.list_logs(Some(LOG_PAGE_SIZE)),
        store.list_response_actions(None),
        store.list_insights(Some(INSIGHT_PAGE_SIZE)),
    )?;

    Ok(DashboardSnapshot {
        agents,
        alerts,
        incidents,
        logs,
        response_actions,
        insights,
        mcp_status: mcp_status(state.cache.as_ref()).await,
    })
}

/// Cache health plus whatever agent status strings are readable right now.
pub async fn mcp_status(cache: &dyn ContextCache) -> McpStatus {
    let health = cache.health();
    let mut agent_statuses = BTreeMap::new();

    match cache.list_keys(namespaces::AGENT_STATUS).await {
        Ok(keys) => {
            for key in keys {
                if let Ok(Some(status)) = cache.get(namespaces::AGENT_STATUS, &key).await {
                    agent_statuses.insert(key, status);
                }
            }
        }
        Err(err) => debug!(error = %err, "agent statuses unavailable"),
    }

    McpStatus {
        health,
        agent_statuses,
    }
}
