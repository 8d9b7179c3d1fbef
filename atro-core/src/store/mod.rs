//! Record persistence for the six dashboard tables.
//!
//! Both backends honour the same contract:
//! - `create_*` assigns a fresh id and creation timestamp, whatever the
//!   payload carried;
//! - `get_*` and `update_*` report a missing id as `Ok(None)`; `update_*`
//!   never inserts;
//! - `list_*` with a limit returns the newest rows first (creation time,
//!   then id); without a limit rows come back in insertion order;
//! - optional references to agents and incidents must point at existing
//!   rows ([`CoreError::InvalidReference`](crate::CoreError)) and incident
//!   keys are unique ([`CoreError::Conflict`](crate::CoreError)).

use std::fmt;

use async_trait::async_trait;
use atro_model::{
    Agent, AgentId, AgentPatch, Alert, AlertId, AlertPatch, Incident,
    IncidentId, IncidentPatch, Insight, InsightId, InsightPatch, LogEntry,
    LogId, LogPatch, NewAgent, NewAlert, NewIncident, NewInsight, NewLogEntry,
    NewResponseAction, ResponseAction, ResponseActionId, ResponseActionPatch,
};
use serde::Serialize;

use crate::Result;

pub mod memory;
pub mod postgres;
pub mod seed;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use seed::{SeedOutcome, seed_defaults};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Postgres => f.write_str("postgres"),
            StoreBackend::Memory => f.write_str("memory"),
        }
    }
}

#[async_trait]
pub trait EventStore: Send + Sync + fmt::Debug {
    fn backend(&self) -> StoreBackend;

    async fn create_agent(&self, new: NewAgent) -> Result<Agent>;
    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>>;
    async fn list_agents(&self, limit: Option<usize>) -> Result<Vec<Agent>>;
    async fn update_agent(
        &self,
        id: AgentId,
        patch: AgentPatch,
    ) -> Result<Option<Agent>>;

    async fn create_alert(&self, new: NewAlert) -> Result<Alert>;
    async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>>;
    async fn list_alerts(&self, limit: Option<usize>) -> Result<Vec<Alert>>;
    async fn update_alert(
        &self,
        id: AlertId,
        patch: AlertPatch,
    ) -> Result<Option<Alert>>;

    async fn create_incident(&self, new: NewIncident) -> Result<Incident>;
    async fn get_incident(&self, id: IncidentId) -> Result<Option<Incident>>;
    async fn list_incidents(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<Incident>>;
    async fn update_incident(
        &self,
        id: IncidentId,
        patch: IncidentPatch,
    ) -> Result<Option<Incident>>;

    async fn create_log(&self, new: NewLogEntry) -> Result<LogEntry>;
    async fn get_log(&self, id: LogId) -> Result<Option<LogEntry>>;
    async fn list_logs(&self, limit: Option<usize>) -> Result<Vec<LogEntry>>;
    async fn update_log(
        &self,
        id: LogId,
        patch: LogPatch,
    ) -> Result<Option<LogEntry>>;

    async fn create_response_action(
        &self,
        new: NewResponseAction,
    ) -> Result<ResponseAction>;
    async fn get_response_action(
        &self,
        id: ResponseActionId,
    ) -> Result<Option<ResponseAction>>;
    async fn list_response_actions(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ResponseAction>>;
    async fn update_response_action(
        &self,
        id: ResponseActionId,
        patch: ResponseActionPatch,
    ) -> Result<Option<ResponseAction>>;
    /// First action (lowest id) with exactly this name.
    async fn find_response_action_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ResponseAction>>;

    async fn create_insight(&self, new: NewInsight) -> Result<Insight>;
    async fn get_insight(&self, id: InsightId) -> Result<Option<Insight>>;
    async fn list_insights(&self, limit: Option<usize>) -> Result<Vec<Insight>>;
    async fn update_insight(
        &self,
        id: InsightId,
        patch: InsightPatch,
    ) -> Result<Option<Insight>>;
}
