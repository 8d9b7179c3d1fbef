use async_trait::async_trait;
use atro_model::{
    Agent, AgentId, AgentPatch, Alert, AlertId, AlertPatch, Incident,
    IncidentId, IncidentPatch, Insight, InsightId, InsightPatch, LogEntry,
    LogId, LogPatch, NewAgent, NewAlert, NewIncident, NewInsight, NewLogEntry,
    NewResponseAction, ResponseAction, ResponseActionId, ResponseActionPatch,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{EventStore, StoreBackend, seed};
use crate::{CoreError, Result};

trait Record: Clone {
    fn raw_id(&self) -> i64;
    fn created_at(&self) -> DateTime<Utc>;
}

macro_rules! impl_record {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Record for $ty {
                fn raw_id(&self) -> i64 {
                    self.id.as_i64()
                }

                fn created_at(&self) -> DateTime<Utc> {
                    self.created_at
                }
            }
        )+
    };
}

impl_record!(Agent, Alert, Incident, LogEntry, ResponseAction, Insight);

/// Rows kept in insertion order; ids are handed out ascending so lookups can
/// binary search.
#[derive(Debug)]
struct Table<T> {
    rows: Vec<T>,
    next_id: i64,
}

impl<T: Record> Table<T> {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
        }
    }

    fn insert(&mut self, build: impl FnOnce(i64, DateTime<Utc>) -> T) -> T {
        let id = self.next_id;
        self.next_id += 1;
        let row = build(id, Utc::now());
        self.rows.push(row.clone());
        row
    }

    fn position(&self, id: i64) -> Option<usize> {
        self.rows.binary_search_by_key(&id, |row| row.raw_id()).ok()
    }

    fn get(&self, id: i64) -> Option<T> {
        self.position(id).map(|idx| self.rows[idx].clone())
    }

    fn get_mut(&mut self, id: i64) -> Option<&mut T> {
        self.position(id).map(|idx| &mut self.rows[idx])
    }

    fn contains(&self, id: i64) -> bool {
        self.position(id).is_some()
    }

    fn list(&self, limit: Option<usize>) -> Vec<T> {
        match limit {
            None => self.rows.clone(),
            Some(limit) => {
                let mut rows = self.rows.clone();
                rows.sort_by(|a, b| {
                    b.created_at()
                        .cmp(&a.created_at())
                        .then_with(|| b.raw_id().cmp(&a.raw_id()))
                });
                rows.truncate(limit);
                rows
            }
        }
    }
}

#[derive(Debug)]
struct Tables {
    agents: Table<Agent>,
    alerts: Table<Alert>,
    incidents: Table<Incident>,
    logs: Table<LogEntry>,
    response_actions: Table<ResponseAction>,
    insights: Table<Insight>,
}

impl Tables {
    fn new() -> Self {
        Self {
            agents: Table::new(),
            alerts: Table::new(),
            incidents: Table::new(),
            logs: Table::new(),
            response_actions: Table::new(),
            insights: Table::new(),
        }
    }
}

fn check_agent(agents: &Table<Agent>, id: Option<AgentId>) -> Result<()> {
    match id {
        Some(id) if !agents.contains(id.as_i64()) => Err(
            CoreError::InvalidReference(format!("agent {id} does not exist")),
        ),
        _ => Ok(()),
    }
}

fn check_incident(
    incidents: &Table<Incident>,
    id: Option<IncidentId>,
) -> Result<()> {
    match id {
        Some(id) if !incidents.contains(id.as_i64()) => {
            Err(CoreError::InvalidReference(format!(
                "incident {id} does not exist"
            )))
        }
        _ => Ok(()),
    }
}

fn check_incident_key(
    incidents: &Table<Incident>,
    key: &str,
    except: Option<IncidentId>,
) -> Result<()> {
    let taken = incidents
        .rows
        .iter()
        .any(|row| row.incident_key == key && Some(row.id) != except);
    if taken {
        return Err(CoreError::Conflict(format!(
            "incident key '{key}' already exists"
        )));
    }
    Ok(())
}

/// Process-local store used when no database is configured.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store; nothing seeded.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
        }
    }

    /// Store holding the same defaults a first-run database receives.
    pub fn seeded() -> Self {
        let store = Self::new();
        for agent in seed::default_agents() {
            store.insert_agent(agent);
        }
        for action in seed::default_response_actions() {
            Self::push_response_action(&mut store.tables.write(), action);
        }
        store
    }

    fn insert_agent(&self, new: NewAgent) -> Agent {
        self.tables.write().agents.insert(|id, created_at| Agent {
            id: AgentId(id),
            name: new.name,
            category: new.category,
            status: new.status,
            last_active: new.last_active,
            metadata: new.metadata,
            created_at,
        })
    }

    fn insert_response_action(
        &self,
        new: NewResponseAction,
    ) -> Result<ResponseAction> {
        let mut tables = self.tables.write();
        check_incident(&tables.incidents, new.incident_id)?;
        Ok(Self::push_response_action(&mut tables, new))
    }

    /// Insert without the incident check. Seed rows reference no incident.
    fn push_response_action(
        tables: &mut Tables,
        new: NewResponseAction,
    ) -> ResponseAction {
        tables.response_actions.insert(|id, created_at| ResponseAction {
            id: ResponseActionId(id),
            name: new.name,
            trigger: new.trigger,
            status: new.status,
            last_executed: new.last_executed,
            incident_id: new.incident_id,
            metadata: new.metadata,
            created_at,
        })
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Memory
    }

    async fn create_agent(&self, new: NewAgent) -> Result<Agent> {
        Ok(self.insert_agent(new))
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>> {
        Ok(self.tables.read().agents.get(id.as_i64()))
    }

    async fn list_agents(&self, limit: Option<usize>) -> Result<Vec<Agent>> {
        Ok(self.tables.read().agents.list(limit))
    }

    async fn update_agent(
        &self,
        id: AgentId,
        patch: AgentPatch,
    ) -> Result<Option<Agent>> {
        let mut tables = self.tables.write();
        Ok(tables.agents.get_mut(id.as_i64()).map(|row| {
            row.apply(patch);
            row.clone()
        }))
    }

    async fn create_alert(&self, new: NewAlert) -> Result<Alert> {
        let mut guard = self.tables.write();
        let tables = &mut *guard;
        check_agent(&tables.agents, new.agent_id)?;
        check_incident(&tables.incidents, new.incident_id)?;
        Ok(tables.alerts.insert(|id, created_at| Alert {
            id: AlertId(id),
            severity: new.severity,
            title: new.title,
            description: new.description,
            source: new.source,
            status: new.status,
            incident_id: new.incident_id,
            agent_id: new.agent_id,
            metadata: new.metadata,
            created_at,
        }))
    }

    async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>> {
        Ok(self.tables.read().alerts.get(id.as_i64()))
    }

    async fn list_alerts(&self, limit: Option<usize>) -> Result<Vec<Alert>> {
        Ok(self.tables.read().alerts.list(limit))
    }

    async fn update_alert(
        &self,
        id: AlertId,
        patch: AlertPatch,
    ) -> Result<Option<Alert>> {
        let mut guard = self.tables.write();
        let tables = &mut *guard;
        if !tables.alerts.contains(id.as_i64()) {
            return Ok(None);
        }
        check_agent(&tables.agents, patch.agent_id.flatten())?;
        check_incident(&tables.incidents, patch.incident_id.flatten())?;
        Ok(tables.alerts.get_mut(id.as_i64()).map(|row| {
            row.apply(patch);
            row.clone()
        }))
    }

    async fn create_incident(&self, new: NewIncident) -> Result<Incident> {
        let mut guard = self.tables.write();
        let tables = &mut *guard;
        check_incident_key(&tables.incidents, &new.incident_key, None)?;
        Ok(tables.incidents.insert(|id, created_at| Incident {
            id: IncidentId(id),
            incident_key: new.incident_key,
            incident_type: new.incident_type,
            status: new.status,
            source: new.source,
            metadata: new.metadata,
            created_at,
        }))
    }

    async fn get_incident(&self, id: IncidentId) -> Result<Option<Incident>> {
        Ok(self.tables.read().incidents.get(id.as_i64()))
    }

    async fn list_incidents(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<Incident>> {
        Ok(self.tables.read().incidents.list(limit))
    }

    async fn update_incident(
        &self,
        id: IncidentId,
        patch: IncidentPatch,
    ) -> Result<Option<Incident>> {
        let mut guard = self.tables.write();
        let tables = &mut *guard;
        if !tables.incidents.contains(id.as_i64()) {
            return Ok(None);
        }
        if let Some(key) = &patch.incident_key {
            check_incident_key(&tables.incidents, key, Some(id))?;
        }
        Ok(tables.incidents.get_mut(id.as_i64()).map(|row| {
            row.apply(patch);
            row.clone()
        }))
    }

    async fn create_log(&self, new: NewLogEntry) -> Result<LogEntry> {
        let mut guard = self.tables.write();
        let tables = &mut *guard;
        check_agent(&tables.agents, new.agent_id)?;
        Ok(tables.logs.insert(|id, created_at| LogEntry {
            id: LogId(id),
            level: new.level,
            message: new.message,
            source: new.source,
            agent_id: new.agent_id,
            metadata: new.metadata,
            created_at,
        }))
    }

    async fn get_log(&self, id: LogId) -> Result<Option<LogEntry>> {
        Ok(self.tables.read().logs.get(id.as_i64()))
    }

    async fn list_logs(&self, limit: Option<usize>) -> Result<Vec<LogEntry>> {
        Ok(self.tables.read().logs.list(limit))
    }

    async fn update_log(
        &self,
        id: LogId,
        patch: LogPatch,
    ) -> Result<Option<LogEntry>> {
        let mut guard = self.tables.write();
        let tables = &mut *guard;
        if !tables.logs.contains(id.as_i64()) {
            return Ok(None);
        }
        check_agent(&tables.agents, patch.agent_id.flatten())?;
        Ok(tables.logs.get_mut(id.as_i64()).map(|row| {
            row.apply(patch);
            row.clone()
        }))
    }

    async fn create_response_action(
        &self,
        new: NewResponseAction,
    ) -> Result<ResponseAction> {
        self.insert_response_action(new)
    }

    async fn get_response_action(
        &self,
        id: ResponseActionId,
    ) -> Result<Option<ResponseAction>> {
        Ok(self.tables.read().response_actions.get(id.as_i64()))
    }

    async fn list_response_actions(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ResponseAction>> {
        Ok(self.tables.read().response_actions.list(limit))
    }

    async fn update_response_action(
        &self,
        id: ResponseActionId,
        patch: ResponseActionPatch,
    ) -> Result<Option<ResponseAction>> {
        let mut guard = self.tables.write();
        let tables = &mut *guard;
        if !tables.response_actions.contains(id.as_i64()) {
            return Ok(None);
        }
        check_incident(&tables.incidents, patch.incident_id.flatten())?;
        Ok(tables.response_actions.get_mut(id.as_i64()).map(|row| {
            row.apply(patch);
            row.clone()
        }))
    }

    async fn find_response_action_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ResponseAction>> {
        Ok(self
            .tables
            .read()
            .response_actions
            .rows
            .iter()
            .find(|row| row.name == name)
            .cloned())
    }

    async fn create_insight(&self, new: NewInsight) -> Result<Insight> {
        let mut guard = self.tables.write();
        let tables = &mut *guard;
        check_incident(&tables.incidents, new.incident_id)?;
        Ok(tables.insights.insert(|id, created_at| Insight {
            id: InsightId(id),
            analysis: new.analysis,
            severity: new.severity,
            recommendation: new.recommendation,
            incident_id: new.incident_id,
            metadata: new.metadata,
            created_at,
        }))
    }

    async fn get_insight(&self, id: InsightId) -> Result<Option<Insight>> {
        Ok(self.tables.read().insights.get(id.as_i64()))
    }

    async fn list_insights(&self, limit: Option<usize>) -> Result<Vec<Insight>> {
        Ok(self.tables.read().insights.list(limit))
    }

    async fn update_insight(
        &self,
        id: InsightId,
        patch: InsightPatch,
    ) -> Result<Option<Insight>> {
        let mut guard = self.tables.write();
        let tables = &mut *guard;
        if !tables.insights.contains(id.as_i64()) {
            return Ok(None);
        }
        check_incident(&tables.incidents, patch.incident_id.flatten())?;
        Ok(tables.insights.get_mut(id.as_i64()).map(|row| {
            row.apply(patch);
            row.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atro_model::{AgentStatus, LogLevel, ResponseActionStatus, Severity};

    fn log(message: &str) -> NewLogEntry {
        NewLogEntry {
            level: LogLevel::Info,
            message: message.to_string(),
            source: "test".to_string(),
            agent_id: None,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn seeded_store_matches_first_run_defaults() {
        let store = MemoryStore::seeded();

        let agents = store.list_agents(None).await.unwrap();
        let names: Vec<_> = agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Network Monitor",
                "Log Parser",
                "Response Agent",
                "Threat Intelligence"
            ]
        );
        assert!(agents.iter().all(|a| a.status == AgentStatus::Inactive));

        let actions = store.list_response_actions(None).await.unwrap();
        assert_eq!(actions.len(), 4);
        assert!(actions.iter().all(|a| a.incident_id.is_none()));
        assert_eq!(
            store
                .find_response_action_by_name("Update Firewall Rules")
                .await
                .unwrap()
                .map(|a| a.id),
            Some(actions[3].id)
        );
        assert!(
            actions
                .iter()
                .all(|a| a.status == ResponseActionStatus::Enabled)
        );
    }

    #[tokio::test]
    async fn limited_lists_are_newest_first() {
        let store = MemoryStore::new();
        for n in 0..5 {
            store.create_log(log(&format!("line {n}"))).await.unwrap();
        }

        let newest = store.list_logs(Some(2)).await.unwrap();
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].message, "line 4");
        assert_eq!(newest[1].message, "line 3");

        let all = store.list_logs(None).await.unwrap();
        assert_eq!(all.first().unwrap().message, "line 0");
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn dangling_references_are_rejected() {
        let store = MemoryStore::new();
        let err = store
            .create_insight(NewInsight {
                analysis: "x".into(),
                severity: Severity::Low,
                recommendation: None,
                incident_id: Some(IncidentId(42)),
                metadata: Default::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidReference(_)));
        assert!(store.list_insights(None).await.unwrap().is_empty());
    }
}
