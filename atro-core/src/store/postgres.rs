use async_trait::async_trait;
use atro_model::{
    Agent, AgentId, AgentPatch, Alert, AlertId, AlertPatch, Incident,
    IncidentId, IncidentPatch, Insight, InsightId, InsightPatch, LogEntry,
    LogId, LogPatch, Metadata, NewAgent, NewAlert, NewIncident, NewInsight,
    NewLogEntry, NewResponseAction, ResponseAction, ResponseActionId,
    ResponseActionPatch, patch::Patch,
};
use chrono::{DateTime, Utc};
use sqlx::{
    FromRow, PgPool, Postgres, QueryBuilder,
    error::ErrorKind,
    postgres::{PgPoolOptions, PgRow},
    types::Json,
};
use tracing::info;

use super::{EventStore, StoreBackend};
use crate::{CoreError, MIGRATOR, Result};

const AGENT_COLUMNS: &str =
    "id, name, category, status, last_active, metadata, created_at";
const ALERT_COLUMNS: &str = "id, severity, title, description, source, status, \
     incident_id, agent_id, metadata, created_at";
const INCIDENT_COLUMNS: &str =
    "id, incident_key, incident_type, status, source, metadata, created_at";
const LOG_COLUMNS: &str =
    "id, level, message, source, agent_id, metadata, created_at";
const RESPONSE_ACTION_COLUMNS: &str = "id, name, trigger, status, last_executed, \
     incident_id, metadata, created_at";
const INSIGHT_COLUMNS: &str =
    "id, analysis, severity, recommendation, incident_id, metadata, created_at";

#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, then apply pending migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_one_by_id<R>(
        &self,
        table: &str,
        columns: &str,
        id: i64,
    ) -> Result<Option<R>>
    where
        R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        sqlx::query_as::<_, R>(&format!(
            "SELECT {columns} FROM {table} WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)
    }

    async fn fetch_list<R>(
        &self,
        table: &str,
        columns: &str,
        limit: Option<usize>,
    ) -> Result<Vec<R>>
    where
        R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let rows = match limit {
            Some(limit) => {
                sqlx::query_as::<_, R>(&format!(
                    "SELECT {columns} FROM {table} \
                     ORDER BY created_at DESC, id DESC LIMIT $1"
                ))
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, R>(&format!(
                    "SELECT {columns} FROM {table} ORDER BY id ASC"
                ))
                .fetch_all(&self.pool)
                .await
            }
        };
        rows.map_err(map_db_error)
    }

    async fn run_update<R>(
        &self,
        mut builder: QueryBuilder<'_, Postgres>,
        id: i64,
        columns: &str,
    ) -> Result<Option<R>>
    where
        R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" RETURNING ");
        builder.push(columns);
        builder
            .build_query_as::<R>()
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)
    }
}

/// Translate constraint violations into the store's error vocabulary.
fn map_db_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.kind() {
            ErrorKind::UniqueViolation => {
                return CoreError::Conflict(db.message().to_string());
            }
            ErrorKind::ForeignKeyViolation => {
                return CoreError::InvalidReference(db.message().to_string());
            }
            _ => {}
        }
    }
    CoreError::Database(err)
}

fn convert<R, T>(row: Option<R>) -> Result<Option<T>>
where
    R: TryInto<T, Error = CoreError>,
{
    row.map(TryInto::try_into).transpose()
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    R: TryInto<T, Error = CoreError>,
{
    rows.into_iter().map(TryInto::try_into).collect()
}

#[derive(Debug, FromRow)]
struct AgentRow {
    id: i64,
    name: String,
    category: String,
    status: String,
    last_active: Option<DateTime<Utc>>,
    metadata: Json<Metadata>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AgentRow> for Agent {
    type Error = CoreError;

    fn try_from(row: AgentRow) -> Result<Self> {
        Ok(Agent {
            id: AgentId(row.id),
            name: row.name,
            category: row.category.parse()?,
            status: row.status.parse()?,
            last_active: row.last_active,
            metadata: row.metadata.0,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AlertRow {
    id: i64,
    severity: String,
    title: String,
    description: String,
    source: String,
    status: String,
    incident_id: Option<i64>,
    agent_id: Option<i64>,
    metadata: Json<Metadata>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = CoreError;

    fn try_from(row: AlertRow) -> Result<Self> {
        Ok(Alert {
            id: AlertId(row.id),
            severity: row.severity.parse()?,
            title: row.title,
            description: row.description,
            source: row.source,
            status: row.status.parse()?,
            incident_id: row.incident_id.map(IncidentId),
            agent_id: row.agent_id.map(AgentId),
            metadata: row.metadata.0,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct IncidentRow {
    id: i64,
    incident_key: String,
    incident_type: String,
    status: String,
    source: String,
    metadata: Json<Metadata>,
    created_at: DateTime<Utc>,
}

impl TryFrom<IncidentRow> for Incident {
    type Error = CoreError;

    fn try_from(row: IncidentRow) -> Result<Self> {
        Ok(Incident {
            id: IncidentId(row.id),
            incident_key: row.incident_key,
            incident_type: row.incident_type,
            status: row.status.parse()?,
            source: row.source,
            metadata: row.metadata.0,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LogRow {
    id: i64,
    level: String,
    message: String,
    source: String,
    agent_id: Option<i64>,
    metadata: Json<Metadata>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for LogEntry {
    type Error = CoreError;

    fn try_from(row: LogRow) -> Result<Self> {
        Ok(LogEntry {
            id: LogId(row.id),
            level: row.level.parse()?,
            message: row.message,
            source: row.source,
            agent_id: row.agent_id.map(AgentId),
            metadata: row.metadata.0,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ResponseActionRow {
    id: i64,
    name: String,
    trigger: String,
    status: String,
    last_executed: Option<DateTime<Utc>>,
    incident_id: Option<i64>,
    metadata: Json<Metadata>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ResponseActionRow> for ResponseAction {
    type Error = CoreError;

    fn try_from(row: ResponseActionRow) -> Result<Self> {
        Ok(ResponseAction {
            id: ResponseActionId(row.id),
            name: row.name,
            trigger: row.trigger,
            status: row.status.parse()?,
            last_executed: row.last_executed,
            incident_id: row.incident_id.map(IncidentId),
            metadata: row.metadata.0,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct InsightRow {
    id: i64,
    analysis: String,
    severity: String,
    recommendation: Option<String>,
    incident_id: Option<i64>,
    metadata: Json<Metadata>,
    created_at: DateTime<Utc>,
}

impl TryFrom<InsightRow> for Insight {
    type Error = CoreError;

    fn try_from(row: InsightRow) -> Result<Self> {
        Ok(Insight {
            id: InsightId(row.id),
            analysis: row.analysis,
            severity: row.severity.parse()?,
            recommendation: row.recommendation,
            incident_id: row.incident_id.map(IncidentId),
            metadata: row.metadata.0,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl EventStore for PostgresStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Postgres
    }

    async fn create_agent(&self, new: NewAgent) -> Result<Agent> {
        let row = sqlx::query_as::<_, AgentRow>(&format!(
            "INSERT INTO agents (name, category, status, last_active, metadata) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {AGENT_COLUMNS}"
        ))
        .bind(new.name)
        .bind(new.category.as_str())
        .bind(new.status.as_str())
        .bind(new.last_active)
        .bind(Json(new.metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        row.try_into()
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>> {
        convert(
            self.fetch_one_by_id::<AgentRow>("agents", AGENT_COLUMNS, id.0)
                .await?,
        )
    }

    async fn list_agents(&self, limit: Option<usize>) -> Result<Vec<Agent>> {
        convert_all(
            self.fetch_list::<AgentRow>("agents", AGENT_COLUMNS, limit)
                .await?,
        )
    }

    async fn update_agent(
        &self,
        id: AgentId,
        patch: AgentPatch,
    ) -> Result<Option<Agent>> {
        if patch.is_empty() {
            return self.get_agent(id).await;
        }

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE agents SET ");
        let mut set = builder.separated(", ");
        if let Some(name) = patch.name {
            set.push("name = ").push_bind_unseparated(name);
        }
        if let Some(category) = patch.category {
            set.push("category = ")
                .push_bind_unseparated(category.as_str());
        }
        if let Some(status) = patch.status {
            set.push("status = ").push_bind_unseparated(status.as_str());
        }
        if let Some(last_active) = patch.last_active {
            set.push("last_active = ").push_bind_unseparated(last_active);
        }
        if let Some(metadata) = patch.metadata {
            set.push("metadata = ").push_bind_unseparated(Json(metadata));
        }

        convert(
            self.run_update::<AgentRow>(builder, id.0, AGENT_COLUMNS)
                .await?,
        )
    }

    async fn create_alert(&self, new: NewAlert) -> Result<Alert> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "INSERT INTO alerts (severity, title, description, source, status, \
             incident_id, agent_id, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {ALERT_COLUMNS}"
        ))
        .bind(new.severity.as_str())
        .bind(new.title)
        .bind(new.description)
        .bind(new.source)
        .bind(new.status.as_str())
        .bind(new.incident_id.map(i64::from))
        .bind(new.agent_id.map(i64::from))
        .bind(Json(new.metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        row.try_into()
    }

    async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>> {
        convert(
            self.fetch_one_by_id::<AlertRow>("alerts", ALERT_COLUMNS, id.0)
                .await?,
        )
    }

    async fn list_alerts(&self, limit: Option<usize>) -> Result<Vec<Alert>> {
        convert_all(
            self.fetch_list::<AlertRow>("alerts", ALERT_COLUMNS, limit)
                .await?,
        )
    }

    async fn update_alert(
        &self,
        id: AlertId,
        patch: AlertPatch,
    ) -> Result<Option<Alert>> {
        if patch.is_empty() {
            return self.get_alert(id).await;
        }

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE alerts SET ");
        let mut set = builder.separated(", ");
        if let Some(severity) = patch.severity {
            set.push("severity = ")
                .push_bind_unseparated(severity.as_str());
        }
        if let Some(title) = patch.title {
            set.push("title = ").push_bind_unseparated(title);
        }
        if let Some(description) = patch.description {
            set.push("description = ").push_bind_unseparated(description);
        }
        if let Some(source) = patch.source {
            set.push("source = ").push_bind_unseparated(source);
        }
        if let Some(status) = patch.status {
            set.push("status = ").push_bind_unseparated(status.as_str());
        }
        if let Some(incident_id) = patch.incident_id {
            set.push("incident_id = ")
                .push_bind_unseparated(incident_id.map(i64::from));
        }
        if let Some(agent_id) = patch.agent_id {
            set.push("agent_id = ")
                .push_bind_unseparated(agent_id.map(i64::from));
        }
        if let Some(metadata) = patch.metadata {
            set.push("metadata = ").push_bind_unseparated(Json(metadata));
        }

        convert(
            self.run_update::<AlertRow>(builder, id.0, ALERT_COLUMNS)
                .await?,
        )
    }

    async fn create_incident(&self, new: NewIncident) -> Result<Incident> {
        let row = sqlx::query_as::<_, IncidentRow>(&format!(
            "INSERT INTO incidents (incident_key, incident_type, status, source, metadata) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {INCIDENT_COLUMNS}"
        ))
        .bind(new.incident_key)
        .bind(new.incident_type)
        .bind(new.status.as_str())
        .bind(new.source)
        .bind(Json(new.metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        row.try_into()
    }

    async fn get_incident(&self, id: IncidentId) -> Result<Option<Incident>> {
        convert(
            self.fetch_one_by_id::<IncidentRow>(
                "incidents",
                INCIDENT_COLUMNS,
                id.0,
            )
            .await?,
        )
    }

    async fn list_incidents(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<Incident>> {
        convert_all(
            self.fetch_list::<IncidentRow>("incidents", INCIDENT_COLUMNS, limit)
                .await?,
        )
    }

    async fn update_incident(
        &self,
        id: IncidentId,
        patch: IncidentPatch,
    ) -> Result<Option<Incident>> {
        if patch.is_empty() {
            return self.get_incident(id).await;
        }

        let mut builder =
            QueryBuilder::<Postgres>::new("UPDATE incidents SET ");
        let mut set = builder.separated(", ");
        if let Some(key) = patch.incident_key {
            set.push("incident_key = ").push_bind_unseparated(key);
        }
        if let Some(incident_type) = patch.incident_type {
            set.push("incident_type = ")
                .push_bind_unseparated(incident_type);
        }
        if let Some(status) = patch.status {
            set.push("status = ").push_bind_unseparated(status.as_str());
        }
        if let Some(source) = patch.source {
            set.push("source = ").push_bind_unseparated(source);
        }
        if let Some(metadata) = patch.metadata {
            set.push("metadata = ").push_bind_unseparated(Json(metadata));
        }

        convert(
            self.run_update::<IncidentRow>(builder, id.0, INCIDENT_COLUMNS)
                .await?,
        )
    }

    async fn create_log(&self, new: NewLogEntry) -> Result<LogEntry> {
        let row = sqlx::query_as::<_, LogRow>(&format!(
            "INSERT INTO logs (level, message, source, agent_id, metadata) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {LOG_COLUMNS}"
        ))
        .bind(new.level.as_str())
        .bind(new.message)
        .bind(new.source)
        .bind(new.agent_id.map(i64::from))
        .bind(Json(new.metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        row.try_into()
    }

    async fn get_log(&self, id: LogId) -> Result<Option<LogEntry>> {
        convert(
            self.fetch_one_by_id::<LogRow>("logs", LOG_COLUMNS, id.0)
                .await?,
        )
    }

    async fn list_logs(&self, limit: Option<usize>) -> Result<Vec<LogEntry>> {
        convert_all(
            self.fetch_list::<LogRow>("logs", LOG_COLUMNS, limit).await?,
        )
    }

    async fn update_log(
        &self,
        id: LogId,
        patch: LogPatch,
    ) -> Result<Option<LogEntry>> {
        if patch.is_empty() {
            return self.get_log(id).await;
        }

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE logs SET ");
        let mut set = builder.separated(", ");
        if let Some(level) = patch.level {
            set.push("level = ").push_bind_unseparated(level.as_str());
        }
        if let Some(message) = patch.message {
            set.push("message = ").push_bind_unseparated(message);
        }
        if let Some(source) = patch.source {
            set.push("source = ").push_bind_unseparated(source);
        }
        if let Some(agent_id) = patch.agent_id {
            set.push("agent_id = ")
                .push_bind_unseparated(agent_id.map(i64::from));
        }
        if let Some(metadata) = patch.metadata {
            set.push("metadata = ").push_bind_unseparated(Json(metadata));
        }

        convert(self.run_update::<LogRow>(builder, id.0, LOG_COLUMNS).await?)
    }

    async fn create_response_action(
        &self,
        new: NewResponseAction,
    ) -> Result<ResponseAction> {
        let row = sqlx::query_as::<_, ResponseActionRow>(&format!(
            "INSERT INTO response_actions (name, trigger, status, last_executed, \
             incident_id, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {RESPONSE_ACTION_COLUMNS}"
        ))
        .bind(new.name)
        .bind(new.trigger)
        .bind(new.status.as_str())
        .bind(new.last_executed)
        .bind(new.incident_id.map(i64::from))
        .bind(Json(new.metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        row.try_into()
    }

    async fn get_response_action(
        &self,
        id: ResponseActionId,
    ) -> Result<Option<ResponseAction>> {
        convert(
            self.fetch_one_by_id::<ResponseActionRow>(
                "response_actions",
                RESPONSE_ACTION_COLUMNS,
                id.0,
            )
            .await?,
        )
    }

    async fn list_response_actions(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ResponseAction>> {
        convert_all(
            self.fetch_list::<ResponseActionRow>(
                "response_actions",
                RESPONSE_ACTION_COLUMNS,
                limit,
            )
            .await?,
        )
    }

    async fn update_response_action(
        &self,
        id: ResponseActionId,
        patch: ResponseActionPatch,
    ) -> Result<Option<ResponseAction>> {
        if patch.is_empty() {
            return self.get_response_action(id).await;
        }

        let mut builder =
            QueryBuilder::<Postgres>::new("UPDATE response_actions SET ");
        let mut set = builder.separated(", ");
        if let Some(name) = patch.name {
            set.push("name = ").push_bind_unseparated(name);
        }
        if let Some(trigger) = patch.trigger {
            set.push("trigger = ").push_bind_unseparated(trigger);
        }
        if let Some(status) = patch.status {
            set.push("status = ").push_bind_unseparated(status.as_str());
        }
        if let Some(last_executed) = patch.last_executed {
            set.push("last_executed = ")
                .push_bind_unseparated(last_executed);
        }
        if let Some(incident_id) = patch.incident_id {
            set.push("incident_id = ")
                .push_bind_unseparated(incident_id.map(i64::from));
        }
        if let Some(metadata) = patch.metadata {
            set.push("metadata = ").push_bind_unseparated(Json(metadata));
        }

        convert(
            self.run_update::<ResponseActionRow>(
                builder,
                id.0,
                RESPONSE_ACTION_COLUMNS,
            )
            .await?,
        )
    }

    async fn find_response_action_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ResponseAction>> {
        let row = sqlx::query_as::<_, ResponseActionRow>(&format!(
            "SELECT {RESPONSE_ACTION_COLUMNS} FROM response_actions \
             WHERE name = $1 ORDER BY id ASC LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        convert(row)
    }

    async fn create_insight(&self, new: NewInsight) -> Result<Insight> {
        let row = sqlx::query_as::<_, InsightRow>(&format!(
            "INSERT INTO insights (analysis, severity, recommendation, incident_id, metadata) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {INSIGHT_COLUMNS}"
        ))
        .bind(new.analysis)
        .bind(new.severity.as_str())
        .bind(new.recommendation)
        .bind(new.incident_id.map(i64::from))
        .bind(Json(new.metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        row.try_into()
    }

    async fn get_insight(&self, id: InsightId) -> Result<Option<Insight>> {
        convert(
            self.fetch_one_by_id::<InsightRow>("insights", INSIGHT_COLUMNS, id.0)
                .await?,
        )
    }

    async fn list_insights(&self, limit: Option<usize>) -> Result<Vec<Insight>> {
        convert_all(
            self.fetch_list::<InsightRow>("insights", INSIGHT_COLUMNS, limit)
                .await?,
        )
    }

    async fn update_insight(
        &self,
        id: InsightId,
        patch: InsightPatch,
    ) -> Result<Option<Insight>> {
        if patch.is_empty() {
            return self.get_insight(id).await;
        }

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE insights SET ");
        let mut set = builder.separated(", ");
        if let Some(analysis) = patch.analysis {
            set.push("analysis = ").push_bind_unseparated(analysis);
        }
        if let Some(severity) = patch.severity {
            set.push("severity = ")
                .push_bind_unseparated(severity.as_str());
        }
        if let Some(recommendation) = patch.recommendation {
            set.push("recommendation = ")
                .push_bind_unseparated(recommendation);
        }
        if let Some(incident_id) = patch.incident_id {
            set.push("incident_id = ")
                .push_bind_unseparated(incident_id.map(i64::from));
        }
        if let Some(metadata) = patch.metadata {
            set.push("metadata = ").push_bind_unseparated(Json(metadata));
        }

        convert(
            self.run_update::<InsightRow>(builder, id.0, INSIGHT_COLUMNS)
                .await?,
        )
    }
}
