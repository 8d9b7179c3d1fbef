//! Behaviour every `EventStore` backend must share.

use atro_core::{
    CoreError,
    store::{EventStore, MemoryStore, PostgresStore, SeedOutcome, seed_defaults},
};
use atro_model::{
    AgentCategory, AgentId, AgentPatch, AgentStatus, AlertId, AlertPatch,
    IncidentId, IncidentPatch, InsightId, InsightPatch, LogId, LogLevel,
    LogPatch, Metadata, NewAgent, NewAlert, NewIncident, NewInsight,
    NewLogEntry, NewResponseAction, ResponseActionId, ResponseActionPatch,
    ResponseActionStatus, Severity,
};
use serde_json::json;
use sqlx::PgPool;

fn alert(title: &str) -> NewAlert {
    serde_json::from_value(json!({
        "severity": "high",
        "title": title,
        "description": "suspicious traffic",
        "source": "Network Monitor"
    }))
    .unwrap()
}

fn incident(key: &str) -> NewIncident {
    serde_json::from_value(json!({
        "incidentKey": key,
        "incidentType": "Port Scan",
        "source": "Network Monitor"
    }))
    .unwrap()
}

async fn create_assigns_identity(store: &dyn EventStore) {
    let first = store.create_alert(alert("one")).await.unwrap();
    let second = store.create_alert(alert("two")).await.unwrap();
    assert_ne!(first.id, second.id);
    assert!(second.created_at >= first.created_at);

    // Identity fields in the payload are dropped on deserialization.
    let spoofed: NewLogEntry = serde_json::from_value(json!({
        "id": 42,
        "createdAt": "1999-01-01T00:00:00Z",
        "level": "info",
        "message": "hello",
        "source": "test"
    }))
    .unwrap();
    let log = store.create_log(spoofed).await.unwrap();
    assert_ne!(log.id, LogId(42));
    assert!(log.created_at.timestamp() > 946_684_800);
}

async fn update_missing_is_not_found(store: &dyn EventStore) {
    let missing = 987_654;
    assert!(
        store
            .update_agent(AgentId(missing), AgentPatch::status(AgentStatus::Active))
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .update_alert(AlertId(missing), AlertPatch::default())
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .update_incident(IncidentId(missing), IncidentPatch::default())
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .update_log(
                LogId(missing),
                LogPatch {
                    level: Some(LogLevel::Debug),
                    ..LogPatch::default()
                }
            )
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .update_response_action(
                ResponseActionId(missing),
                ResponseActionPatch::status(ResponseActionStatus::Disabled)
            )
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .update_insight(InsightId(missing), InsightPatch::default())
            .await
            .unwrap()
            .is_none()
    );
    assert!(store.get_response_action(ResponseActionId(missing)).await.unwrap().is_none());
    assert!(store.list_insights(None).await.unwrap().is_empty());
}

async fn references_and_keys_are_enforced(store: &dyn EventStore) {
    let dangling = NewAlert {
        incident_id: Some(IncidentId(55_555)),
        ..alert("dangling")
    };
    assert!(matches!(
        store.create_alert(dangling).await,
        Err(CoreError::InvalidReference(_))
    ));

    let created = store.create_incident(incident("INC-0000AAAA")).await.unwrap();
    assert!(matches!(
        store.create_incident(incident("INC-0000AAAA")).await,
        Err(CoreError::Conflict(_))
    ));

    let insight = store
        .create_insight(NewInsight {
            analysis: "scan".into(),
            severity: Severity::Low,
            recommendation: None,
            incident_id: Some(created.id),
            metadata: Metadata::new(),
        })
        .await
        .unwrap();
    let cleared = store
        .update_insight(
            insight.id,
            InsightPatch {
                incident_id: Some(None),
                ..InsightPatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cleared.incident_id, None);
    assert_eq!(cleared.analysis, "scan");
}

async fn limited_lists_are_newest_first(store: &dyn EventStore) {
    let agent = store
        .create_agent(NewAgent::new("Log Parser", AgentCategory::Log))
        .await
        .unwrap();
    let mut ids = Vec::new();
    for n in 0..5 {
        let log = store
            .create_log(NewLogEntry {
                level: LogLevel::Info,
                message: format!("line {n}"),
                source: agent.name.clone(),
                agent_id: Some(agent.id),
                metadata: Metadata::new(),
            })
            .await
            .unwrap();
        ids.push(log.id);
    }

    let newest: Vec<LogId> = store
        .list_logs(Some(2))
        .await
        .unwrap()
        .into_iter()
        .map(|log| log.id)
        .collect();
    assert_eq!(newest, vec![ids[4], ids[3]]);

    let all: Vec<LogId> = store
        .list_logs(None)
        .await
        .unwrap()
        .into_iter()
        .map(|log| log.id)
        .collect();
    assert_eq!(all, ids);
}

async fn seeding_runs_once(store: &dyn EventStore) {
    assert_eq!(
        seed_defaults(store).await.unwrap(),
        SeedOutcome::Seeded {
            agents: 4,
            response_actions: 4
        }
    );
    assert_eq!(seed_defaults(store).await.unwrap(), SeedOutcome::Skipped);
    assert_eq!(store.list_agents(None).await.unwrap().len(), 4);

    let action = store
        .find_response_action_by_name("Block Malicious IP")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(action.status, ResponseActionStatus::Enabled);
    let toggled = store
        .update_response_action(
            action.id,
            ResponseActionPatch::status(ResponseActionStatus::Disabled),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(toggled.status, ResponseActionStatus::Disabled);
    assert_eq!(toggled.name, action.name);

    let extra = store
        .create_response_action(NewResponseAction::new("Quarantine File", "Malware hash match"))
        .await
        .unwrap();
    assert_eq!(extra.status, ResponseActionStatus::Enabled);
}

mod memory {
    use super::*;

    #[tokio::test]
    async fn create_assigns_identity() {
        super::create_assigns_identity(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        super::update_missing_is_not_found(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn references_and_keys_are_enforced() {
        super::references_and_keys_are_enforced(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn limited_lists_are_newest_first() {
        super::limited_lists_are_newest_first(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn seeding_runs_once() {
        super::seeding_runs_once(&MemoryStore::new()).await;
    }
}

mod postgres {
    use super::*;

    #[sqlx::test(migrator = "atro_core::MIGRATOR")]
    #[ignore = "requires DATABASE_URL"]
    async fn create_assigns_identity(pool: PgPool) {
        super::create_assigns_identity(&PostgresStore::new(pool)).await;
    }

    #[sqlx::test(migrator = "atro_core::MIGRATOR")]
    #[ignore = "requires DATABASE_URL"]
    async fn update_missing_is_not_found(pool: PgPool) {
        super::update_missing_is_not_found(&PostgresStore::new(pool)).await;
    }

    #[sqlx::test(migrator = "atro_core::MIGRATOR")]
    #[ignore = "requires DATABASE_URL"]
    async fn references_and_keys_are_enforced(pool: PgPool) {
        super::references_and_keys_are_enforced(&PostgresStore::new(pool)).await;
    }

    #[sqlx::test(migrator = "atro_core::MIGRATOR")]
    #[ignore = "requires DATABASE_URL"]
    async fn limited_lists_are_newest_first(pool: PgPool) {
        super::limited_lists_are_newest_first(&PostgresStore::new(pool)).await;
    }

    #[sqlx::test(migrator = "atro_core::MIGRATOR")]
    #[ignore = "requires DATABASE_URL"]
    async fn seeding_runs_once(pool: PgPool) {
        super::seeding_runs_once(&PostgresStore::new(pool)).await;
    }
}
