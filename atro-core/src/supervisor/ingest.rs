use std::sync::Arc;

use atro_model::{
    AgentId, AlertStatus, DashboardEvent, Incident, IncidentStatus, LogLevel,
    Metadata, NewAlert, NewIncident, NewLogEntry,
};
use tracing::warn;

use super::protocol::{WorkerLine, new_incident_key, parse_line};
use crate::{CoreError, EventBus, Result, store::EventStore};

const INCIDENT_KEY_ATTEMPTS: usize = 3;

/// Turns one worker's stdout lines into store writes and broadcasts.
#[derive(Debug, Clone)]
pub(crate) struct Ingestor {
    pub agent_id: AgentId,
    pub agent_name: String,
    pub store: Arc<dyn EventStore>,
    pub bus: EventBus,
}

impl Ingestor {
    pub async fn ingest(&self, line: &str) {
        let parsed = parse_line(line);
        if let Err(err) = self.apply(parsed).await {
            warn!(
                agent_id = %self.agent_id,
                error = %err,
                "failed to record worker output"
            );
        }
    }

    async fn apply(&self, line: WorkerLine) -> Result<()> {
        match line {
            WorkerLine::Log {
                level,
                message,
                metadata,
            } => self.record_log(level, message, metadata).await,
            WorkerLine::Text(text) => {
                self.record_log(LogLevel::Info, text, Metadata::new()).await
            }
            WorkerLine::Alert {
                severity,
                title,
                description,
                metadata,
            } => {
                let alert = self
                    .store
                    .create_alert(NewAlert {
                        severity,
                        title,
                        description,
                        source: self.agent_name.clone(),
                        status: AlertStatus::New,
                        incident_id: None,
                        agent_id: Some(self.agent_id),
                        metadata,
                    })
                    .await?;
                self.bus.publish(DashboardEvent::NewAlert(alert));
                Ok(())
            }
            WorkerLine::Incident {
                incident_type,
                metadata,
            } => {
                let incident = self.create_incident(incident_type, metadata).await?;
                self.bus.publish(DashboardEvent::NewIncident(incident));
                Ok(())
            }
            WorkerLine::Unknown { kind } => {
                warn!(
                    agent_id = %self.agent_id,
                    kind = %kind,
                    "ignoring worker message with unknown type"
                );
                Ok(())
            }
        }
    }

    async fn record_log(
        &self,
        level: LogLevel,
        message: String,
        metadata: Metadata,
    ) -> Result<()> {
        let log = self
            .store
            .create_log(NewLogEntry {
                level,
                message,
                source: self.agent_name.clone(),
                agent_id: Some(self.agent_id),
                metadata,
            })
            .await?;
        self.bus.publish(DashboardEvent::NewLog(log));
        Ok(())
    }

    async fn create_incident(
        &self,
        incident_type: String,
        metadata: Metadata,
    ) -> Result<Incident> {
        let mut last_conflict = None;
        for _ in 0..INCIDENT_KEY_ATTEMPTS {
            let new = NewIncident {
                incident_key: new_incident_key(),
                incident_type: incident_type.clone(),
                status: IncidentStatus::Open,
                source: self.agent_name.clone(),
                metadata: metadata.clone(),
            };
            match self.store.create_incident(new).await {
                Err(CoreError::Conflict(reason)) => {
                    last_conflict = Some(reason);
                }
                other => return other,
            }
        }
        Err(CoreError::Conflict(last_conflict.unwrap_or_else(|| {
            "incident key collision".to_string()
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use atro_model::{AgentCategory, NewAgent, Severity};

    async fn ingestor() -> (Ingestor, crate::EventReceiver) {
        let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
        let agent = store
            .create_agent(NewAgent::new("Log Parser", AgentCategory::Log))
            .await
            .unwrap();
        let (bus, rx) = EventBus::new();
        (
            Ingestor {
                agent_id: agent.id,
                agent_name: agent.name,
                store,
                bus,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn alert_line_creates_new_alert_and_broadcasts() {
        let (ingestor, mut rx) = ingestor().await;
        ingestor
            .ingest(r#"{"type":"alert","severity":"critical","title":"X","description":"Y"}"#)
            .await;

        let alerts = ingestor.store.list_alerts(None).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].status, AlertStatus::New);
        assert_eq!(alerts[0].source, "Log Parser");
        assert_eq!(alerts[0].agent_id, Some(ingestor.agent_id));

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.event.kind(), "new_alert");
    }

    #[tokio::test]
    async fn text_becomes_info_log_and_unknown_is_dropped() {
        let (ingestor, mut rx) = ingestor().await;
        ingestor.ingest("worker booting").await;
        ingestor.ingest(r#"{"type":"heartbeat"}"#).await;

        let logs = ingestor.store.list_logs(None).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LogLevel::Info);
        assert_eq!(logs[0].message, "worker booting");
        assert_eq!(rx.try_recv().unwrap().event.kind(), "new_log");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn incident_line_gets_open_status_and_key() {
        let (ingestor, mut rx) = ingestor().await;
        ingestor
            .ingest(r#"{"type":"incident","incidentType":"Port Scan"}"#)
            .await;

        let incidents = ingestor.store.list_incidents(None).await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].status, IncidentStatus::Open);
        assert!(incidents[0].incident_key.starts_with("INC-"));
        assert_eq!(rx.try_recv().unwrap().event.kind(), "new_incident");
    }
}
