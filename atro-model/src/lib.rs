//! Core data model definitions shared across ATRO crates.
//!
//! Entities mirror the six persisted tables. Every entity has a
//! server-assigned id, a creation timestamp and an open metadata bag; the
//! `New*` payloads carry neither, so anything a client sends for those
//! fields is dropped during deserialization.

pub mod agent;
pub mod alert;
pub mod commands;
pub mod error;
pub mod events;
pub mod ids;
pub mod incident;
pub mod insight;
pub mod log;
pub mod patch;
pub mod response_action;
pub mod status;

pub use agent::{Agent, AgentPatch, NewAgent};
pub use alert::{Alert, AlertPatch, NewAlert};
pub use commands::{
    AgentSelection, AnalyzeLog, DashboardCommand, ToggleResponseAction,
};
pub use error::{ModelError, Result as ModelResult};
pub use events::{
    CacheBackendKind, CacheHealth, CacheState, DashboardEvent,
    DashboardSnapshot, McpStatus,
};
pub use ids::{AgentId, AlertId, IncidentId, InsightId, LogId, ResponseActionId};
pub use incident::{Incident, IncidentPatch, NewIncident};
pub use insight::{Insight, InsightPatch, NewInsight};
pub use log::{LogEntry, LogPatch, NewLogEntry};
pub use response_action::{
    NewResponseAction, ResponseAction, ResponseActionPatch,
};
pub use status::{
    AgentCategory, AgentStatus, AlertStatus, IncidentStatus, LogLevel,
    ResponseActionStatus, Severity,
};

/// Open-ended key/value bag attached to every entity.
pub type Metadata = serde_json::Map<String, serde_json::Value>;
