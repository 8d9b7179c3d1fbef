//! Line protocol spoken by worker programs on stdout.
//!
//! Each line is either a JSON object tagged by `type` or free text:
//!
//! ```text
//! {"type":"log","level":"warn","message":"...","metadata":{}}
//! {"type":"alert","severity":"critical","title":"X","description":"Y"}
//! {"type":"incident","incidentType":"Port Scan","metadata":{}}
//! ```

use atro_model::{LogLevel, Metadata, Severity};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerLine {
    Log {
        level: LogLevel,
        message: String,
        metadata: Metadata,
    },
    Alert {
        severity: Severity,
        title: String,
        description: String,
        metadata: Metadata,
    },
    Incident {
        incident_type: String,
        metadata: Metadata,
    },
    /// JSON object whose `type` is not part of the protocol.
    Unknown { kind: String },
    /// Anything else, kept verbatim.
    Text(String),
}

#[derive(Deserialize)]
struct LogLine {
    level: String,
    message: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct AlertLine {
    severity: Severity,
    title: String,
    description: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncidentLine {
    incident_type: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

pub fn parse_line(line: &str) -> WorkerLine {
    let text = || WorkerLine::Text(line.to_string());

    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(line) else {
        return text();
    };
    let Some(kind) = object.get("type").and_then(Value::as_str) else {
        return text();
    };
    let kind = kind.to_string();
    let value = Value::Object(object);

    match kind.as_str() {
        "log" => match serde_json::from_value::<LogLine>(value) {
            Ok(log) => WorkerLine::Log {
                level: LogLevel::normalize(&log.level),
                message: log.message,
                metadata: log.metadata.unwrap_or_default(),
            },
            Err(_) => text(),
        },
        "alert" => match serde_json::from_value::<AlertLine>(value) {
            Ok(alert) => WorkerLine::Alert {
                severity: alert.severity,
                title: alert.title,
                description: alert.description,
                metadata: alert.metadata.unwrap_or_default(),
            },
            Err(_) => text(),
        },
        "incident" => match serde_json::from_value::<IncidentLine>(value) {
            Ok(incident) => WorkerLine::Incident {
                incident_type: incident.incident_type,
                metadata: incident.metadata.unwrap_or_default(),
            },
            Err(_) => text(),
        },
        _ => WorkerLine::Unknown { kind },
    }
}

/// Fresh `INC-XXXXXXXX` key; uniqueness is enforced by the store.
pub fn new_incident_key() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("INC-{}", id[..8].to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_alert_lines() {
        let line = r#"{"type":"alert","severity":"critical","title":"X","description":"Y"}"#;
        assert_eq!(
            parse_line(line),
            WorkerLine::Alert {
                severity: Severity::Critical,
                title: "X".into(),
                description: "Y".into(),
                metadata: Metadata::new(),
            }
        );
    }

    #[test]
    fn normalizes_log_levels_and_keeps_metadata() {
        let line = r#"{"type":"log","level":"ERROR","message":"disk full","metadata":{"host":"db-1"}}"#;
        let WorkerLine::Log {
            level,
            message,
            metadata,
        } = parse_line(line)
        else {
            panic!("expected a log line");
        };
        assert_eq!(level, LogLevel::Critical);
        assert_eq!(message, "disk full");
        assert_eq!(metadata.get("host"), Some(&json!("db-1")));
    }

    #[test]
    fn parses_incident_lines() {
        let line = r#"{"type":"incident","incidentType":"Port Scan","metadata":{"ip":"10.0.0.5"}}"#;
        let WorkerLine::Incident { incident_type, .. } = parse_line(line) else {
            panic!("expected an incident line");
        };
        assert_eq!(incident_type, "Port Scan");
    }

    #[test]
    fn unknown_types_are_reported_not_stored() {
        assert_eq!(
            parse_line(r#"{"type":"heartbeat","at":1}"#),
            WorkerLine::Unknown {
                kind: "heartbeat".into()
            }
        );
    }

    #[test]
    fn everything_else_is_text() {
        for line in [
            "Connected to Redis MCP at redis://localhost:6379",
            "[1, 2, 3]",
            r#"{"level":"info","message":"no type"}"#,
            r#"{"type":"alert","severity":"extreme","title":"X","description":"Y"}"#,
            r#"{"type":"log","message":"missing level"}"#,
            r#"{"type":"incident","incidentType":"x","metadata":"not an object"}"#,
            "{not json",
        ] {
            assert_eq!(parse_line(line), WorkerLine::Text(line.to_string()), "{line}");
        }
    }

    #[test]
    fn incident_keys_have_fixed_shape() {
        let key = new_incident_key();
        assert_eq!(key.len(), 12);
        assert!(key.starts_with("INC-"));
        assert!(
            key[4..]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
        assert_ne!(key, new_incident_key());
    }
}
