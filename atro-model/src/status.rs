//! Closed vocabularies for every status-like column.
//!
//! Each enum serializes to the lowercase text stored in the database and
//! rejects anything else, so only enumerated values can reach storage.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ModelError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(ModelError::InvalidValue {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum!(
    /// Which worker program family an agent belongs to.
    AgentCategory("agent category") {
        Network => "network",
        Log => "log",
        Response => "response",
        Intelligence => "intelligence",
    }
);

text_enum!(
    /// Lifecycle status as shown on the dashboard.
    AgentStatus("agent status") {
        Inactive => "inactive",
        Active => "active",
        Warning => "warning",
        Error => "error",
        Stopped => "stopped",
    }
);

text_enum!(
    Severity("severity") {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
);

text_enum!(
    AlertStatus("alert status") {
        New => "new",
        InProgress => "in_progress",
        Resolved => "resolved",
    }
);

text_enum!(
    IncidentStatus("incident status") {
        Open => "open",
        InProgress => "in_progress",
        Contained => "contained",
        Closed => "closed",
    }
);

text_enum!(
    LogLevel("log level") {
        Critical => "critical",
        Warning => "warning",
        Info => "info",
        Debug => "debug",
    }
);

text_enum!(
    ResponseActionStatus("response action status") {
        Enabled => "enabled",
        Disabled => "disabled",
        Pending => "pending",
    }
);

impl LogLevel {
    /// Map the free-form level names emitted by worker programs onto the
    /// stored vocabulary. Unknown names land on `info`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" | "error" | "fatal" => LogLevel::Critical,
            "warning" | "warn" => LogLevel::Warning,
            "debug" | "trace" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_text() {
        for status in AlertStatus::ALL {
            let parsed: AlertStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, *status);
        }
        assert_eq!(AlertStatus::InProgress.as_str(), "in_progress");
    }

    #[test]
    fn rejects_values_outside_the_vocabulary() {
        let err = "archived".parse::<IncidentStatus>().unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidValue {
                kind: "incident status",
                value: "archived".to_string(),
            }
        );
        assert!(serde_json::from_str::<Severity>("\"extreme\"").is_err());
    }

    #[test]
    fn normalizes_worker_log_levels() {
        assert_eq!(LogLevel::normalize("ERROR"), LogLevel::Critical);
        assert_eq!(LogLevel::normalize("fatal"), LogLevel::Critical);
        assert_eq!(LogLevel::normalize("WARN"), LogLevel::Warning);
        assert_eq!(LogLevel::normalize("success"), LogLevel::Info);
        assert_eq!(LogLevel::normalize("notice"), LogLevel::Info);
        assert_eq!(LogLevel::normalize("trace"), LogLevel::Debug);
        assert_eq!(LogLevel::normalize(""), LogLevel::Info);
    }
}
