use std::fmt;

use atro_model::AgentCategory;
use thiserror::Error;

use crate::models::Config;

/// Non-fatal observation about the loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{} ({hint})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigWarnings {
    items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint(
        &mut self,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.items.iter().any(|item| item.message.contains(needle))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("cache_retry.max_attempts must be at least 1")]
    ZeroRetryAttempts,
    #[error(
        "cache_retry.max_delay ({max:?}) is shorter than initial_delay ({initial:?})"
    )]
    InvertedRetryDelays {
        initial: std::time::Duration,
        max: std::time::Duration,
    },
    #[error("worker command for '{category}' has an empty program")]
    EmptyWorkerProgram { category: AgentCategory },
}

/// Hard errors for settings the server cannot run with, warnings for the
/// degraded-but-valid ones.
pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let retry = &config.cache_retry;
    if retry.max_attempts == 0 {
        return Err(ConfigGuardRailError::ZeroRetryAttempts);
    }
    if retry.max_delay < retry.initial_delay {
        return Err(ConfigGuardRailError::InvertedRetryDelays {
            initial: retry.initial_delay,
            max: retry.max_delay,
        });
    }
    if let Some((category, _)) = config
        .agents
        .workers
        .iter()
        .find(|(_, command)| command.program.trim().is_empty())
    {
        return Err(ConfigGuardRailError::EmptyWorkerProgram {
            category: *category,
        });
    }

    let mut warnings = ConfigWarnings::default();

    if config.database.url.is_none() {
        warnings.push_with_hint(
            "No database configured; records live in memory for this process only",
            "Set DATABASE_URL to persist to PostgreSQL",
        );
    }
    if config.redis.is_none() {
        warnings.push_with_hint(
            "No Redis configured; context cache and pub/sub stay in-process",
            "Set REDIS_URL so worker programs can share context",
        );
    }
    if config.classifier.api_key.is_none() {
        warnings.push_with_hint(
            "Classifier disabled; log analysis returns the default result",
            "Set OPENAI_API_KEY to enable analysis",
        );
    }
    for category in AgentCategory::ALL {
        if !config.agents.workers.contains_key(category) {
            warnings.push(format!(
                "No worker program for '{category}' agents; starting them will fail"
            ));
        }
    }
    if config.cors.is_wildcard_included() {
        warnings.push("CORS allows any origin");
    }

    Ok(warnings)
}
