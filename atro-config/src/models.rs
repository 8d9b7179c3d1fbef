use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use atro_model::AgentCategory;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_WORKER_DIR: &str = "server/python";
pub const DEFAULT_CLASSIFIER_MODEL: &str = "gpt-4o";
pub const DEFAULT_CLASSIFIER_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: Option<RedisConfig>,
    pub cache_retry: RetryConfig,
    pub agents: AgentsConfig,
    pub classifier: ClassifierConfig,
    pub cors: CorsConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn redis_url(&self) -> Option<&str> {
        self.redis.as_ref().map(|redis| redis.url.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// `None` selects the in-memory store.
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Bounded backoff used while establishing the networked cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// External program launched for an agent category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentsConfig {
    /// Time between SIGTERM and a forced kill on `stop`.
    pub grace_period: Duration,
    pub workers: BTreeMap<AgentCategory, WorkerCommand>,
}

impl AgentsConfig {
    /// Python worker scripts under `dir`; the intelligence category has no
    /// worker program.
    pub fn default_workers(dir: &str) -> BTreeMap<AgentCategory, WorkerCommand> {
        let dir = dir.trim_end_matches('/');
        [
            (AgentCategory::Network, "network_monitor.py"),
            (AgentCategory::Log, "log_parser.py"),
            (AgentCategory::Response, "response_agent.py"),
        ]
        .into_iter()
        .map(|(category, script)| {
            (
                category,
                WorkerCommand::new("python3", [format!("{dir}/{script}")]),
            )
        })
        .collect()
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            workers: Self::default_workers(DEFAULT_WORKER_DIR),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// `None` disables the external call; analysis falls back to defaults.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            base_url: DEFAULT_CLASSIFIER_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn is_wildcard_included(&self) -> bool {
        self.allowed_origins
            .iter()
            .any(|origin| origin.trim() == "*")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
