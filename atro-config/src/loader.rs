use atro_model::AgentCategory;
use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use url::Url;

use crate::{
    models::{
        AgentsConfig, ClassifierConfig, Config, ConfigMetadata, CorsConfig,
        DEFAULT_CLASSIFIER_BASE_URL, DEFAULT_CLASSIFIER_MODEL, DEFAULT_PORT,
        DEFAULT_WORKER_DIR, DatabaseConfig, RedisConfig, RetryConfig,
        ServerConfig,
    },
    sources::{EnvConfig, FileConfig},
    validation::{self, ConfigGuardRailError, ConfigWarnings},
};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![PathBuf::from("atro.toml"), PathBuf::from("config/atro.toml")]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Apply `.env`, read the process environment and compose.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Compose from an already gathered environment; touches no process
    /// state besides reading the config file.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let (config, warnings) =
            self.compose_config(file_config, env, config_path)?;
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let resolved = if let Some(explicit) = &self.options.config_path {
            Some((explicit.clone(), true))
        } else if let Some(from_env) = &env_config.config_path {
            Some((from_env.clone(), true))
        } else {
            DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .map(|path| (path.clone(), false))
        };

        let Some((path, explicit)) = resolved else {
            return Ok((None, None));
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents =
            fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
                path: path.clone(),
                source: err,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;

        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
    ) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if config_path.is_none() {
            warnings.push_with_hint(
                "No atro.toml detected; using environment variables and defaults",
                "Create atro.toml or set ATRO_CONFIG_PATH to customize workers",
            );
        }

        let FileConfig {
            server: file_server,
            database: file_database,
            redis: file_redis,
            cache_retry: file_retry,
            agents: file_agents,
            classifier: file_classifier,
            cors: file_cors,
        } = file_config.unwrap_or_default();

        let server = ServerConfig {
            host: env
                .server_host
                .or(file_server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        };

        let database = DatabaseConfig {
            url: env
                .database_url
                .or(file_database.url)
                .filter(|url| !url.trim().is_empty())
                .map(|url| validate_url("database.url", url))
                .transpose()?,
        };

        let redis = env
            .redis_url
            .or(file_redis.map(|redis| redis.url))
            .filter(|url| !url.trim().is_empty())
            .map(|url| validate_url("redis.url", url))
            .transpose()?
            .map(|url| RedisConfig { url });

        let retry_defaults = RetryConfig::default();
        let cache_retry = RetryConfig {
            max_attempts: env
                .cache_retry_max_attempts
                .or(file_retry.max_attempts)
                .unwrap_or(retry_defaults.max_attempts),
            initial_delay: parse_duration(
                "cache_retry.initial_delay",
                env.cache_retry_initial_delay.or(file_retry.initial_delay),
            )?
            .unwrap_or(retry_defaults.initial_delay),
            max_delay: parse_duration(
                "cache_retry.max_delay",
                env.cache_retry_max_delay.or(file_retry.max_delay),
            )?
            .unwrap_or(retry_defaults.max_delay),
        };

        let agent_defaults = AgentsConfig::default();
        let worker_dir = env
            .agent_worker_dir
            .or(file_agents.worker_dir)
            .unwrap_or_else(|| DEFAULT_WORKER_DIR.to_string());
        let mut workers = AgentsConfig::default_workers(&worker_dir);
        for (name, command) in file_agents.workers {
            let category = name.parse::<AgentCategory>().map_err(|_| {
                ConfigLoadError::UnknownAgentCategory { name: name.clone() }
            })?;
            workers.insert(category, command);
        }
        let agents = AgentsConfig {
            grace_period: parse_duration(
                "agents.grace_period",
                env.agent_grace_period.or(file_agents.grace_period),
            )?
            .unwrap_or(agent_defaults.grace_period),
            workers,
        };

        let classifier_defaults = ClassifierConfig::default();
        let classifier = ClassifierConfig {
            api_key: env.classifier_api_key.or(file_classifier.api_key),
            model: env
                .classifier_model
                .or(file_classifier.model)
                .unwrap_or_else(|| DEFAULT_CLASSIFIER_MODEL.to_string()),
            base_url: validate_url(
                "classifier.base_url",
                env.classifier_base_url
                    .or(file_classifier.base_url)
                    .unwrap_or_else(|| DEFAULT_CLASSIFIER_BASE_URL.to_string()),
            )?,
            timeout: parse_duration(
                "classifier.timeout",
                env.classifier_timeout.or(file_classifier.timeout),
            )?
            .unwrap_or(classifier_defaults.timeout),
        };

        let cors = CorsConfig {
            allowed_origins: env
                .cors_allowed_origins
                .or(file_cors.allowed_origins)
                .unwrap_or_else(default_cors_origins),
        };

        let config = Config {
            server,
            database,
            redis,
            cache_retry,
            agents,
            classifier,
            cors,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: false,
            },
        };

        let guard_warnings = validation::apply_guard_rails(&config)?;
        warnings.extend(guard_warnings);

        Ok((config, warnings))
    }
}

fn parse_duration(
    field: &'static str,
    raw: Option<String>,
) -> Result<Option<Duration>, ConfigLoadError> {
    raw.map(|value| {
        humantime::parse_duration(value.trim()).map_err(|source| {
            ConfigLoadError::InvalidDuration {
                field,
                value,
                source,
            }
        })
    })
    .transpose()
}

fn validate_url(
    field: &'static str,
    raw: String,
) -> Result<String, ConfigLoadError> {
    let trimmed = raw.trim();
    Url::parse(trimmed)
        .map(|_| trimmed.to_string())
        .map_err(|source| ConfigLoadError::InvalidUrl { field, source })
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid URL for {field}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid duration '{value}' for {field}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("unknown agent category '{name}' in agents.workers")]
    UnknownAgentCategory { name: String },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoad {
    /// Emit every warning through `tracing`.
    pub fn log_warnings(&self) {
        for warning in self.warnings.iter() {
            tracing::warn!("{warning}");
        }
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config.metadata.config_path.as_deref()
    }
}
