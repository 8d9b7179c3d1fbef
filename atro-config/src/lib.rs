//! Configuration loading for ATRO.
//!
//! Values come from three layers with fixed precedence: process environment
//! (after `.env` is applied), an optional TOML file, then built-in defaults.
//! The server never needs a config file; with nothing set it runs against
//! the in-memory store and in-process cache.

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    AgentsConfig, ClassifierConfig, Config, ConfigMetadata, CorsConfig,
    DatabaseConfig, RedisConfig, RetryConfig, ServerConfig, WorkerCommand,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
