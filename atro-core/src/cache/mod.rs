//! Shared context and pub/sub between the hub and worker programs.
//!
//! Values are opaque strings (usually JSON) stored under
//! `mcp:{namespace}:{key}`. The same prefix is used by the worker programs,
//! so blobs written on either side are visible to the other when the
//! networked backend is in use.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use atro_model::CacheHealth;
use thiserror::Error;

pub mod local;
pub mod redis_cache;
pub mod resilient;

pub use local::LocalCache;
pub use redis_cache::RedisCache;
pub use resilient::{ResilientCache, RetryPolicy};

pub const KEY_PREFIX: &str = "mcp";

/// Default lifetime of a context blob.
pub const DEFAULT_CONTEXT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub mod namespaces {
    pub const CONTEXT: &str = "context";
    pub const AGENT_STATUS: &str = "agent_status";
}

pub mod channels {
    /// Response worker reports executed actions here.
    pub const RESPONSE_ACTIONS: &str = "mcp:response:actions";
}

/// Callback invoked once per message received on a subscribed channel.
pub type MessageHandler = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable")]
    Unavailable,

    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

pub fn full_key(namespace: &str, key: &str) -> String {
    format!("{KEY_PREFIX}:{namespace}:{key}")
}

pub fn namespace_prefix(namespace: &str) -> String {
    format!("{KEY_PREFIX}:{namespace}:")
}

#[async_trait]
pub trait ContextCache: Send + Sync + fmt::Debug {
    /// `ttl = None` never expires; a zero TTL removes the value.
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()>;

    async fn get(&self, namespace: &str, key: &str)
    -> CacheResult<Option<String>>;

    /// Keys of live entries in `namespace`, without the prefix, sorted.
    async fn list_keys(&self, namespace: &str) -> CacheResult<Vec<String>>;

    /// Returns the number of receivers that got the message.
    async fn publish(&self, channel: &str, message: &str) -> CacheResult<usize>;

    async fn subscribe(
        &self,
        channel: &str,
        handler: MessageHandler,
    ) -> CacheResult<()>;

    fn health(&self) -> CacheHealth;
}

/// Serialize `value` and store it as a context blob.
pub async fn set_json<T: serde::Serialize + ?Sized>(
    cache: &dyn ContextCache,
    namespace: &str,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> CacheResult<()> {
    let encoded = serde_json::to_string(value)?;
    cache.set(namespace, key, &encoded, ttl).await
}
