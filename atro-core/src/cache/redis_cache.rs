use std::{fmt, time::Duration};

use async_trait::async_trait;
use atro_model::{CacheBackendKind, CacheHealth, CacheState};
use futures_util::StreamExt;
use parking_lot::Mutex;
use redis::{Client, RedisError, aio::ConnectionManager};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    CacheError, CacheResult, ContextCache, MessageHandler, full_key,
    namespace_prefix,
};

impl From<RedisError> for CacheError {
    fn from(err: RedisError) -> Self {
        if is_connection_error(&err) {
            CacheError::Unavailable
        } else {
            CacheError::Backend(err.to_string())
        }
    }
}

pub(crate) fn is_connection_error(err: &RedisError) -> bool {
    err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
}

/// Networked cache shared with the worker programs.
///
/// Commands go through a [`ConnectionManager`]; every subscription runs on
/// its own pub/sub connection in a background task that lives as long as
/// the cache.
pub struct RedisCache {
    client: Client,
    conn: ConnectionManager,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("connection", &"ConnectionManager")
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Backend(format!("invalid Redis URL: {e}")))?;
        let conn = ConnectionManager::new(client.clone()).await?;
        info!("connected to Redis context cache");
        Ok(Self {
            client,
            conn,
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

impl Drop for RedisCache {
    fn drop(&mut self) {
        for task in self.subscriptions.lock().drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl ContextCache for RedisCache {
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let key = full_key(namespace, key);
        debug!(key = %key, ttl = ?ttl, "cache SET");

        let mut conn = self.conn();
        match ttl {
            // PX rejects zero; an expired write is a delete.
            Some(ttl) if ttl.is_zero() => {
                redis::cmd("DEL")
                    .arg(&key)
                    .query_async::<()>(&mut conn)
                    .await?;
            }
            Some(ttl) => {
                let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
                redis::cmd("SET")
                    .arg(&key)
                    .arg(value)
                    .arg("PX")
                    .arg(millis.max(1))
                    .query_async::<()>(&mut conn)
                    .await?;
            }
            None => {
                redis::cmd("SET")
                    .arg(&key)
                    .arg(value)
                    .query_async::<()>(&mut conn)
                    .await?;
            }
        }
        Ok(())
    }

    async fn get(
        &self,
        namespace: &str,
        key: &str,
    ) -> CacheResult<Option<String>> {
        let key = full_key(namespace, key);
        let mut conn = self.conn();
        let value = redis::cmd("GET")
            .arg(&key)
            .query_async::<Option<String>>(&mut conn)
            .await?;
        debug!(key = %key, hit = value.is_some(), "cache GET");
        Ok(value)
    }

    async fn list_keys(&self, namespace: &str) -> CacheResult<Vec<String>> {
        let prefix = namespace_prefix(namespace);
        let mut conn = self.conn();
        let keys = redis::cmd("KEYS")
            .arg(format!("{prefix}*"))
            .query_async::<Vec<String>>(&mut conn)
            .await?;

        let mut keys: Vec<String> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(str::to_string)
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn publish(&self, channel: &str, message: &str) -> CacheResult<usize> {
        let mut conn = self.conn();
        let receivers = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async::<usize>(&mut conn)
            .await?;
        Ok(receivers)
    }

    async fn subscribe(
        &self,
        channel: &str,
        handler: MessageHandler,
    ) -> CacheResult<()> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        info!(channel, "subscribed to cache channel");

        let channel = channel.to_string();
        let task = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(message) = messages.next().await {
                match message.get_payload::<String>() {
                    Ok(payload) => handler(payload),
                    Err(err) => {
                        warn!(channel = %channel, error = %err, "dropping undecodable cache message");
                    }
                }
            }
            warn!(channel = %channel, "cache subscription stream ended");
        });
        self.subscriptions.lock().push(task);
        Ok(())
    }

    fn health(&self) -> CacheHealth {
        CacheHealth {
            backend: CacheBackendKind::Redis,
            state: CacheState::Ready,
        }
    }
}
