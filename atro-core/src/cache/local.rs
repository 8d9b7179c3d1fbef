use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use atro_model::{CacheBackendKind, CacheHealth, CacheState};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{
    CacheResult, ContextCache, MessageHandler, full_key, namespace_prefix,
};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
    generation: u64,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    handlers: Mutex<HashMap<String, Vec<MessageHandler>>>,
    generation: Mutex<u64>,
}

/// In-process cache used when no networked backend is reachable.
///
/// Pub/sub is process-local: `publish` reaches only handlers registered on
/// this instance.
#[derive(Clone, Default)]
pub struct LocalCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCache")
            .field("entries", &self.inner.entries.lock().len())
            .field("channels", &self.inner.handlers.lock().len())
            .finish()
    }
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_generation(&self) -> u64 {
        let mut generation = self.inner.generation.lock();
        *generation += 1;
        *generation
    }

    /// Remove `key` once `ttl` elapses unless it was overwritten meanwhile.
    fn schedule_expiry(&self, key: String, generation: u64, ttl: Duration) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut entries = inner.entries.lock();
            if entries
                .get(&key)
                .is_some_and(|entry| entry.generation == generation)
            {
                entries.remove(&key);
                debug!(key = %key, "local cache entry expired");
            }
        });
    }
}

#[async_trait]
impl ContextCache for LocalCache {
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let key = full_key(namespace, key);

        if ttl.is_some_and(|ttl| ttl.is_zero()) {
            self.inner.entries.lock().remove(&key);
            return Ok(());
        }

        let generation = self.next_generation();
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.inner.entries.lock().insert(
            key.clone(),
            Entry {
                value: value.to_string(),
                expires_at,
                generation,
            },
        );

        if let Some(ttl) = ttl {
            self.schedule_expiry(key, generation, ttl);
        }
        Ok(())
    }

    async fn get(
        &self,
        namespace: &str,
        key: &str,
    ) -> CacheResult<Option<String>> {
        let key = full_key(namespace, key);
        let now = Instant::now();
        let entries = self.inner.entries.lock();
        Ok(entries
            .get(&key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn list_keys(&self, namespace: &str) -> CacheResult<Vec<String>> {
        let prefix = namespace_prefix(namespace);
        let now = Instant::now();
        let entries = self.inner.entries.lock();
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .filter_map(|(key, _)| key.strip_prefix(&prefix))
            .map(str::to_string)
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn publish(&self, channel: &str, message: &str) -> CacheResult<usize> {
        // Handlers run outside the lock so they may subscribe or publish.
        let handlers = self
            .inner
            .handlers
            .lock()
            .get(channel)
            .cloned()
            .unwrap_or_default();
        for handler in &handlers {
            handler(message.to_string());
        }
        Ok(handlers.len())
    }

    async fn subscribe(
        &self,
        channel: &str,
        handler: MessageHandler,
    ) -> CacheResult<()> {
        self.inner
            .handlers
            .lock()
            .entry(channel.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    fn health(&self) -> CacheHealth {
        CacheHealth {
            backend: CacheBackendKind::Local,
            state: CacheState::Ready,
        }
    }
}
