//! Boot-time cache selection with bounded reconnects and a local fallback.
//!
//! State machine:
//!
//! ```text
//! Connecting ──ok──▶ Redis ──connection error──▶ Connecting
//!     │
//!     └──attempts exhausted──▶ Local (for the rest of the process)
//! ```
//!
//! While `Connecting` every operation fails fast with
//! [`CacheError::Unavailable`]; nothing waits on the background task.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use atro_config::RetryConfig;
use atro_model::{CacheBackendKind, CacheHealth, CacheState};
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use super::{
    CacheError, CacheResult, ContextCache, LocalCache, MessageHandler,
    RedisCache,
};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Capped doubling backoff between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound for a single connection attempt.
    pub connect_timeout: Duration,
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

#[derive(Clone)]
enum Backend {
    Connecting,
    Redis(Arc<RedisCache>),
    Local(LocalCache),
}

impl Backend {
    fn is_settled(&self) -> bool {
        !matches!(self, Backend::Connecting)
    }
}

struct Shared {
    redis_url: Option<String>,
    policy: RetryPolicy,
    state: watch::Sender<Backend>,
    /// Every subscription ever requested, replayed whenever a backend is
    /// selected.
    subscriptions: Mutex<Vec<(String, MessageHandler)>>,
}

/// The [`ContextCache`] injected into the supervisor and the hub.
#[derive(Clone)]
pub struct ResilientCache {
    shared: Arc<Shared>,
}

impl fmt::Debug for ResilientCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientCache")
            .field("health", &self.health())
            .field("policy", &self.shared.policy)
            .finish()
    }
}

impl ResilientCache {
    /// Select a backend. With a URL the connection runs in a background
    /// task, so this must be called inside a Tokio runtime.
    pub fn new(redis_url: Option<String>, policy: RetryPolicy) -> Self {
        let initial = if redis_url.is_some() {
            Backend::Connecting
        } else {
            Backend::Local(LocalCache::new())
        };
        let (state, _) = watch::channel(initial);
        let shared = Arc::new(Shared {
            redis_url,
            policy,
            state,
            subscriptions: Mutex::new(Vec::new()),
        });

        if let Some(url) = shared.redis_url.clone() {
            tokio::spawn(Shared::connect(Arc::clone(&shared), url));
        } else {
            info!("no Redis URL configured; using local context cache");
        }

        Self { shared }
    }

    /// Wait until the backend is no longer connecting.
    pub async fn settled(&self) -> CacheHealth {
        let mut rx = self.shared.state.subscribe();
        let settled = rx.wait_for(Backend::is_settled).await.is_ok();
        if !settled {
            warn!("cache state channel closed before settling");
        }
        self.health()
    }

    fn current(&self) -> Backend {
        self.shared.state.borrow().clone()
    }

    fn observe<T>(
        &self,
        redis: &Arc<RedisCache>,
        result: CacheResult<T>,
    ) -> CacheResult<T> {
        if let Err(CacheError::Unavailable) = &result {
            self.shared.reconnect(redis);
        }
        result
    }
}

impl Shared {
    async fn connect(shared: Arc<Shared>, url: String) {
        let policy = shared.policy;
        for attempt in 0..policy.max_attempts {
            let outcome =
                tokio::time::timeout(policy.connect_timeout, RedisCache::connect(&url))
                    .await;
            match outcome {
                Ok(Ok(redis)) => {
                    shared.settle(Backend::Redis(Arc::new(redis))).await;
                    return;
                }
                Ok(Err(err)) => {
                    warn!(attempt = attempt + 1, max = policy.max_attempts, error = %err, "Redis connection attempt failed");
                }
                Err(_) => {
                    warn!(attempt = attempt + 1, max = policy.max_attempts, "Redis connection attempt timed out");
                }
            }
            if attempt + 1 < policy.max_attempts {
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
        }

        warn!(
            attempts = policy.max_attempts,
            "Redis unreachable; falling back to local context cache"
        );
        shared.settle(Backend::Local(LocalCache::new())).await;
    }

    /// Publish the selected backend and replay subscriptions onto it.
    async fn settle(&self, backend: Backend) {
        let subscriptions = self.subscriptions.lock().await;
        for (channel, handler) in subscriptions.iter() {
            let result = match &backend {
                Backend::Redis(redis) => {
                    redis.subscribe(channel, Arc::clone(handler)).await
                }
                Backend::Local(local) => {
                    local.subscribe(channel, Arc::clone(handler)).await
                }
                Backend::Connecting => Ok(()),
            };
            if let Err(err) = result {
                warn!(channel = %channel, error = %err, "failed to replay cache subscription");
            }
        }
        self.state.send_replace(backend);
    }

    /// Start one reconnect sequence if `failed` is still the live backend.
    fn reconnect(self: &Arc<Self>, failed: &Arc<RedisCache>) {
        let Some(url) = self.redis_url.clone() else {
            return;
        };
        let switched = self.state.send_if_modified(|backend| match backend {
            Backend::Redis(current) if Arc::ptr_eq(current, failed) => {
                *backend = Backend::Connecting;
                true
            }
            _ => false,
        });
        if switched {
            warn!("Redis connection lost; reconnecting");
            tokio::spawn(Shared::connect(Arc::clone(self), url));
        }
    }
}

#[async_trait]
impl ContextCache for ResilientCache {
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        match self.current() {
            Backend::Connecting => Err(CacheError::Unavailable),
            Backend::Local(local) => local.set(namespace, key, value, ttl).await,
            Backend::Redis(redis) => {
                let result = redis.set(namespace, key, value, ttl).await;
                self.observe(&redis, result)
            }
        }
    }

    async fn get(
        &self,
        namespace: &str,
        key: &str,
    ) -> CacheResult<Option<String>> {
        match self.current() {
            Backend::Connecting => Err(CacheError::Unavailable),
            Backend::Local(local) => local.get(namespace, key).await,
            Backend::Redis(redis) => {
                let result = redis.get(namespace, key).await;
                self.observe(&redis, result)
            }
        }
    }

    async fn list_keys(&self, namespace: &str) -> CacheResult<Vec<String>> {
        match self.current() {
            Backend::Connecting => Err(CacheError::Unavailable),
            Backend::Local(local) => local.list_keys(namespace).await,
            Backend::Redis(redis) => {
                let result = redis.list_keys(namespace).await;
                self.observe(&redis, result)
            }
        }
    }

    async fn publish(&self, channel: &str, message: &str) -> CacheResult<usize> {
        match self.current() {
            Backend::Connecting => Err(CacheError::Unavailable),
            Backend::Local(local) => local.publish(channel, message).await,
            Backend::Redis(redis) => {
                let result = redis.publish(channel, message).await;
                self.observe(&redis, result)
            }
        }
    }

    /// Recorded and replayed on every backend selection; succeeds while
    /// connecting.
    async fn subscribe(
        &self,
        channel: &str,
        handler: MessageHandler,
    ) -> CacheResult<()> {
        let mut subscriptions = self.shared.subscriptions.lock().await;
        subscriptions.push((channel.to_string(), Arc::clone(&handler)));

        match self.current() {
            Backend::Connecting => Ok(()),
            Backend::Local(local) => local.subscribe(channel, handler).await,
            Backend::Redis(redis) => {
                let result = redis.subscribe(channel, handler).await;
                self.observe(&redis, result)
            }
        }
    }

    fn health(&self) -> CacheHealth {
        let configured = self.shared.redis_url.is_some();
        match &*self.shared.state.borrow() {
            Backend::Connecting => CacheHealth {
                backend: CacheBackendKind::Redis,
                state: CacheState::Connecting,
            },
            Backend::Redis(_) => CacheHealth {
                backend: CacheBackendKind::Redis,
                state: CacheState::Ready,
            },
            Backend::Local(_) => CacheHealth {
                backend: CacheBackendKind::Local,
                state: if configured {
                    CacheState::Fallback
                } else {
                    CacheState::Ready
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        };

        assert_eq!(policy.delay_for(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1600));
        assert_eq!(policy.delay_for(4), Duration::from_secs(2));
        assert_eq!(policy.delay_for(40), Duration::from_secs(2));
    }

    #[test]
    fn policy_from_config_keeps_at_least_one_attempt() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(RetryPolicy::from(&config).max_attempts, 1);
    }

    #[tokio::test]
    async fn without_url_local_cache_is_ready_immediately() {
        let cache = ResilientCache::new(None, RetryPolicy::default());
        assert_eq!(
            cache.health(),
            CacheHealth {
                backend: CacheBackendKind::Local,
                state: CacheState::Ready,
            }
        );
        cache.set("context", "k", "v", None).await.unwrap();
        assert_eq!(cache.get("context", "k").await.unwrap().as_deref(), Some("v"));
    }
}
