use std::{sync::Arc, time::Duration};

use atro_core::cache::{
    CacheError, ContextCache, ResilientCache, RetryPolicy, namespaces,
};
use atro_model::{CacheBackendKind, CacheState};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
};

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        connect_timeout: Duration::from_millis(300),
    }
}

#[tokio::test]
async fn unreachable_redis_fails_fast_then_falls_back_to_local() {
    // Port 1 is never a Redis server.
    let cache = ResilientCache::new(
        Some("redis://127.0.0.1:1".to_string()),
        fast_policy(),
    );

    assert_eq!(cache.health().state, CacheState::Connecting);
    let err = cache
        .get(namespaces::CONTEXT, "anything")
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Unavailable));

    let health = tokio::time::timeout(Duration::from_secs(10), cache.settled())
        .await
        .expect("cache should settle");
    assert_eq!(health.backend, CacheBackendKind::Local);
    assert_eq!(health.state, CacheState::Fallback);

    cache
        .set(namespaces::AGENT_STATUS, "1", "active", None)
        .await
        .unwrap();
    assert_eq!(
        cache
            .get(namespaces::AGENT_STATUS, "1")
            .await
            .unwrap()
            .as_deref(),
        Some("active")
    );
}

#[tokio::test]
async fn subscriptions_made_while_connecting_are_replayed() {
    let cache = ResilientCache::new(
        Some("redis://127.0.0.1:1".to_string()),
        fast_policy(),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    cache
        .subscribe(
            "mcp:response:actions",
            Arc::new(move |message| sink.lock().push(message)),
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), cache.settled())
        .await
        .expect("cache should settle");

    let receivers = cache
        .publish("mcp:response:actions", "{\"action\":\"x\"}")
        .await
        .unwrap();
    assert_eq!(receivers, 1);
    assert_eq!(seen.lock().len(), 1);
}

/// Read one RESP command (array of bulk strings).
async fn read_command<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        args.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Some(args)
}

/// A Redis endpoint that accepts a single connection, answers until the
/// first `SET`, then hangs up. The listener is closed after the accept, so
/// every reconnect is refused.
async fn redis_that_hangs_up_after_set() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(listener);
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);
        while let Some(command) = read_command(&mut reader).await {
            let name = command.first().map(|name| name.to_ascii_uppercase());
            let reply: &[u8] = match name.as_deref() {
                Some("PING") => b"+PONG\r\n",
                _ => b"+OK\r\n",
            };
            if write.write_all(reply).await.is_err() {
                return;
            }
            if name.as_deref() == Some("SET") {
                return;
            }
        }
    });
    format!("redis://{addr}")
}

#[tokio::test]
async fn lost_connection_reconnects_then_falls_back_to_local() {
    let cache = ResilientCache::new(
        Some(redis_that_hangs_up_after_set().await),
        fast_policy(),
    );

    let health = tokio::time::timeout(Duration::from_secs(10), cache.settled())
        .await
        .expect("cache should settle");
    assert_eq!(health.backend, CacheBackendKind::Redis);
    assert_eq!(health.state, CacheState::Ready);

    cache
        .set(namespaces::CONTEXT, "network:connection", "{}", None)
        .await
        .unwrap();

    let err = tokio::time::timeout(
        Duration::from_secs(30),
        cache.get(namespaces::CONTEXT, "network:connection"),
    )
    .await
    .expect("failed command should return")
    .unwrap_err();
    assert!(matches!(err, CacheError::Unavailable));
    assert_eq!(cache.health().state, CacheState::Connecting);
    assert!(matches!(
        cache.list_keys(namespaces::CONTEXT).await,
        Err(CacheError::Unavailable)
    ));

    let health = tokio::time::timeout(Duration::from_secs(10), cache.settled())
        .await
        .expect("cache should settle again");
    assert_eq!(health.backend, CacheBackendKind::Local);
    assert_eq!(health.state, CacheState::Fallback);

    cache
        .set(namespaces::CONTEXT, "network:connection", "{}", None)
        .await
        .unwrap();
    assert_eq!(
        cache
            .list_keys(namespaces::CONTEXT)
            .await
            .unwrap(),
        vec!["network:connection".to_string()]
    );
}
