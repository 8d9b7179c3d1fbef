use std::sync::Arc;

use anyhow::{Context, Result};
use atro_config::Config;
use atro_core::{
    EventBus, EventReceiver,
    cache::{ContextCache, MessageHandler, ResilientCache, RetryPolicy, channels},
    classifier::Analyzer,
    store::{EventStore, MemoryStore, PostgresStore, SeedOutcome, seed_defaults},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    handlers::response_feedback::record_response_feedback,
    infra::{app_state::AppState, websocket::spawn_broadcaster},
};

/// Shared state plus the event stream the broadcaster will own.
#[derive(Debug)]
pub struct Bootstrap {
    pub state: AppState,
    pub events: EventReceiver,
}

/// Build every backend from configuration and seed the store.
pub async fn bootstrap(config: Config) -> Result<Bootstrap> {
    let store: Arc<dyn EventStore> = match config.database.url.as_deref() {
        Some(url) => Arc::new(
            PostgresStore::connect(url)
                .await
                .context("failed to connect to PostgreSQL")?,
        ),
        None => {
            info!("no database configured; using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    match seed_defaults(store.as_ref())
        .await
        .context("failed to seed default records")?
    {
        SeedOutcome::Seeded {
            agents,
            response_actions,
        } => info!(agents, response_actions, "seeded default records"),
        SeedOutcome::Skipped => info!("existing agents found; skipping seed"),
    }

    let cache: Arc<dyn ContextCache> = Arc::new(ResilientCache::new(
        config.redis_url().map(str::to_string),
        RetryPolicy::from(&config.cache_retry),
    ));

    let analyzer = Analyzer::from_config(&config.classifier)
        .context("failed to build classifier client")?;

    let (bus, events) = EventBus::new();
    let state = AppState::new(Arc::new(config), store, cache, analyzer, bus);
    Ok(Bootstrap { state, events })
}

/// Start the broadcaster and the response-feedback subscription.
pub async fn start_background_tasks(
    state: &AppState,
    events: EventReceiver,
) -> JoinHandle<()> {
    let broadcaster = spawn_broadcaster(Arc::clone(&state.websocket_manager), events);
    subscribe_response_feedback(state).await;
    broadcaster
}

/// Forward `mcp:response:actions` messages into the store, one at a time.
pub async fn subscribe_response_feedback(state: &AppState) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handler: MessageHandler = Arc::new(move |message| {
        let _ = tx.send(message);
    });

    if let Err(err) = state.cache.subscribe(channels::RESPONSE_ACTIONS, handler).await {
        warn!(channel = channels::RESPONSE_ACTIONS, error = %err, "response feedback disabled");
        return;
    }

    let state = state.clone();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(err) = record_response_feedback(&state, &message).await {
                warn!(error = %err, "failed to record response feedback");
            }
        }
    });
}
