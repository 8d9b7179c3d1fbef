#![allow(dead_code)]

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use atro_config::{Config, ConfigLoader, WorkerCommand, sources::EnvConfig};
use atro_core::{
    EventBus,
    cache::{ContextCache, LocalCache},
    classifier::{Analyzer, DisabledClassifier},
    store::{EventStore, MemoryStore},
};
use atro_model::{AgentCategory, ResponseAction};
use atro_server::{AppState, infra::startup, routes};
use axum_test::{TestServer, TestWebSocket};
use serde_json::Value;
use tokio::task::JoinHandle;

pub struct TestHub {
    pub server: TestServer,
    pub state: AppState,
    broadcaster: JoinHandle<()>,
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.broadcaster.abort();
    }
}

/// Defaults with no file and no environment.
pub fn base_config() -> Config {
    ConfigLoader::new()
        .load_with_env(EnvConfig::from_lookup(|_| None))
        .expect("default config")
        .config
}

pub fn disabled_analyzer() -> Analyzer {
    Analyzer::new(Arc::new(DisabledClassifier), Duration::from_secs(1))
}

pub async fn hub() -> TestHub {
    hub_with(disabled_analyzer(), BTreeMap::new()).await
}

pub async fn hub_with(
    analyzer: Analyzer,
    workers: BTreeMap<AgentCategory, WorkerCommand>,
) -> TestHub {
    let mut config = base_config();
    config.agents.workers = workers;
    config.agents.grace_period = Duration::from_secs(1);

    let store: Arc<dyn EventStore> = Arc::new(MemoryStore::seeded());
    let cache: Arc<dyn ContextCache> = Arc::new(LocalCache::new());
    let (bus, events) = EventBus::new();
    let state = AppState::new(Arc::new(config), store, cache, analyzer, bus);
    let broadcaster = startup::start_background_tasks(&state, events).await;

    let server = TestServer::builder()
        .http_transport()
        .build(routes::create_app(state.clone()))
        .expect("test server");

    TestHub {
        server,
        state,
        broadcaster,
    }
}

/// Open a dashboard socket and consume its `initial_data` frame.
pub async fn connect(server: &TestServer) -> (TestWebSocket, Value) {
    let mut socket = server
        .get_websocket(routes::WEBSOCKET_PATH)
        .await
        .into_websocket()
        .await;
    let initial = next_frame(&mut socket).await;
    assert_eq!(initial["type"], "initial_data");
    (socket, initial)
}

pub async fn next_frame(socket: &mut TestWebSocket) -> Value {
    tokio::time::timeout(Duration::from_secs(5), socket.receive_json::<Value>())
        .await
        .expect("timed out waiting for a frame")
}

/// Skip frames until one of `kind` arrives.
pub async fn next_of_kind(socket: &mut TestWebSocket, kind: &str) -> Value {
    for _ in 0..20 {
        let frame = next_frame(socket).await;
        if frame["type"] == kind {
            return frame;
        }
    }
    panic!("no {kind} frame arrived");
}

pub async fn action_named(state: &AppState, name: &str) -> ResponseAction {
    state
        .store
        .find_response_action_by_name(name)
        .await
        .unwrap()
        .expect("seeded response action")
}
