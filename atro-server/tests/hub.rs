use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use atro_core::{
    cache::{channels, namespaces},
    classifier::{Analyzer, Classification, Classifier, ClassifierError},
    store::EventStore,
};
use atro_model::{
    AgentCategory, LogLevel, Metadata, NewLogEntry, ResponseActionStatus,
};
use serde_json::json;

mod common;
use common::{action_named, connect, hub, hub_with, next_frame, next_of_kind};

#[derive(Debug)]
struct Stalled;

#[async_trait]
impl Classifier for Stalled {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn classify(&self, _text: &str) -> Result<Classification, ClassifierError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ClassifierError::Malformed("unreachable".into()))
    }
}

#[tokio::test]
async fn new_client_receives_snapshot_first() {
    let hub = hub().await;
    for n in 0..25 {
        hub.state
            .store
            .create_log(NewLogEntry {
                level: LogLevel::Info,
                message: format!("line {n}"),
                source: "test".into(),
                agent_id: None,
                metadata: Metadata::new(),
            })
            .await
            .unwrap();
    }

    let (_socket, initial) = connect(&hub.server).await;
    let data = &initial["data"];
    assert_eq!(data["agents"].as_array().unwrap().len(), 4);
    assert_eq!(data["responseActions"].as_array().unwrap().len(), 4);
    assert_eq!(data["alerts"].as_array().unwrap().len(), 0);

    let logs = data["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 20);
    assert_eq!(logs[0]["message"], "line 24");
    assert_eq!(data["mcpStatus"]["health"]["backend"], "local");
}

#[tokio::test]
async fn toggle_is_broadcast_to_every_client() {
    let hub = hub().await;
    let action = action_named(&hub.state, "Block Malicious IP").await;
    assert_eq!(action.status, ResponseActionStatus::Enabled);

    let (mut sender, _) = connect(&hub.server).await;
    let (mut watcher, _) = connect(&hub.server).await;

    sender
        .send_json(&json!({
            "type": "toggle_response_action",
            "data": { "id": action.id, "status": "disabled" }
        }))
        .await;

    for socket in [&mut sender, &mut watcher] {
        let frame = next_frame(socket).await;
        assert_eq!(frame["type"], "response_action_updated");
        assert_eq!(frame["data"]["id"], json!(action.id));
        assert_eq!(frame["data"]["status"], "disabled");
    }

    let stored = hub
        .state
        .store
        .get_response_action(action.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ResponseActionStatus::Disabled);
}

#[tokio::test]
async fn commands_from_one_client_apply_in_order() {
    let hub = hub().await;
    let action = action_named(&hub.state, "Isolate Compromised Endpoint").await;
    let (mut socket, _) = connect(&hub.server).await;

    let statuses = ["disabled", "enabled", "pending", "disabled", "enabled"];
    for status in statuses {
        socket
            .send_json(&json!({
                "type": "toggle_response_action",
                "data": { "id": action.id, "status": status }
            }))
            .await;
    }

    for status in statuses {
        let frame = next_of_kind(&mut socket, "response_action_updated").await;
        assert_eq!(frame["data"]["status"], status);
    }

    let stored = hub
        .state
        .store
        .get_response_action(action.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ResponseActionStatus::Enabled);
}

#[tokio::test]
async fn bad_frames_do_not_close_the_connection() {
    let hub = hub().await;
    let action = action_named(&hub.state, "Update Firewall Rules").await;
    let (mut socket, _) = connect(&hub.server).await;

    socket.send_text("not json").await;
    socket
        .send_json(&json!({ "type": "reboot_universe", "data": {} }))
        .await;
    socket
        .send_json(&json!({
            "type": "toggle_response_action",
            "data": { "id": action.id, "status": "sideways" }
        }))
        .await;
    socket
        .send_json(&json!({
            "type": "toggle_response_action",
            "data": { "id": action.id, "status": "pending" }
        }))
        .await;

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "response_action_updated");
    assert_eq!(frame["data"]["status"], "pending");
}

#[tokio::test]
async fn classifier_timeout_still_produces_an_insight() {
    let hub = hub_with(
        Analyzer::new(Arc::new(Stalled), Duration::from_millis(100)),
        BTreeMap::new(),
    )
    .await;
    let log = hub
        .state
        .store
        .create_log(NewLogEntry {
            level: LogLevel::Warning,
            message: "Failed password for root from 203.0.113.9".into(),
            source: "Log Parser".into(),
            agent_id: None,
            metadata: Metadata::new(),
        })
        .await
        .unwrap();
    let (mut socket, _) = connect(&hub.server).await;

    socket
        .send_json(&json!({ "type": "analyze_log", "data": { "logId": log.id } }))
        .await;

    let frame = next_of_kind(&mut socket, "new_insight").await;
    let insight = &frame["data"];
    assert_eq!(insight["severity"], "medium");
    assert_eq!(insight["metadata"]["confidence"], json!(0.0));
    assert_eq!(insight["metadata"]["logId"], json!(log.id));
    assert_eq!(
        insight["analysis"],
        atro_core::classifier::FALLBACK_ANALYSIS
    );

    let shared = hub
        .state
        .cache
        .get(namespaces::CONTEXT, &format!("analysis:log:{}", log.id))
        .await
        .unwrap()
        .expect("analysis shared as context");
    let shared: Classification = serde_json::from_str(&shared).unwrap();
    assert!(shared.is_fallback());
}

#[tokio::test]
async fn response_feedback_stamps_last_executed() {
    let hub = hub().await;
    let action = action_named(&hub.state, "Block Malicious IP").await;
    assert!(action.last_executed.is_none());
    let (mut socket, _) = connect(&hub.server).await;

    hub.state
        .cache
        .publish(
            channels::RESPONSE_ACTIONS,
            &json!({
                "action": "Block Malicious IP",
                "command": "iptables -A INPUT -s 203.0.113.9 -j DROP",
                "timestamp": "2025-01-02T03:04:05",
                "successful": true
            })
            .to_string(),
        )
        .await
        .unwrap();

    let frame = next_of_kind(&mut socket, "response_action_updated").await;
    assert_eq!(frame["data"]["id"], json!(action.id));
    assert!(frame["data"]["lastExecuted"].is_string());
}

#[cfg(unix)]
#[tokio::test]
async fn worker_alert_reaches_connected_clients() {
    use atro_config::WorkerCommand;

    let hub = hub_with(
        common::disabled_analyzer(),
        BTreeMap::from([(
            AgentCategory::Log,
            WorkerCommand::new(
                "/bin/sh",
                [
                    "-c",
                    r#"echo '{"type":"alert","severity":"critical","title":"X","description":"Y"}'; exec sleep 30"#,
                ],
            ),
        )]),
    )
    .await;
    let log_parser = hub
        .state
        .store
        .list_agents(None)
        .await
        .unwrap()
        .into_iter()
        .find(|agent| agent.name == "Log Parser")
        .unwrap();
    let (mut socket, _) = connect(&hub.server).await;

    socket
        .send_json(&json!({
            "type": "start_agents",
            "data": { "agentIds": [log_parser.id] }
        }))
        .await;

    let frame = next_of_kind(&mut socket, "new_alert").await;
    assert_eq!(frame["data"]["severity"], "critical");
    assert_eq!(frame["data"]["status"], "new");
    assert_eq!(frame["data"]["source"], "Log Parser");

    hub.state.supervisor.shutdown().await;
}
