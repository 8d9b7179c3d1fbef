use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use atro_model::{DashboardCommand, DashboardEvent};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::{
    handlers::{commands, snapshot},
    infra::{
        app_state::AppState,
        websocket::{Connection, messages},
    },
};

/// Handle WebSocket upgrade request
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual dashboard connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (connection, mut rx) = Connection::awaiting_snapshot();
    let connection = Arc::new(connection);
    let conn_id = connection.id;

    // Registered before the snapshot is read; broadcasts are held until the
    // snapshot is queued in front of them.
    state.websocket_manager.add_connection(Arc::clone(&connection));
    let watermark = state.bus.last_sequence();

    let snapshot = match snapshot::initial_snapshot(&state).await {
        Ok(snapshot) => {
            match messages::event_frame(&DashboardEvent::InitialData(Box::new(snapshot))) {
                Ok(frame) => Some(frame),
                Err(err) => {
                    error!(connection_id = %conn_id, error = %err, "failed to encode snapshot");
                    None
                }
            }
        }
        Err(err) => {
            error!(connection_id = %conn_id, error = %err, "failed to build snapshot");
            None
        }
    };
    connection.release(snapshot, watermark);

    info!(
        connection_id = %conn_id,
        clients = state.websocket_manager.connection_count(),
        "dashboard client connected"
    );

    // Spawn task to handle outgoing messages
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // Commands from one client apply in the order they were sent.
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_commands(state.clone(), conn_id, command_rx));

    // Handle incoming messages
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_text(&state, conn_id, text.as_str(), &command_tx)
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection_id = %conn_id, error = %e, "websocket error");
                break;
            }
        }
    }

    // Clean up on disconnect; accepted commands still run.
    state.websocket_manager.remove_connection(conn_id);
    drop(connection);
    drop(command_tx);
    writer.abort();
    info!(
        connection_id = %conn_id,
        clients = state.websocket_manager.connection_count(),
        "dashboard client disconnected"
    );
}

/// Parse one inbound frame and hand the command off the read loop.
///
/// Log analysis may wait on the classifier for a long time, so it runs on
/// its own; everything else goes through the per-connection queue.
fn handle_text(
    state: &AppState,
    conn_id: Uuid,
    text: &str,
    command_tx: &mpsc::UnboundedSender<DashboardCommand>,
) {
    let command = match DashboardCommand::parse(text) {
        Ok(Some(command)) => command,
        Ok(None) => {
            trace!(connection_id = %conn_id, "ignoring unknown command");
            return;
        }
        Err(err) => {
            warn!(connection_id = %conn_id, error = %err, "dropping malformed command");
            return;
        }
    };

    if let DashboardCommand::AnalyzeLog(_) = command {
        let state = state.clone();
        tokio::spawn(async move { run_command(&state, conn_id, command).await });
    } else if command_tx.send(command).is_err() {
        warn!(connection_id = %conn_id, "command queue closed; dropping command");
    }
}

async fn run_commands(
    state: AppState,
    conn_id: Uuid,
    mut queued: mpsc::UnboundedReceiver<DashboardCommand>,
) {
    while let Some(command) = queued.recv().await {
        run_command(&state, conn_id, command).await;
    }
}

async fn run_command(state: &AppState, conn_id: Uuid, command: DashboardCommand) {
    let kind = command.kind();
    debug!(connection_id = %conn_id, command = kind, "handling command");
    if let Err(err) = commands::dispatch(state, command).await {
        warn!(connection_id = %conn_id, command = kind, error = %err, "command failed");
    }
}
