use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::history::RecordAction;
use crate::protocol::{now_rfc3339, Command, Envelope};
use crate::registry::ConnectionId;
use crate::AppState;

pub async fn ws_endpoint(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one client session: register it, pump its outbound queue into the
/// socket from a writer task, and handle inbound frames strictly one at a time.
/// The next frame is not read until the current one has been fully answered,
/// so per-connection handling is sequential; concurrency exists only across
/// connections.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn_id = state.registry.add(tx).await;
    state.metrics.ws_connections.inc();

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => process_message(&state, conn_id, &text).await,
            Ok(Message::Close(_)) => break,
            // Control frames are answered by the transport layer itself and
            // binary frames carry nothing we speak.
            Ok(_) => {}
            Err(err) => {
                warn!(connection_id = %conn_id, error = %err, "websocket transport error");
                break;
            }
        }
    }

    state.registry.remove(conn_id).await;
    state.metrics.ws_connections.dec();
    writer.abort();
}

/// Handle one inbound frame end to end: decode, dispatch, reply. Decode
/// failures and unexpected handler errors both turn into an error reply on
/// this connection and never close it.
pub async fn process_message(state: &AppState, conn_id: ConnectionId, raw: &str) {
    let _timer = state.metrics.message_handle_seconds.start_timer();
    let command = match Command::decode(raw) {
        Ok(command) => command,
        Err(err) => {
            warn!(connection_id = %conn_id, error = %err, "undecodable message");
            let reply = Envelope::error(None, format!("invalid message: {err}"));
            send(state, conn_id, &reply).await;
            return;
        }
    };
    debug!(connection_id = %conn_id, action = command.action_label(), "handling message");
    state
        .metrics
        .ws_messages_total
        .with_label_values(&[command.action_label()])
        .inc();

    let action = command.action_label();
    if let Err(err) = dispatch(state, conn_id, command).await {
        error!(connection_id = %conn_id, action, error = %err, "handler failed");
        let reply = Envelope::error(Some(action), format!("server error: {err}"));
        send(state, conn_id, &reply).await;
    }
}

async fn dispatch(state: &AppState, conn_id: ConnectionId, command: Command) -> anyhow::Result<()> {
    match command {
        Command::GetStatus => get_tool_status(state, conn_id).await,
        Command::Borrow { quantity } => borrow_tool(state, conn_id, quantity).await,
        Command::Return { quantity } => return_tool(state, conn_id, quantity).await,
        Command::SensorUpdate { current_weight } => {
            sensor_update(state, conn_id, current_weight).await
        }
        Command::Ping => {
            send(state, conn_id, &Envelope::pong()).await;
            Ok(())
        }
        Command::Unknown { action } => {
            let reply = Envelope::error(Some(action.as_str()), format!("unknown action: {action}"));
            send(state, conn_id, &reply).await;
            Ok(())
        }
    }
}

async fn get_tool_status(state: &AppState, conn_id: ConnectionId) -> anyhow::Result<()> {
    let reply = match state.store.snapshot().await {
        Some(snapshot) => Envelope::tool_data("get_status", serde_json::to_value(&snapshot)?),
        None => Envelope::tool_failure("get_status", "tool not found"),
    };
    send(state, conn_id, &reply).await;
    Ok(())
}

async fn borrow_tool(state: &AppState, conn_id: ConnectionId, quantity: i64) -> anyhow::Result<()> {
    match state.store.borrow(quantity).await {
        Ok(outcome) => {
            info!(
                quantity,
                old = outcome.old_quantity,
                new = outcome.new_quantity,
                status = %outcome.status,
                "tool borrowed"
            );
            let data = serde_json::json!({
                "borrowed_quantity": quantity,
                "remaining_quantity": outcome.new_quantity,
                "status": outcome.status,
                "borrow_time": now_rfc3339(),
            });
            let reply = Envelope::tool_success("borrow_tool", data, "tool borrowed");
            send(state, conn_id, &reply).await;
            broadcast_change(state, outcome.old_quantity, outcome.new_quantity, outcome.status).await;
            record_history(state, RecordAction::Borrow, quantity);
        }
        Err(err) => {
            let reply = Envelope::tool_failure("borrow_tool", err.to_string());
            send(state, conn_id, &reply).await;
        }
    }
    Ok(())
}

async fn return_tool(state: &AppState, conn_id: ConnectionId, quantity: i64) -> anyhow::Result<()> {
    match state.store.give_back(quantity).await {
        Ok(outcome) => {
            info!(
                quantity,
                old = outcome.old_quantity,
                new = outcome.new_quantity,
                status = %outcome.status,
                "tool returned"
            );
            let data = serde_json::json!({
                "returned_quantity": quantity,
                "current_quantity": outcome.new_quantity,
                "status": outcome.status,
                "return_time": now_rfc3339(),
            });
            let reply = Envelope::tool_success("return_tool", data, "tool returned");
            send(state, conn_id, &reply).await;
            broadcast_change(state, outcome.old_quantity, outcome.new_quantity, outcome.status).await;
            record_history(state, RecordAction::Return, quantity);
        }
        Err(err) => {
            let reply = Envelope::tool_failure("return_tool", err.to_string());
            send(state, conn_id, &reply).await;
        }
    }
    Ok(())
}

async fn sensor_update(
    state: &AppState,
    conn_id: ConnectionId,
    current_weight: Option<f64>,
) -> anyhow::Result<()> {
    let Some(weight) = current_weight else {
        let reply = Envelope::tool_failure("sensor_update", "missing current_weight");
        send(state, conn_id, &reply).await;
        return Ok(());
    };
    match state.store.apply_sensor_reading(weight).await {
        Ok(outcome) => {
            info!(
                weight,
                estimated = outcome.estimated_quantity,
                old = outcome.old_quantity,
                new = outcome.new_quantity,
                "sensor reading applied"
            );
            let data = serde_json::json!({
                "current_weight": weight,
                "estimated_quantity": outcome.estimated_quantity,
                "current_quantity": outcome.new_quantity,
                "status": outcome.status,
            });
            let reply = Envelope::tool_success("sensor_update", data, "sensor reading applied");
            send(state, conn_id, &reply).await;
            // Manual actions always notify; sensor drift only when observable.
            if outcome.old_quantity != outcome.new_quantity {
                broadcast_change(state, outcome.old_quantity, outcome.new_quantity, outcome.status)
                    .await;
            }
        }
        Err(err) => {
            let reply = Envelope::tool_failure("sensor_update", err.to_string());
            send(state, conn_id, &reply).await;
        }
    }
    Ok(())
}

async fn send(state: &AppState, conn_id: ConnectionId, envelope: &Envelope) {
    match serde_json::to_string(envelope) {
        Ok(text) => state.registry.send_to(conn_id, text).await,
        Err(err) => error!(connection_id = %conn_id, error = %err, "failed to encode reply"),
    }
}

/// Notify every live connection, the originator included, that the quantity
/// changed.
async fn broadcast_change(
    state: &AppState,
    old_quantity: i64,
    new_quantity: i64,
    status: crate::inventory::ToolStatus,
) {
    let envelope = Envelope::inventory_changed(old_quantity, new_quantity, status);
    match serde_json::to_string(&envelope) {
        Ok(text) => {
            state.registry.broadcast(&text).await;
            state.metrics.broadcasts_total.inc();
        }
        Err(err) => error!(error = %err, "failed to encode broadcast"),
    }
}

/// Best-effort history recording, decoupled from the reply path. The reply and
/// broadcast have already been queued; a failure here is logged and counted,
/// never surfaced to the client and never a reason to revert the commit.
fn record_history(state: &AppState, action: RecordAction, quantity: i64) {
    let history = state.history.clone();
    let metrics = state.metrics.clone();
    tokio::spawn(async move {
        let result = match action {
            RecordAction::Borrow => history.record_borrow(quantity).await,
            RecordAction::Return => history.record_return(quantity).await,
        };
        match result {
            Ok(record_id) => debug!(record_id, quantity, "history record written"),
            Err(err) => {
                metrics.history_record_failures.inc();
                warn!(error = %err, quantity, "failed to record borrow/return history");
            }
        }
    });
}
