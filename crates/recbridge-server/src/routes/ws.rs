//! WebSocket fan-out endpoint
//!
//! One socket per connection; a user may hold several. Client messages:
//! `subscribe`, `unsubscribe`, `ping`, `subscribe_model`,
//! `unsubscribe_model`. Server messages: `status`, `error`, `pong`, plus
//! the fan-out types (`notification`, `model_update`, `critical_event`).

use std::str::FromStr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use recbridge_core::domain::newtypes::{TenantId, UserId};

use crate::state::AppState;

/// `GET /ws/{user_id}` - upgrade to the fan-out channel
pub async fn upgrade(
    ws: WebSocketUpgrade,
    Path(user_id): Path<i64>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, UserId::new(user_id), state))
}

async fn handle_socket(socket: WebSocket, user_id: UserId, state: AppState) {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Value>();
    let connection_id = state.fanout.attach(user_id, outbound_tx);

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else { break };
                if sink.send(Message::Text(message.to_string().into())).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_message(&state, user_id, text.as_str());
                        if sink.send(Message::Text(reply.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(user = %user_id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }

    state.fanout.detach(user_id, connection_id);
}

/// Dispatch one client message, producing the reply
fn handle_client_message(state: &AppState, user_id: UserId, raw: &str) -> Value {
    let message: Value = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(_) => return json!({"type": "error", "message": "Invalid JSON"}),
    };

    match message.get("type").and_then(Value::as_str) {
        Some("subscribe") => match message.get("channel").and_then(Value::as_str) {
            Some(channel) => {
                state.fanout.subscribe_channel(user_id, channel);
                json!({
                    "type": "status",
                    "message": format!("Subscribed to {channel}"),
                    "channel": channel,
                })
            }
            None => json!({"type": "error", "message": "channel is required"}),
        },
        Some("unsubscribe") => match message.get("channel").and_then(Value::as_str) {
            Some(channel) => {
                state.fanout.unsubscribe_channel(user_id, channel);
                json!({
                    "type": "status",
                    "message": format!("Unsubscribed from {channel}"),
                    "channel": channel,
                })
            }
            None => json!({"type": "error", "message": "channel is required"}),
        },
        Some("ping") => json!({
            "type": "pong",
            "timestamp": message.get("timestamp").cloned().unwrap_or(Value::Null),
        }),
        Some("subscribe_model") => match model_subscription(&message) {
            Ok((tenant, model, record_ids)) => {
                state
                    .fanout
                    .subscribe_records(user_id, tenant, &model, &record_ids);
                debug!(user = %user_id, model, "Model subscription added");
                json!({
                    "type": "status",
                    "message": format!("Subscribed to {model} records"),
                    "model": model,
                    "record_ids": record_ids,
                })
            }
            Err(message) => json!({"type": "error", "message": message}),
        },
        Some("unsubscribe_model") => match model_subscription(&message) {
            Ok((tenant, model, record_ids)) => {
                state
                    .fanout
                    .unsubscribe_records(user_id, tenant, &model, &record_ids);
                json!({
                    "type": "status",
                    "message": format!("Unsubscribed from {model} records"),
                    "model": model,
                    "record_ids": record_ids,
                })
            }
            Err(message) => json!({"type": "error", "message": message}),
        },
        Some(other) => json!({
            "type": "error",
            "message": format!("Unknown message type: {other}"),
        }),
        None => json!({"type": "error", "message": "type is required"}),
    }
}

/// Extract (tenant, model, record ids) from a model-subscription message
fn model_subscription(message: &Value) -> Result<(TenantId, String, Vec<i64>), String> {
    let tenant = message
        .get("tenant_id")
        .and_then(Value::as_str)
        .ok_or("tenant_id is required")
        .and_then(|raw| TenantId::from_str(raw).map_err(|_| "malformed tenant_id"))
        .map_err(str::to_string)?;

    let model = message
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| "model is required".to_string())?
        .to_string();

    let record_ids: Vec<i64> = message
        .get("record_ids")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();

    if record_ids.is_empty() {
        return Err("record_ids is required".to_string());
    }

    Ok((tenant, model, record_ids))
}
