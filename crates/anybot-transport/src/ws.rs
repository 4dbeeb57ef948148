//! Reverse WebSocket ingestion.
//!
//! Adapters dial in, identify themselves with `X-Self-ID` and then use one
//! socket in both directions: events and action results flow in, action
//! requests flow out.

use std::sync::Arc;

use anybot_core::{ConnectionHandle, Gateway, context};
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::auth;
use crate::server::{X_SELF_ID, header_str};

/// Outbound frames buffered per connection before senders wait.
const OUTBOUND_BUFFER: usize = 256;

/// Handles a reverse WebSocket handshake.
///
/// Credentials and `X-Self-ID` are checked before the upgrade itself, so a
/// rejected adapter gets a plain HTTP status back.
pub(crate) async fn ws_upgrade(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Some(access_token) = gateway.config().access_token.as_deref()
        && let Err(err) =
            auth::verify_access_token(access_token, header_str(&headers, AUTHORIZATION.as_str()))
    {
        warn!(error = %err, "Rejected WebSocket handshake: authorization failed");
        return auth::rejection_status(&err).into_response();
    }

    let Some(adapter_id) = header_str(&headers, X_SELF_ID).map(str::to_string) else {
        warn!("Rejected WebSocket handshake: missing X-Self-ID");
        return (StatusCode::BAD_REQUEST, "missing X-Self-ID header").into_response();
    };

    match upgrade {
        Ok(upgrade) => upgrade
            .on_upgrade(move |socket| handle_socket(gateway, adapter_id, socket))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

/// Runs one adapter connection until it closes.
async fn handle_socket(gateway: Arc<Gateway>, adapter_id: String, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let connection = ConnectionHandle::new(adapter_id.clone(), tx);
    gateway.registry().register(connection.clone());
    info!(adapter_id = %adapter_id, "Reverse WebSocket connection established");

    // ── Send task: forwards queued action frames to the socket ────────────────
    let send_id = adapter_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                warn!(adapter_id = %send_id, "Failed to send frame, connection closed");
                break;
            }
        }
    });

    // ── Receive loop: events are spawned, results resolve pending calls ───────
    while let Some(frame) = ws_rx.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => decode(text.as_str().as_bytes()),
            Ok(Message::Binary(data)) => decode(&data),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                info!(adapter_id = %adapter_id, "WebSocket connection closed by adapter");
                break;
            }
            Err(e) => {
                warn!(adapter_id = %adapter_id, error = %e, "WebSocket error");
                break;
            }
        };

        let Some(payload) = payload else {
            trace!(adapter_id = %adapter_id, "Ignoring non-object frame");
            continue;
        };

        if payload.contains_key("type") {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(context::scope(adapter_id.clone(), async move {
                if let Some(operation) = gateway.handle_event(payload.clone()).await {
                    gateway.handle_quick_operation(payload, operation).await;
                }
            }));
        } else if !payload.is_empty() {
            gateway.results().add(Value::Object(payload));
        }
    }

    // ── Cleanup ──────────────────────────────────────────────────────────────
    send_task.abort();
    gateway.registry().unregister(&connection);
    debug!(adapter_id = %adapter_id, "Reverse WebSocket connection cleaned up");
}

/// Decodes a frame as a JSON object; anything else is `None`.
fn decode(bytes: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice(bytes) {
        Ok(Value::Object(payload)) => Some(payload),
        _ => None,
    }
}
