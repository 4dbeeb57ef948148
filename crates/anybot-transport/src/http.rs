//! HTTP webhook ingestion.

use std::sync::Arc;

use anybot_core::Gateway;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth;
use crate::server::{X_SELF_ID, header_str};

const X_SIGNATURE: &str = "x-signature";

/// Handles `POST /` event reports.
///
/// Answers `204` when no handler produced a quick operation, otherwise `200`
/// with the operation object. The operation is also forwarded to the adapter
/// as an action in the background.
pub(crate) async fn post_event(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = gateway.config().secret.as_deref()
        && let Err(err) = auth::verify_signature(secret, &body, header_str(&headers, X_SIGNATURE))
    {
        warn!(error = %err, "Rejected webhook: signature check failed");
        return auth::rejection_status(&err).into_response();
    }

    let payload = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(payload)) => payload,
        _ => {
            debug!(len = body.len(), "Rejected webhook: body is not a JSON object");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    if let Some(self_id) = header_str(&headers, X_SELF_ID)
        && gateway.registry().contains(self_id)
    {
        warn!(
            self_id,
            "Adapter also holds a reverse WebSocket connection; the event may be handled twice"
        );
    }

    match gateway.handle_event(payload.clone()).await {
        Some(operation) => {
            let background = Arc::clone(&gateway);
            let forwarded = operation.clone();
            tokio::spawn(async move {
                background.handle_quick_operation(payload, forwarded).await;
            });
            (StatusCode::OK, Json(operation)).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
