//! Router construction and the serve loop.
//!
//! One listener carries both ingestion paths:
//!
//! ```text
//! 127.0.0.1:8080
//! ├── POST /          → webhook events
//! ├── GET  /ws[/]     → reverse WebSocket
//! ├── GET  /ws/event[/]
//! └── GET  /ws/api[/]
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use anybot_core::Gateway;
use axum::{
    Router,
    http::HeaderMap,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{http, ws};

/// Header carrying the reporting adapter id.
pub(crate) const X_SELF_ID: &str = "x-self-id";

/// Reverse WebSocket paths served when none are configured.
pub const DEFAULT_WS_PATHS: [&str; 3] = ["/ws", "/ws/event", "/ws/api"];

/// Builds the ingestion router for `gateway`.
///
/// Every WebSocket path is served with and without a trailing slash.
pub fn build_router<S: AsRef<str>>(gateway: Arc<Gateway>, ws_paths: &[S]) -> Router {
    let mut ws_routes = BTreeSet::new();
    for path in ws_paths {
        let base = normalize_path(path.as_ref());
        if base != "/" {
            ws_routes.insert(format!("{base}/"));
        }
        ws_routes.insert(base);
    }

    let root = if ws_routes.remove("/") {
        post(http::post_event).get(ws::ws_upgrade)
    } else {
        post(http::post_event)
    };

    let mut router = Router::new().route("/", root);
    for path in &ws_routes {
        router = router.route(path, get(ws::ws_upgrade));
    }
    router.with_state(gateway)
}

/// Serves `router` on `listener` until `shutdown` is cancelled, then drains
/// open connections.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!(addr = %addr, "Gateway stopped");
    Ok(())
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{trimmed}")
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
