//! The gateway context object.
//!
//! A [`Gateway`] owns everything shared between the transports and handler
//! code: the event bus, the adapter connection registry, the correlation
//! store for outbound actions and the sequence generator. It is created
//! once per process, wrapped in an `Arc` and handed to every component.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{Instrument, debug, debug_span, info};

use crate::action::{ActionRequest, SequenceGenerator};
use crate::bus::EventBus;
use crate::context;
use crate::error::{ApiError, ApiResult};
use crate::event::Event;
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::store::ResultStore;

/// Action invoked to apply a handler's quick-operation result.
pub const QUICK_OPERATION_ACTION: &str = ".handle_quick_operation_async";

/// Payload fields stripped from the context sent with a quick operation.
const QUICK_OPERATION_STRIPPED: [&str; 4] = ["message", "raw_message", "comment", "sender"];

/// Event fields copied into `send_msg` parameters.
const SEND_CONTEXT_KEYS: [&str; 5] = [
    "message_type",
    "user_id",
    "group_id",
    "discuss_id",
    "auto_escape",
];

// =============================================================================
// Configuration
// =============================================================================

/// Gateway settings shared by every transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Token required on reverse WebSocket handshakes.
    pub access_token: Option<String>,
    /// HMAC key required to sign HTTP webhook bodies.
    pub secret: Option<String>,
    /// Seconds to wait for an action result.
    pub api_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            secret: None,
            api_timeout_secs: 60,
        }
    }
}

impl GatewayConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Process-wide gateway state.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    bus: EventBus,
    registry: ConnectionRegistry,
    results: ResultStore,
    sequence: SequenceGenerator,
    runtime: OnceLock<Handle>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            bus: EventBus::new(),
            registry: ConnectionRegistry::new(),
            results: ResultStore::new(),
            sequence: SequenceGenerator::new(),
            runtime: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    /// Records the runtime that [`SyncApi`] schedules calls onto.
    ///
    /// Only the first attached handle is kept; returns `false` on later calls.
    pub fn attach_runtime(&self, handle: Handle) -> bool {
        self.runtime.set(handle).is_ok()
    }

    pub fn runtime_handle(&self) -> Option<&Handle> {
        self.runtime.get()
    }

    /// Returns the blocking facade over [`Gateway::call_action`].
    ///
    /// Fails with [`ApiError::Timing`] until a runtime has been attached.
    pub fn sync_api(self: &Arc<Self>) -> ApiResult<SyncApi> {
        let handle = self.runtime.get().cloned().ok_or_else(|| {
            ApiError::Timing("the gateway runtime has not been started yet".to_string())
        })?;
        Ok(SyncApi {
            gateway: Arc::clone(self),
            handle,
        })
    }

    // -------------------------------------------------------------------------
    // Outbound actions
    // -------------------------------------------------------------------------

    /// Calls `action` on an adapter and waits for its result data.
    ///
    /// `params` must be a JSON object or null.
    pub async fn call_action(&self, action: &str, params: Value) -> ApiResult<Value> {
        self.call_action_with_timeout(action, params, self.config.api_timeout())
            .await
    }

    /// Like [`Gateway::call_action`] with an explicit deadline.
    pub async fn call_action_with_timeout(
        &self,
        action: &str,
        params: Value,
        limit: Duration,
    ) -> ApiResult<Value> {
        let params = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ApiError::Serialization(format!(
                    "action params must be an object, got {other}"
                )));
            }
        };

        let connection = self.route(&params)?;
        let seq = self.sequence.next();
        let frame = serde_json::to_string(&ActionRequest::new(action, params, seq))?;

        debug!(action, seq, adapter_id = %connection.adapter_id(), "Calling action");

        let pending = self.results.register(seq);
        connection.send_text(frame).await?;
        let result = pending.wait(limit).await?;

        if result.is_failed() {
            return Err(ApiError::ActionFailed {
                retcode: result.retcode.unwrap_or_default(),
            });
        }
        Ok(result.data)
    }

    /// Picks the connection an action goes to.
    ///
    /// An explicit `self_id` in the params is final; otherwise the adapter of
    /// the event being handled is used if still connected, then the only
    /// connected adapter.
    fn route(&self, params: &Map<String, Value>) -> ApiResult<ConnectionHandle> {
        if let Some(self_id) = params.get("self_id").and_then(truthy_id) {
            return self.registry.get(&self_id).ok_or(ApiError::NotAvailable);
        }

        if let Some(connection) = context::current_adapter().and_then(|id| self.registry.get(&id))
        {
            return Ok(connection);
        }

        self.registry.sole().ok_or(ApiError::NotAvailable)
    }

    /// Replies to `event` with `message` through `send_msg`.
    ///
    /// The conversation target is taken from the event and `extra` entries
    /// override it. A missing `message_type` is inferred from the target ids.
    pub async fn send(
        &self,
        event: &Event,
        message: Value,
        extra: Map<String, Value>,
    ) -> ApiResult<Value> {
        let mut params = Map::new();
        for key in SEND_CONTEXT_KEYS {
            if let Some(value) = event.get(key) {
                params.insert(key.to_string(), value.clone());
            }
        }

        params.insert("message".to_string(), message);
        params.extend(extra);

        if !params.contains_key("message_type") {
            let message_type = if params.contains_key("group_id") {
                Some("group")
            } else if params.contains_key("discuss_id") {
                Some("discuss")
            } else if params.contains_key("user_id") {
                Some("private")
            } else {
                None
            };
            if let Some(message_type) = message_type {
                params.insert("message_type".to_string(), json!(message_type));
            }
        }

        self.call_action("send_msg", Value::Object(params)).await
    }

    // -------------------------------------------------------------------------
    // Inbound events
    // -------------------------------------------------------------------------

    /// Emits `event` on the bus and returns the first handler result.
    pub async fn dispatch(&self, event: &Event) -> Option<Value> {
        let name = event.name();
        let span = debug_span!("dispatch", event = %name, self_id = ?event.self_id());
        async { self.bus.emit(&name, event).await.into_iter().next() }
            .instrument(span)
            .await
    }

    /// Validates a decoded payload and dispatches it.
    ///
    /// Malformed payloads are dropped. Returns the handler result only when
    /// it is a quick-operation object.
    pub async fn handle_event(&self, payload: Map<String, Value>) -> Option<Value> {
        let event = match Event::from_payload(payload) {
            Ok(event) => event,
            Err(err) => {
                debug!(error = %err, "Dropping malformed event");
                return None;
            }
        };

        info!(event = %event.name(), self_id = ?event.self_id(), "Received event");
        self.dispatch(&event).await.filter(Value::is_object)
    }

    /// Asks the adapter to apply a handler's quick operation.
    ///
    /// Failures are logged and swallowed.
    pub async fn handle_quick_operation(&self, payload: Map<String, Value>, operation: Value) {
        let self_id = payload.get("self_id").cloned().unwrap_or(Value::Null);
        let mut context = payload;
        for key in QUICK_OPERATION_STRIPPED {
            context.remove(key);
        }

        let params = json!({
            "self_id": self_id,
            "context": context,
            "operation": operation,
        });
        if let Err(err) = self.call_action(QUICK_OPERATION_ACTION, params).await {
            debug!(error = %err, "Quick operation failed");
        }
    }
}

/// Interprets a `self_id` param, ignoring falsy values.
fn truthy_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

// =============================================================================
// Blocking facade
// =============================================================================

/// Blocking access to [`Gateway::call_action`] for non-async code.
///
/// Calls are spawned onto the gateway's runtime and the calling thread waits
/// for them. Calls made from inside a runtime fail with [`ApiError::Timing`].
#[derive(Debug, Clone)]
pub struct SyncApi {
    gateway: Arc<Gateway>,
    handle: Handle,
}

impl SyncApi {
    pub fn call_action(&self, action: &str, params: Value) -> ApiResult<Value> {
        if Handle::try_current().is_ok() {
            return Err(ApiError::Timing(
                "the blocking API cannot be called from inside a runtime".to_string(),
            ));
        }
        let (tx, rx) = oneshot::channel();
        let gateway = Arc::clone(&self.gateway);
        let action = action.to_string();
        self.handle.spawn(async move {
            let _ = tx.send(gateway.call_action(&action, params).await);
        });
        rx.blocking_recv()
            .map_err(|_| ApiError::Network("runtime shut down before the call finished".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FnHandler;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use tokio::sync::mpsc;

    type Frames = Arc<Mutex<Vec<Value>>>;

    /// Connects a fake adapter that records every request frame and answers
    /// it with `reply(request)` plus the request's echo.
    fn connect_adapter<F>(gateway: &Arc<Gateway>, adapter_id: &str, reply: F) -> Frames
    where
        F: Fn(&Value) -> Value + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<String>(64);
        gateway
            .registry()
            .register(ConnectionHandle::new(adapter_id, tx));

        let frames: Frames = Arc::default();
        let recorded = Arc::clone(&frames);
        let gateway = Arc::clone(gateway);
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                let request: Value = serde_json::from_str(&text).unwrap();
                let mut result = reply(&request);
                result["echo"] = request["echo"].clone();
                recorded.lock().push(request);
                gateway.results().add(result);
            }
        });
        frames
    }

    fn ok(data: Value) -> Value {
        json!({"status": "ok", "retcode": 0, "data": data})
    }

    fn gateway() -> Arc<Gateway> {
        Arc::new(Gateway::new(GatewayConfig::default()))
    }

    #[tokio::test]
    async fn test_no_route_without_adapters() {
        let gateway = gateway();
        let err = gateway.call_action("get_status", Value::Null).await.unwrap_err();
        assert_eq!(err, ApiError::NotAvailable);
    }

    #[tokio::test]
    async fn test_no_route_with_two_adapters_and_no_context() {
        let gateway = gateway();
        connect_adapter(&gateway, "a", |_| ok(Value::Null));
        connect_adapter(&gateway, "b", |_| ok(Value::Null));

        let err = gateway.call_action("get_status", Value::Null).await.unwrap_err();
        assert_eq!(err, ApiError::NotAvailable);
    }

    #[tokio::test]
    async fn test_sole_adapter_receives_call() {
        let gateway = gateway();
        let frames = connect_adapter(&gateway, "10001", |_| ok(json!({"message_id": 1})));

        let data = gateway
            .call_action("send_msg", json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(data, json!({"message_id": 1}));

        let frames = frames.lock();
        assert_eq!(frames[0]["action"], json!("send_msg"));
        assert_eq!(frames[0]["params"]["message"], json!("hi"));
        assert!(frames[0]["echo"]["seq"].is_u64());
        assert_eq!(gateway.results().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_self_id_does_not_fall_through() {
        let gateway = gateway();
        connect_adapter(&gateway, "10001", |_| ok(Value::Null));

        let err = gateway
            .call_action("get_status", json!({"self_id": 20002}))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::NotAvailable);

        // Integer ids match their string registration.
        let data = gateway
            .call_action("get_status", json!({"self_id": 10001}))
            .await
            .unwrap();
        assert_eq!(data, Value::Null);
    }

    #[tokio::test]
    async fn test_event_context_routes_to_originating_adapter() {
        let gateway = gateway();
        let a = connect_adapter(&gateway, "a", |_| ok(json!("from a")));
        let b = connect_adapter(&gateway, "b", |_| ok(json!("from b")));

        let data = context::scope("b", gateway.call_action("get_status", Value::Null))
            .await
            .unwrap();
        assert_eq!(data, json!("from b"));
        assert!(a.lock().is_empty());
        assert_eq!(b.lock().len(), 1);

        // A context adapter that is gone falls back to the sole adapter rule.
        let err = context::scope("gone", gateway.call_action("get_status", Value::Null))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::NotAvailable);
    }

    #[tokio::test]
    async fn test_failed_result_carries_retcode() {
        let gateway = gateway();
        connect_adapter(&gateway, "a", |_| {
            json!({"status": "failed", "retcode": 100, "data": {"ignored": true}})
        });

        let err = gateway.call_action("send_msg", Value::Null).await.unwrap_err();
        assert_eq!(err, ApiError::ActionFailed { retcode: 100 });
        assert_eq!(err.retcode(), Some(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_call_times_out() {
        let gateway = gateway();
        let (tx, _rx) = mpsc::channel::<String>(8);
        gateway.registry().register(ConnectionHandle::new("a", tx));

        let started = tokio::time::Instant::now();
        let err = gateway.call_action("send_msg", Value::Null).await.unwrap_err();
        assert_eq!(err, ApiError::Timeout);
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(gateway.results().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_connection_is_network_error() {
        let gateway = gateway();
        let (tx, rx) = mpsc::channel::<String>(8);
        drop(rx);
        gateway.registry().register(ConnectionHandle::new("a", tx));

        let err = gateway.call_action("send_msg", Value::Null).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(gateway.results().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_non_object_params_rejected() {
        let gateway = gateway();
        connect_adapter(&gateway, "a", |_| ok(Value::Null));
        let err = gateway.call_action("send_msg", json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, ApiError::Serialization(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_get_distinct_seqs() {
        let gateway = gateway();
        let frames = connect_adapter(&gateway, "a", |request| ok(request["params"]["n"].clone()));

        let calls = (0..100).map(|n| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.call_action("echo", json!({"n": n})).await })
        });
        let results = futures::future::join_all(calls).await;
        for (n, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap().unwrap(), json!(n));
        }

        let seqs: HashSet<u64> = frames
            .lock()
            .iter()
            .map(|frame| frame["echo"]["seq"].as_u64().unwrap())
            .collect();
        assert_eq!(seqs.len(), 100);
    }

    #[tokio::test]
    async fn test_send_infers_message_type() {
        let gateway = gateway();
        let frames = connect_adapter(&gateway, "10001", |_| ok(Value::Null));

        let event = Event::from_value(json!({
            "type": "message",
            "detail_type": "group",
            "self_id": 10001,
            "group_id": 123,
            "user_id": 7,
        }))
        .unwrap();
        gateway
            .send(&event, json!("hello"), Map::new())
            .await
            .unwrap();

        let private = Event::from_value(json!({
            "type": "message",
            "detail_type": "private",
            "user_id": 7,
        }))
        .unwrap();
        let mut extra = Map::new();
        extra.insert("auto_escape".to_string(), json!(true));
        gateway.send(&private, json!("hi"), extra).await.unwrap();

        let frames = frames.lock();
        assert_eq!(frames[0]["action"], json!("send_msg"));
        assert_eq!(frames[0]["params"]["message_type"], json!("group"));
        assert_eq!(frames[0]["params"]["group_id"], json!(123));
        assert_eq!(frames[0]["params"]["message"], json!("hello"));
        assert_eq!(frames[1]["params"]["message_type"], json!("private"));
        assert_eq!(frames[1]["params"]["auto_escape"], json!(true));
    }

    #[tokio::test]
    async fn test_handle_event_returns_first_object_result() {
        let gateway = gateway();
        gateway.bus().subscribe(
            "message.group",
            Arc::new(FnHandler::new(|_| async { None })),
        );
        gateway.bus().subscribe(
            "message.group",
            Arc::new(FnHandler::new(|_| async { Some(json!({"reply": "A"})) })),
        );
        gateway.bus().subscribe(
            "message.group",
            Arc::new(FnHandler::new(|_| async { Some(json!({"reply": "B"})) })),
        );

        let payload = json!({"type": "message", "detail_type": "group"});
        let result = gateway
            .handle_event(payload.as_object().cloned().unwrap())
            .await;
        assert_eq!(result, Some(json!({"reply": "A"})));
    }

    #[tokio::test]
    async fn test_handle_event_drops_malformed_payload() {
        let gateway = gateway();
        let payload = json!({"detail_type": "group"});
        assert_eq!(
            gateway
                .handle_event(payload.as_object().cloned().unwrap())
                .await,
            None
        );
    }

    #[tokio::test]
    async fn test_quick_operation_strips_message_fields() {
        let gateway = gateway();
        let frames = connect_adapter(&gateway, "10001", |_| ok(Value::Null));

        let payload = json!({
            "type": "message",
            "detail_type": "private",
            "self_id": 10001,
            "user_id": 7,
            "message": "hi",
            "raw_message": "hi",
            "sender": {"nickname": "x"},
        });
        gateway
            .handle_quick_operation(payload.as_object().cloned().unwrap(), json!({"reply": "yo"}))
            .await;

        let frames = frames.lock();
        assert_eq!(frames[0]["action"], json!(QUICK_OPERATION_ACTION));
        let params = &frames[0]["params"];
        assert_eq!(params["self_id"], json!(10001));
        assert_eq!(params["operation"], json!({"reply": "yo"}));
        assert_eq!(params["context"]["user_id"], json!(7));
        assert!(params["context"].get("message").is_none());
        assert!(params["context"].get("raw_message").is_none());
        assert!(params["context"].get("sender").is_none());
    }

    #[tokio::test]
    async fn test_quick_operation_swallows_errors() {
        let gateway = gateway();
        gateway
            .handle_quick_operation(Map::new(), json!({"reply": "nobody listens"}))
            .await;
    }

    #[test]
    fn test_sync_api_requires_runtime() {
        let gateway = gateway();
        let err = gateway.sync_api().unwrap_err();
        assert!(matches!(err, ApiError::Timing(_)));
    }

    #[test]
    fn test_sync_api_blocks_on_attached_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let gateway = gateway();
        assert!(gateway.attach_runtime(runtime.handle().clone()));
        assert!(!gateway.attach_runtime(runtime.handle().clone()));

        runtime.block_on(async {
            connect_adapter(&gateway, "a", |_| ok(json!("pong")));
        });

        let api = gateway.sync_api().unwrap();
        let data = std::thread::spawn(move || api.call_action("ping", Value::Null))
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(data, json!("pong"));
    }

    #[tokio::test]
    async fn test_sync_api_rejects_calls_from_runtime_threads() {
        let gateway = gateway();
        gateway.attach_runtime(Handle::current());
        connect_adapter(&gateway, "a", |_| ok(json!("pong")));

        let api = gateway.sync_api().unwrap();
        let err = api.call_action("ping", Value::Null).unwrap_err();
        assert!(matches!(err, ApiError::Timing(_)));
        assert_eq!(gateway.results().pending_count(), 0);
    }
}
