//! Publish/subscribe dispatch of named events.
//!
//! Handlers subscribe to an exact event name such as `message.group`. An
//! emit runs every handler for that name concurrently and collects their
//! non-null results in subscription order.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::trace;

use crate::event::Event;

/// A handler invoked for every event emitted under its subscribed name.
///
/// Returning `None` (or `Some(Value::Null)`) means the handler produced no
/// result for this event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event) -> Option<Value>;
}

/// Adapts an async closure into an [`EventHandler`].
///
/// ```rust
/// use std::sync::Arc;
/// use anybot_core::{EventBus, FnHandler};
/// use serde_json::json;
///
/// let bus = EventBus::new();
/// bus.subscribe(
///     "notice.group_increase",
///     Arc::new(FnHandler::new(|_event| async { Some(json!({"reply": "welcome"})) })),
/// );
/// ```
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Option<Value>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Option<Value>> + Send,
{
    async fn handle(&self, event: Event) -> Option<Value> {
        (self.f)(event).await
    }
}

/// Revocable handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

/// Ordered handler lists keyed by exact event name.
pub struct EventBus {
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscriptions = self.subscriptions.read();
        let counts: HashMap<&str, usize> = subscriptions
            .iter()
            .map(|(name, subs)| (name.as_str(), subs.len()))
            .collect();
        f.debug_struct("EventBus")
            .field("subscriptions", &counts)
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends `handler` to the list for `name`.
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .entry(name.into())
            .or_default()
            .push(Subscription { id, handler });
        id
    }

    /// Removes a subscription. Returns `false` if it was not present.
    pub fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let Some(list) = subscriptions.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|sub| sub.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            subscriptions.remove(name);
        }
        removed
    }

    /// Number of handlers subscribed to `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.subscriptions.read().get(name).map_or(0, Vec::len)
    }

    /// Runs every handler subscribed to `name` and returns their non-null
    /// results in subscription order.
    pub async fn emit(&self, name: &str, event: &Event) -> Vec<Value> {
        let handlers: Vec<Arc<dyn EventHandler>> = match self.subscriptions.read().get(name) {
            Some(list) => list.iter().map(|sub| Arc::clone(&sub.handler)).collect(),
            None => return Vec::new(),
        };
        trace!(event = name, handlers = handlers.len(), "Emitting event");

        join_all(handlers.iter().map(|handler| handler.handle(event.clone())))
            .await
            .into_iter()
            .flatten()
            .filter(|value| !value.is_null())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn event() -> Event {
        Event::from_value(json!({"type": "x", "detail_type": "y"})).unwrap()
    }

    #[tokio::test]
    async fn test_emit_discards_empty_results_in_order() {
        let bus = EventBus::new();
        bus.subscribe("x", Arc::new(FnHandler::new(|_| async { None })));
        bus.subscribe("x", Arc::new(FnHandler::new(|_| async { Some(json!("A")) })));
        bus.subscribe("x", Arc::new(FnHandler::new(|_| async { Some(json!("B")) })));
        bus.subscribe("x", Arc::new(FnHandler::new(|_| async { Some(Value::Null) })));

        let results = bus.emit("x", &event()).await;
        assert_eq!(results, vec![json!("A"), json!("B")]);
        assert_eq!(results.first(), Some(&json!("A")));
    }

    #[tokio::test]
    async fn test_emit_matches_exact_name_only() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        bus.subscribe(
            "message.group",
            Arc::new(FnHandler::new(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    None
                }
            })),
        );

        bus.emit("message", &event()).await;
        bus.emit("message.private", &event()).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        bus.emit("message.group", &event()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_revokes_handler() {
        let bus = EventBus::new();
        let first = bus.subscribe("x", Arc::new(FnHandler::new(|_| async { Some(json!(1)) })));
        bus.subscribe("x", Arc::new(FnHandler::new(|_| async { Some(json!(2)) })));

        assert!(bus.unsubscribe("x", first));
        assert!(!bus.unsubscribe("x", first));
        assert_eq!(bus.subscriber_count("x"), 1);
        assert_eq!(bus.emit("x", &event()).await, vec![json!(2)]);
    }

    #[tokio::test]
    async fn test_handlers_run_concurrently() {
        let bus = EventBus::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let rx = Arc::new(parking_lot::Mutex::new(Some(rx)));
        let tx = Arc::new(parking_lot::Mutex::new(Some(tx)));

        // The first handler waits for a signal only the second one sends.
        bus.subscribe(
            "x",
            Arc::new(FnHandler::new(move |_| {
                let rx = rx.lock().take();
                async move {
                    rx?.await.ok()?;
                    Some(json!("first"))
                }
            })),
        );
        bus.subscribe(
            "x",
            Arc::new(FnHandler::new(move |_| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(());
                }
                async { Some(json!("second")) }
            })),
        );

        let results = bus.emit("x", &event()).await;
        assert_eq!(results, vec![json!("first"), json!("second")]);
    }
}
