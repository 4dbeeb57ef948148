//! Event-handling context.
//!
//! While an event from a connection is being handled, the id of the adapter
//! that delivered it is available to everything running in that task, so
//! actions issued by handlers route back to the originating adapter without
//! naming it.

use std::future::Future;

use tokio::task::JoinHandle;

tokio::task_local! {
    static CURRENT_ADAPTER: String;
}

/// Runs `fut` with `adapter_id` as the current adapter.
pub async fn scope<F: Future>(adapter_id: impl Into<String>, fut: F) -> F::Output {
    CURRENT_ADAPTER.scope(adapter_id.into(), fut).await
}

/// The adapter id of the event being handled, if any.
pub fn current_adapter() -> Option<String> {
    CURRENT_ADAPTER.try_with(Clone::clone).ok()
}

/// Spawns `fut`, carrying the current adapter id into the new task.
///
/// Task-locals are not inherited by `tokio::spawn`.
pub fn spawn_in_context<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current_adapter() {
        Some(adapter_id) => tokio::spawn(CURRENT_ADAPTER.scope(adapter_id, fut)),
        None => tokio::spawn(fut),
    }
}
