//! Correlation store for outbound actions awaiting a result.
//!
//! Each call registers a [`PendingCall`] under its sequence number *before*
//! the request frame is written, so a result that arrives immediately is
//! never missed. The entry is removed exactly once: either by
//! [`ResultStore::resolve`] when the matching result arrives, or when the
//! `PendingCall` is dropped after its wait ends.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::action::ActionResult;
use crate::error::{ApiError, ApiResult};

/// Pending action calls keyed by sequence number.
#[derive(Debug, Default)]
pub struct ResultStore {
    pending: Mutex<HashMap<u64, oneshot::Sender<ActionResult>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending call for `seq`.
    pub fn register(&self, seq: u64) -> PendingCall<'_> {
        let (tx, rx) = oneshot::channel();
        if self.pending.lock().insert(seq, tx).is_some() {
            debug!(seq, "Replaced a stale pending call with the same seq");
        }
        PendingCall {
            store: self,
            seq,
            rx: Some(rx),
        }
    }

    /// Completes the pending call matching `result.echo.seq`.
    ///
    /// Returns `false` when nobody is waiting for that sequence number
    /// (already timed out, or never issued).
    pub fn resolve(&self, result: ActionResult) -> bool {
        let seq = result.echo.seq;
        let Some(tx) = self.pending.lock().remove(&seq) else {
            debug!(seq, "Dropping result for unknown seq");
            return false;
        };
        trace!(seq, status = %result.status, "Resolved pending call");
        tx.send(result).is_ok()
    }

    /// Feeds a decoded result frame into the store.
    ///
    /// Frames without an integer `echo.seq` are dropped without report.
    pub fn add(&self, payload: Value) -> bool {
        match ActionResult::from_value(payload) {
            Some(result) => self.resolve(result),
            None => false,
        }
    }

    /// Returns `true` if a call with `seq` is still waiting.
    pub fn contains(&self, seq: u64) -> bool {
        self.pending.lock().contains_key(&seq)
    }

    /// Returns the number of calls still waiting.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn remove(&self, seq: u64) {
        self.pending.lock().remove(&seq);
    }
}

/// A registered call waiting for its result.
#[derive(Debug)]
pub struct PendingCall<'a> {
    store: &'a ResultStore,
    seq: u64,
    rx: Option<oneshot::Receiver<ActionResult>>,
}

impl PendingCall<'_> {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Waits for the matching result for at most `limit`.
    ///
    /// On timeout the call fails with [`ApiError::Timeout`] and its entry is
    /// gone from the store by the time this returns.
    pub async fn wait(mut self, limit: Duration) -> ApiResult<ActionResult> {
        let Some(rx) = self.rx.take() else {
            return Err(ApiError::Network("pending call already consumed".to_string()));
        };
        match timeout(limit, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(ApiError::Network("result channel closed".to_string())),
            Err(_) => Err(ApiError::Timeout),
        }
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.store.remove(self.seq);
    }
}
