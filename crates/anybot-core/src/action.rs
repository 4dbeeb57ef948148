//! Outbound action wire types and sequence numbers.
//!
//! An action frame sent to an adapter looks like:
//!
//! ```json
//! {"action": "send_msg", "params": {"message": "hi"}, "echo": {"seq": 12}}
//! ```
//!
//! and the adapter answers on the same connection with
//!
//! ```json
//! {"status": "ok", "retcode": 0, "data": {"message_id": 1}, "echo": {"seq": 12}}
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Largest sequence number handed out before the generator wraps to 1.
pub const MAX_SEQ: u64 = i64::MAX as u64;

/// Correlation token attached to a request and echoed back in its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Echo {
    pub seq: u64,
}

/// An outbound action request frame.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRequest {
    pub action: String,
    pub params: Map<String, Value>,
    pub echo: Echo,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, params: Map<String, Value>, seq: u64) -> Self {
        Self {
            action: action.into(),
            params,
            echo: Echo { seq },
        }
    }
}

/// An action result frame reported by an adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionResult {
    /// `"ok"`, `"async"` or `"failed"`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub retcode: Option<i64>,
    #[serde(default)]
    pub data: Value,
    pub echo: Echo,
}

impl ActionResult {
    /// Whether the adapter rejected the action.
    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }

    /// Parses a decoded frame; anything without an integer `echo.seq` is
    /// not a result frame.
    pub fn from_value(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }
}

/// Monotonic sequence number source.
///
/// Numbers start at 1 and wrap back to 1 after [`MAX_SEQ`]; uniqueness only
/// holds for numbers that are in flight at the same time.
#[derive(Debug)]
pub struct SequenceGenerator {
    next: AtomicU64,
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates a generator whose first number is `seq` (clamped to `1..=MAX_SEQ`).
    pub fn starting_at(seq: u64) -> Self {
        Self {
            next: AtomicU64::new(seq.clamp(1, MAX_SEQ)),
        }
    }

    /// Returns the next sequence number.
    pub fn next(&self) -> u64 {
        let step = |current: u64| Some(if current >= MAX_SEQ { 1 } else { current + 1 });
        match self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, step)
        {
            Ok(previous) | Err(previous) => previous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_sequence_starts_at_one() {
        let generator = SequenceGenerator::new();
        assert_eq!(generator.next(), 1);
        assert_eq!(generator.next(), 2);
        assert_eq!(generator.next(), 3);
    }

    #[test]
    fn test_sequence_wraps_to_one() {
        let generator = SequenceGenerator::starting_at(MAX_SEQ - 1);
        assert_eq!(generator.next(), MAX_SEQ - 1);
        assert_eq!(generator.next(), MAX_SEQ);
        assert_eq!(generator.next(), 1);
    }

    #[test]
    fn test_sequence_distinct_across_threads() {
        let generator = Arc::new(SequenceGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || (0..500).map(|_| generator.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for seq in handle.join().unwrap() {
                assert!(seen.insert(seq), "duplicate seq {seq}");
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn test_request_serializes_with_echo() {
        let mut params = Map::new();
        params.insert("message".to_string(), json!("hi"));
        let request = ActionRequest::new("send_msg", params, 7);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"action": "send_msg", "params": {"message": "hi"}, "echo": {"seq": 7}})
        );
    }

    #[test]
    fn test_result_parsing() {
        let failed = ActionResult::from_value(json!({
            "status": "failed",
            "retcode": 100,
            "data": null,
            "echo": {"seq": 3},
        }))
        .unwrap();
        assert!(failed.is_failed());
        assert_eq!(failed.retcode, Some(100));
        assert_eq!(failed.echo.seq, 3);

        assert!(ActionResult::from_value(json!({"status": "ok"})).is_none());
        assert!(ActionResult::from_value(json!({"echo": {"seq": "3"}})).is_none());
    }
}
