//! Inbound event model.
//!
//! Adapters report events as free-form JSON objects. Only `type` and
//! `detail_type` are required; everything else is kept verbatim in an
//! extension map so adapter-specific fields survive untouched.
//!
//! ```rust
//! use anybot_core::Event;
//! use serde_json::json;
//!
//! let event = Event::from_value(json!({
//!     "type": "message",
//!     "detail_type": "private",
//!     "self_id": 10001,
//!     "message": "hello",
//! }))
//! .unwrap();
//!
//! assert_eq!(event.name(), "message.private");
//! assert_eq!(event.self_id().as_deref(), Some("10001"));
//! ```

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{EventError, EventResult};

/// A validated inbound event.
#[derive(Clone, PartialEq)]
pub struct Event {
    event_type: String,
    detail_type: String,
    /// Every payload field except the two required ones.
    fields: Map<String, Value>,
    /// Set on events re-injected after a command switch.
    redispatched: bool,
}

impl Event {
    /// Builds an event from a decoded payload object.
    ///
    /// Fails with [`EventError::Malformed`] when `type` or `detail_type` is
    /// absent or not a string.
    pub fn from_payload(mut payload: Map<String, Value>) -> EventResult<Self> {
        let event_type = take_string(&mut payload, "type")?;
        let detail_type = take_string(&mut payload, "detail_type")?;
        Ok(Self {
            event_type,
            detail_type,
            fields: payload,
            redispatched: false,
        })
    }

    /// Builds an event from any JSON value; non-objects are malformed.
    pub fn from_value(value: Value) -> EventResult<Self> {
        match value {
            Value::Object(map) => Self::from_payload(map),
            _ => Err(EventError::Malformed("type")),
        }
    }

    /// The `type` field.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The `detail_type` field.
    pub fn detail_type(&self) -> &str {
        &self.detail_type
    }

    /// The bus name of this event, `"{type}.{detail_type}"`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.event_type, self.detail_type)
    }

    /// The reporting adapter id. Integers are rendered as strings.
    pub fn self_id(&self) -> Option<String> {
        match self.fields.get("self_id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn message_id(&self) -> Option<&Value> {
        self.fields.get("message_id")
    }

    pub fn message(&self) -> Option<&Value> {
        self.fields.get("message")
    }

    pub fn set_message(&mut self, message: Value) {
        self.fields.insert("message".to_string(), message);
    }

    /// Whether the event is addressed to the bot.
    pub fn to_me(&self) -> bool {
        self.fields
            .get("to_me")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_to_me(&mut self, to_me: bool) {
        self.fields.insert("to_me".to_string(), Value::Bool(to_me));
    }

    /// Looks up an extension field. `type` and `detail_type` are not part of
    /// the extension map; use the dedicated accessors for them.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Inserts or replaces an extension field.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Removes an extension field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// All extension fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Rebuilds the full payload object, required fields included.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = self.fields.clone();
        payload.insert("type".to_string(), Value::String(self.event_type.clone()));
        payload.insert(
            "detail_type".to_string(),
            Value::String(self.detail_type.clone()),
        );
        payload
    }

    /// Returns a copy of this event carrying `message`, marked as addressed
    /// to the bot and as re-injected.
    pub fn redispatch(&self, message: Value) -> Self {
        let mut event = self.clone();
        event.set_message(message);
        event.set_to_me(true);
        event.redispatched = true;
        event
    }

    /// Whether this event was re-injected by a command switch.
    pub fn is_redispatched(&self) -> bool {
        self.redispatched
    }
}

fn take_string(payload: &mut Map<String, Value>, key: &'static str) -> EventResult<String> {
    match payload.remove(key) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(EventError::Malformed(key)),
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name())
            .field("self_id", &self.self_id())
            .field("message_id", &self.message_id())
            .finish_non_exhaustive()
    }
}
