//! Message helpers and the hooks around message handling.
//!
//! Messages are shipped as adapter JSON: either a plain string or an array of
//! segments such as `{"type": "text", "data": {"text": "hi"}}`. Only the text
//! content is interpreted here; other segments pass through untouched.

use std::sync::Arc;

use anybot_core::{ApiResult, Event, Gateway};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/// Extracts the text content of a message.
///
/// Strings are returned as-is and text segments are concatenated; anything
/// else renders as an empty string.
pub fn plain_text(message: &Value) -> String {
    match message {
        Value::String(text) => text.clone(),
        Value::Array(segments) => segments
            .iter()
            .filter(|segment| segment["type"] == "text")
            .filter_map(|segment| segment["data"]["text"].as_str())
            .collect(),
        _ => String::new(),
    }
}

/// Appends `text` to a message, as a new text segment for segment arrays.
pub fn append_text(message: &mut Value, text: &str) {
    match message {
        Value::String(existing) => existing.push_str(text),
        Value::Array(segments) => segments.push(json!({"type": "text", "data": {"text": text}})),
        other => *other = Value::String(text.to_string()),
    }
}

/// Runs on every message event before command and NLP resolution.
#[async_trait]
pub trait BeforeHandleMessage: Send + Sync {
    async fn before_handle(&self, gateway: &Gateway, event: &mut Event);
}

/// Runs on every outgoing reply before it is sent.
#[async_trait]
pub trait BeforeSendMessage: Send + Sync {
    async fn before_send(&self, event: &Event, message: &mut Value);
}

/// Sends replies through the `before_send_message` hooks.
#[derive(Clone)]
pub struct MessageSender {
    gateway: Arc<Gateway>,
    hooks: Arc<[Arc<dyn BeforeSendMessage>]>,
}

impl MessageSender {
    pub(crate) fn new(gateway: Arc<Gateway>, hooks: Vec<Arc<dyn BeforeSendMessage>>) -> Self {
        Self {
            gateway,
            hooks: hooks.into(),
        }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Replies to `event`, propagating action errors.
    pub async fn try_send(&self, event: &Event, message: Value) -> ApiResult<Value> {
        let mut message = message;
        for hook in self.hooks.iter() {
            hook.before_send(event, &mut message).await;
        }
        self.gateway.send(event, message, Map::new()).await
    }

    /// Replies to `event`; failures are logged and discarded.
    pub async fn send(&self, event: &Event, message: Value) -> Option<Value> {
        match self.try_send(event, message).await {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(error = %err, self_id = ?event.self_id(), "Failed to send reply");
                None
            }
        }
    }
}

/// Detects and strips a leading nickname in the first text of a message.
#[derive(Debug, Clone)]
pub(crate) struct NicknameMatcher {
    pattern: Regex,
}

impl NicknameMatcher {
    /// Returns `None` when no non-empty nickname is configured.
    pub(crate) fn new(nicknames: &[String]) -> Option<Self> {
        let alternatives: Vec<String> = nicknames
            .iter()
            .filter(|name| !name.is_empty())
            .map(|name| regex::escape(name))
            .collect();
        if alternatives.is_empty() {
            return None;
        }
        let pattern = format!(r"(?i)^({})[\s,，]*", alternatives.join("|"));
        match Regex::new(&pattern) {
            Ok(pattern) => Some(Self { pattern }),
            Err(err) => {
                warn!(error = %err, "Invalid nickname pattern, nickname calls disabled");
                None
            }
        }
    }

    /// Strips the nickname from the start of the message's first text.
    ///
    /// Returns `true` if the message addressed the bot by nickname.
    pub(crate) fn strip(&self, message: &mut Value) -> bool {
        let text = match message {
            Value::String(text) => text,
            Value::Array(segments) => {
                let Some(first) = segments.first_mut() else {
                    return false;
                };
                if first["type"] != "text" {
                    return false;
                }
                match first.pointer_mut("/data/text") {
                    Some(Value::String(text)) => text,
                    _ => return false,
                }
            }
            _ => return false,
        };

        let Some(found) = self.pattern.find(text) else {
            return false;
        };
        debug!(nickname = %found.as_str().trim(), "Message calls the bot by nickname");
        let end = found.end();
        text.replace_range(..end, "");
        true
    }
}
