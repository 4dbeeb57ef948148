//! Bot behaviour settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the message pipeline, command engine and NLP resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Names that address the bot when they start a group message.
    pub nickname: Vec<String>,

    /// Prefixes a command may start with. The longest matching one is used.
    pub command_start: Vec<String>,

    /// Seconds after which an idle command session is discarded.
    pub session_expire_timeout_secs: Option<u64>,

    /// Minimum confidence an intent needs to be dispatched.
    pub nlp_confidence_threshold: f64,

    /// Event names the message pipeline subscribes to.
    pub message_events: Vec<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            nickname: Vec::new(),
            command_start: vec!["/".to_string(), String::new()],
            session_expire_timeout_secs: None,
            nlp_confidence_threshold: 60.0,
            message_events: vec![
                "message.private".to_string(),
                "message.group".to_string(),
                "message.discuss".to_string(),
            ],
        }
    }
}

impl BotConfig {
    pub fn session_expire_timeout(&self) -> Option<Duration> {
        self.session_expire_timeout_secs.map(Duration::from_secs)
    }
}
