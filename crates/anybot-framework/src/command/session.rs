//! Per-conversation command state carried across activations.

use std::sync::Arc;
use std::time::Duration;

use anybot_core::{ApiResult, Event, Gateway};
use serde_json::Value;
use tokio::time::Instant;

use super::{CommandArgs, Interrupt};
use crate::message::MessageSender;

/// The state of one command conversation.
///
/// A session lives across activations while its command keeps asking for
/// input. Each activation re-runs the command body from the top; values the
/// user already supplied are found in [`state`](Self::state).
pub struct CommandSession {
    sender: MessageSender,
    event: Event,
    command: String,
    state: CommandArgs,
    current_key: Option<String>,
    current_arg: String,
    first_run: bool,
    last_interaction: Instant,
}

impl CommandSession {
    pub(crate) fn new(
        sender: MessageSender,
        event: Event,
        command: impl Into<String>,
        args: CommandArgs,
        current_arg: String,
    ) -> Self {
        Self {
            sender,
            event,
            command: command.into(),
            state: args,
            current_key: None,
            current_arg,
            first_run: true,
            last_interaction: Instant::now(),
        }
    }

    /// The event of the current activation.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Name of the command this session runs.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        self.sender.gateway()
    }

    /// Text after the command word on the first run, the whole message text
    /// afterwards.
    pub fn current_arg(&self) -> &str {
        &self.current_arg
    }

    pub fn is_first_run(&self) -> bool {
        self.first_run
    }

    /// The key the last prompt asked for.
    pub fn current_key(&self) -> Option<&str> {
        self.current_key.as_deref()
    }

    pub fn state(&self) -> &CommandArgs {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut CommandArgs {
        &mut self.state
    }

    /// Returns `state[key]`, or asks the user for it.
    ///
    /// A missing key ends the activation with [`Interrupt::AwaitInput`]; the
    /// answer lands in `state[key]` on the next activation unless the args
    /// parser stores it first.
    pub fn get(&mut self, key: &str, prompt: Option<&str>) -> Result<Value, Interrupt> {
        if let Some(value) = self.state.get(key) {
            return Ok(value.clone());
        }
        self.current_key = Some(key.to_string());
        Err(Interrupt::AwaitInput(prompt.map(Value::from)))
    }

    /// Replies in the session's conversation; failures are logged.
    pub async fn send(&self, message: impl Into<Value>) -> Option<Value> {
        self.sender.send(&self.event, message.into()).await
    }

    pub async fn try_send(&self, message: impl Into<Value>) -> ApiResult<Value> {
        self.sender.try_send(&self.event, message.into()).await
    }

    /// Stores the pending answer under the prompted key if the parser did not.
    pub(crate) fn fill_current_key(&mut self) {
        if self.first_run {
            return;
        }
        if let Some(key) = &self.current_key
            && !self.state.contains_key(key)
        {
            self.state
                .insert(key.clone(), Value::String(self.current_arg.clone()));
        }
    }

    /// Prepares a stored session for the next message.
    pub(crate) fn refresh(&mut self, event: Event, current_arg: String) {
        self.event = event;
        self.current_arg = current_arg;
        self.first_run = false;
    }

    pub(crate) fn touch(&mut self) {
        self.last_interaction = Instant::now();
    }

    pub(crate) fn is_expired(&self, timeout: Option<Duration>) -> bool {
        timeout.is_some_and(|timeout| self.last_interaction.elapsed() > timeout)
    }
}
