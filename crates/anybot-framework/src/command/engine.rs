//! Command resolution and the per-context session slots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anybot_core::Event;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Command, CommandArgs, CommandRegistry, CommandSession, Interrupt};
use crate::message::{MessageSender, plain_text};
use crate::nlp::{NlpResolver, NlpSession};

/// Outcome of offering a message to the command engine.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Dispatch {
    /// No session and no command matched.
    Unhandled,
    Handled,
    /// The session ended by switching to a new message.
    Switched(Value),
}

type Slot = Arc<tokio::sync::Mutex<Option<CommandSession>>>;

/// Resolves commands and keeps one session slot per conversation context.
///
/// An activation holds its context's slot lock until it returns, so messages
/// of one context are processed one at a time in arrival order.
pub(crate) struct CommandEngine {
    commands: CommandRegistry,
    command_start: Vec<String>,
    expire_timeout: Option<Duration>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl CommandEngine {
    pub(crate) fn new(
        commands: CommandRegistry,
        command_start: Vec<String>,
        expire_timeout: Option<Duration>,
    ) -> Self {
        Self {
            commands,
            command_start,
            expire_timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Continues the context's session, or starts the command the message
    /// names, or falls back to the NLP intent.
    ///
    /// The context's slot stays locked through NLP resolution, so a session
    /// started by a later message cannot be replaced by this message's intent.
    pub(crate) async fn handle_message(
        &self,
        event: &Event,
        sender: &MessageSender,
        nlp: &NlpResolver,
    ) -> Dispatch {
        let context_id = context_id(event);
        let slot = self.slot(&context_id);
        let dispatch = {
            let mut guard = slot.lock().await;
            match self.activate(&mut guard, event, sender).await {
                Dispatch::Unhandled if !nlp.is_empty() => {
                    self.run_intent(&mut guard, event, sender, nlp).await
                }
                dispatch => dispatch,
            }
        };
        self.release(&context_id, slot);
        dispatch
    }

    /// Whether a session is stored for `context_id`. Busy slots count as
    /// live.
    pub(crate) fn has_session(&self, context_id: &str) -> bool {
        let Some(slot) = self.slots.lock().get(context_id).cloned() else {
            return false;
        };
        slot.try_lock().map_or(true, |guard| guard.is_some())
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }

    async fn activate(
        &self,
        slot: &mut Option<CommandSession>,
        event: &Event,
        sender: &MessageSender,
    ) -> Dispatch {
        let text = event.message().map(plain_text).unwrap_or_default();

        if let Some(mut session) = slot.take() {
            if session.is_expired(self.expire_timeout) {
                debug!(command = %session.command(), "Command session expired");
            } else if let Some(command) = self.commands.get(session.command()).cloned() {
                session.refresh(event.clone(), text);
                return self.run(slot, &command, session).await;
            }
        }

        let Some((command, current_arg)) = self.commands.parse(&text, &self.command_start) else {
            return Dispatch::Unhandled;
        };
        if command.is_only_to_me() && !event.to_me() {
            return Dispatch::Unhandled;
        }

        debug!(command = %command.name(), "Starting command session");
        let session = CommandSession::new(
            sender.clone(),
            event.clone(),
            command.name(),
            CommandArgs::new(),
            current_arg,
        );
        self.run(slot, &command, session).await
    }

    /// Runs the winning intent in a fresh session. `slot` is empty here:
    /// `activate` took any stored session before reporting `Unhandled`.
    async fn run_intent(
        &self,
        slot: &mut Option<CommandSession>,
        event: &Event,
        sender: &MessageSender,
        nlp: &NlpResolver,
    ) -> Dispatch {
        let msg = event.message().map(plain_text).unwrap_or_default();
        let session = NlpSession::new(event.clone(), msg, sender.clone());
        let Some(intent) = nlp.resolve(&session, &self.commands).await else {
            debug!(event = %event.name(), "Message not handled");
            return Dispatch::Unhandled;
        };
        let Some(command) = self.commands.get(&intent.name).cloned() else {
            warn!(command = %intent.name, "Intent names an unknown command");
            return Dispatch::Unhandled;
        };

        debug!(
            command = %intent.name,
            confidence = intent.confidence,
            "Running intent command"
        );
        let session = CommandSession::new(
            sender.clone(),
            event.clone(),
            command.name(),
            intent.args.unwrap_or_default(),
            intent.current_arg,
        );
        self.run(slot, &command, session).await
    }

    async fn run(
        &self,
        slot: &mut Option<CommandSession>,
        command: &Command,
        mut session: CommandSession,
    ) -> Dispatch {
        let result = command.run(&mut session).await;
        session.touch();

        match result {
            Ok(()) => Dispatch::Handled,
            Err(Interrupt::Finish(reply)) => {
                if let Some(reply) = reply {
                    session.send(reply).await;
                }
                Dispatch::Handled
            }
            Err(Interrupt::AwaitInput(prompt)) => {
                if let Some(prompt) = prompt {
                    session.send(prompt).await;
                }
                *slot = Some(session);
                Dispatch::Handled
            }
            Err(Interrupt::Switch(message)) => {
                debug!(command = %command.name(), "Command session switched");
                Dispatch::Switched(message)
            }
        }
    }

    fn slot(&self, context_id: &str) -> Slot {
        Arc::clone(self.slots.lock().entry(context_id.to_string()).or_default())
    }

    /// Drops the slot when it is empty and nobody else is waiting on it.
    fn release(&self, context_id: &str, slot: Slot) {
        let mut slots = self.slots.lock();
        let Some(stored) = slots.get(context_id) else {
            return;
        };
        if !Arc::ptr_eq(stored, &slot) || Arc::strong_count(&slot) > 2 {
            return;
        }
        if slot.try_lock().is_ok_and(|session| session.is_none()) {
            slots.remove(context_id);
        }
    }
}

/// Sessions are scoped to the adapter the event came from.
pub(crate) fn context_id(event: &Event) -> String {
    format!("/self/{}", event.self_id().unwrap_or_default())
}
