//! Multi-turn commands.
//!
//! A command is resolved from the start of a message (`/echo hello`) and runs
//! against a [`CommandSession`] bound to the conversation context. A command
//! body that needs more input returns [`Interrupt::AwaitInput`]: the engine
//! sends the prompt, stores the session and ends the activation. The next
//! message from the same context re-runs the body from the top with the
//! stored state.
//!
//! # Example
//!
//! ```rust,ignore
//! use anybot_framework::{Command, CommandSession, Interrupt};
//!
//! let speak = Command::from_fn("speak", |session: &mut CommandSession| {
//!     Box::pin(async move {
//!         let content = session.get("content", Some("What should I say?"))?;
//!         Err(Interrupt::finish(content))
//!     })
//! })
//! .alias("say");
//! ```

mod engine;
mod session;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

pub(crate) use engine::{CommandEngine, Dispatch};
pub use session::CommandSession;

/// A boxed future borrowed from a command session.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Arguments and collected state of a command session.
pub type CommandArgs = Map<String, Value>;

/// How a command activation ends early.
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// End the session, sending the reply if any.
    Finish(Option<Value>),
    /// End the session and handle `message` as a new incoming message.
    Switch(Value),
    /// Keep the session and wait for the next message, sending the prompt if any.
    AwaitInput(Option<Value>),
}

impl Interrupt {
    pub fn finish(reply: impl Into<Value>) -> Self {
        Self::Finish(Some(reply.into()))
    }

    /// Ends the session without replying.
    pub fn done() -> Self {
        Self::Finish(None)
    }

    pub fn switch(message: impl Into<Value>) -> Self {
        Self::Switch(message.into())
    }

    pub fn pause(prompt: impl Into<Value>) -> Self {
        Self::AwaitInput(Some(prompt.into()))
    }
}

/// Result of a command body or args parser.
pub type CommandResult = Result<(), Interrupt>;

/// The body of a command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, session: &mut CommandSession) -> CommandResult;
}

/// Runs before the command body on every activation.
///
/// Typically fills `state[current_key]` from `current_arg`, or finishes the
/// session when the input makes no sense.
#[async_trait]
pub trait ArgsParser: Send + Sync {
    async fn parse(&self, session: &mut CommandSession) -> CommandResult;
}

struct FnCommand<F>(F);

#[async_trait]
impl<F> CommandHandler for FnCommand<F>
where
    F: for<'a> Fn(&'a mut CommandSession) -> BoxFuture<'a, CommandResult> + Send + Sync,
{
    async fn run(&self, session: &mut CommandSession) -> CommandResult {
        (self.0)(session).await
    }
}

#[async_trait]
impl<F> ArgsParser for FnCommand<F>
where
    F: for<'a> Fn(&'a mut CommandSession) -> BoxFuture<'a, CommandResult> + Send + Sync,
{
    async fn parse(&self, session: &mut CommandSession) -> CommandResult {
        (self.0)(session).await
    }
}

/// A registered command.
pub struct Command {
    name: String,
    aliases: Vec<String>,
    only_to_me: bool,
    handler: Arc<dyn CommandHandler>,
    args_parser: Option<Arc<dyn ArgsParser>>,
}

impl Command {
    pub fn new(name: impl Into<String>, handler: impl CommandHandler + 'static) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            only_to_me: true,
            handler: Arc::new(handler),
            args_parser: None,
        }
    }

    /// Creates a command from a closure returning a boxed future.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut CommandSession) -> BoxFuture<'a, CommandResult>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, FnCommand(f))
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Whether the command only runs on messages addressed to the bot.
    /// Defaults to `true`.
    pub fn only_to_me(mut self, only_to_me: bool) -> Self {
        self.only_to_me = only_to_me;
        self
    }

    pub fn args_parser(mut self, parser: impl ArgsParser + 'static) -> Self {
        self.args_parser = Some(Arc::new(parser));
        self
    }

    pub fn args_parser_fn<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut CommandSession) -> BoxFuture<'a, CommandResult>
            + Send
            + Sync
            + 'static,
    {
        self.args_parser(FnCommand(f))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn is_only_to_me(&self) -> bool {
        self.only_to_me
    }

    /// Runs the args parser (if any) and then the body.
    pub(crate) async fn run(&self, session: &mut CommandSession) -> CommandResult {
        if let Some(parser) = &self.args_parser {
            parser.parse(session).await?;
        }
        session.fill_current_key();
        self.handler.run(session).await
    }
}

/// Commands by name and alias.
#[derive(Default)]
pub struct CommandRegistry {
    lookup: HashMap<String, Arc<Command>>,
    names: Vec<String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `command` under its name and aliases. A later command replaces an
    /// earlier one claiming the same word.
    pub fn register(&mut self, command: Command) {
        let command = Arc::new(command);
        for word in std::iter::once(&command.name).chain(&command.aliases) {
            if self.lookup.insert(word.clone(), Arc::clone(&command)).is_some() {
                warn!(word = %word, command = %command.name, "Command word registered twice");
            }
        }
        self.names.push(command.name.clone());
    }

    pub fn get(&self, word: &str) -> Option<&Arc<Command>> {
        self.lookup.get(word)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.lookup.contains_key(word)
    }

    /// Registered command names in registration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolves the command a message starts with.
    ///
    /// Only the longest `command_start` prefix the text begins with is
    /// considered; the word after it must be a command name or alias.
    /// Returns the command and the rest of the text with leading whitespace
    /// removed.
    pub fn parse(&self, text: &str, command_start: &[String]) -> Option<(Arc<Command>, String)> {
        let text = text.trim_start();
        let start = command_start
            .iter()
            .filter(|start| text.starts_with(start.as_str()))
            .max_by_key(|start| start.len())?;

        let rest = &text[start.len()..];
        let (word, remainder) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));
        let command = self.lookup.get(word)?;
        Some((Arc::clone(command), remainder.trim_start().to_string()))
    }
}
