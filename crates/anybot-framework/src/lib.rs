//! # anybot framework
//!
//! The bot layer on top of the [`anybot_core`] gateway: multi-turn command
//! sessions, natural language intent resolution and the message pipeline
//! that ties them together.
//!
//! ## Message flow
//!
//! ```text
//! message.* event
//!   -> before_handle_message hooks
//!   -> to_me detection (private chat, mention, leading nickname)
//!   -> command engine (continue session | parse command)
//!   -> NLP matchers (only when no command handled the message)
//!   -> replies through before_send_message hooks
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use anybot_framework::{BotBuilder, BotConfig, IntentCommand, NlpMatcher, NlpOutput};
//!
//! let bot = BotBuilder::new(BotConfig::default())
//!     .builtin_commands()
//!     .nlp(
//!         NlpMatcher::from_fn(|_session| async {
//!             Some(NlpOutput::Intent(
//!                 IntentCommand::new(90.0, "echo").with_current_arg("hello to you too"),
//!             ))
//!         })
//!         .keywords(["hello"]),
//!     )
//!     .build(gateway);
//! ```

pub mod bot;
pub mod builtin;
pub mod command;
pub mod config;
pub mod message;
pub mod nlp;

pub use bot::{Bot, BotBuilder};
pub use builtin::builtin_commands;
pub use command::{
    ArgsParser, BoxFuture, Command, CommandArgs, CommandHandler, CommandRegistry, CommandResult,
    CommandSession, Interrupt,
};
pub use config::BotConfig;
pub use message::{
    BeforeHandleMessage, BeforeSendMessage, MessageSender, append_text, plain_text,
};
pub use nlp::{IntentCommand, NlpHandler, NlpMatcher, NlpOutput, NlpResult, NlpSession};
