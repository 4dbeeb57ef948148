//! # anybot
//!
//! A chat bot framework that sits behind OneBot-style protocol adapters.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  webhook / reverse ws  ┌───────────┐  message.*  ┌─────────────────────┐
//! │ Adapters │──────────────────────▶│  Gateway  │────────────▶│ Bot                 │
//! │          │◀──────────────────────│ bus, API  │◀────────────│ commands, NLP, hooks│
//! └──────────┘   action frames        └───────────┘ call_action └─────────────────────┘
//! ```
//!
//! - **Transport**: the axum server adapters connect to
//! - **Gateway**: event bus, connection registry and action correlation
//! - **Bot**: multi-turn commands and natural language intents
//! - **Runtime**: configuration, logging and the server lifecycle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use anybot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = AnyBotRuntime::builder()
//!         .bot(|bot| {
//!             bot.builtin_commands().command(Command::from_fn("ping", |session| {
//!                 Box::pin(async move {
//!                     session.send("pong").await;
//!                     Ok(())
//!                 })
//!             }))
//!         })
//!         .build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use anybot_core as core;
pub use anybot_framework as framework;
pub use anybot_runtime as runtime;
pub use anybot_transport as transport;

/// Commonly used types for building bots.
///
/// ```rust,ignore
/// use anybot::prelude::*;
/// ```
pub mod prelude {
    pub use anybot_runtime::{AnyBotConfig, AnyBotRuntime, RuntimeError};

    pub use anybot_core::{
        ApiError, ApiResult, Event, EventHandler, FnHandler, Gateway, GatewayConfig, async_trait,
    };

    pub use anybot_framework::{
        BeforeHandleMessage, BeforeSendMessage, Bot, BotBuilder, BotConfig, Command, CommandArgs,
        CommandResult, CommandSession, IntentCommand, Interrupt, NlpMatcher, NlpOutput, NlpResult,
        NlpSession, append_text, plain_text,
    };

    pub use anybot_runtime::tracing::{debug, error, info, trace, warn};
}
