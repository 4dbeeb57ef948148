//! # anybot runtime
//!
//! Ties the gateway, the bot and the axum transports together:
//!
//! - layered configuration ([`config`]) with figment
//! - logging setup ([`logging`]) over `tracing-subscriber`
//! - the server lifecycle ([`AnyBotRuntime`])
//!
//! ```rust,ignore
//! use anybot_runtime::AnyBotRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = AnyBotRuntime::builder()
//!         .bot(|bot| bot.builtin_commands())
//!         .build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{AnyBotConfig, ConfigError, ConfigLoader, ConfigResult, Profile};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{AnyBotRuntime, RuntimeBuilder};

pub use tracing;
pub use tracing_subscriber;
