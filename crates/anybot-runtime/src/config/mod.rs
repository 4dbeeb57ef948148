//! Configuration loading and validation for the anybot runtime.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{AnyBotConfig, LogFormat, LogOutput, LoggingConfig, ServerConfig};
pub use validation::validate_config;
