//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{AnyBotConfig, LogOutput, LoggingConfig, ServerConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Rejects configurations the runtime cannot start with.
pub fn validate_config(config: &AnyBotConfig) -> ConfigResult<()> {
    validate_server(&config.server)?;

    if config.gateway.api_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "gateway.api_timeout_secs must be greater than 0",
        ));
    }

    let threshold = config.bot.nlp_confidence_threshold;
    if threshold.is_nan() || threshold < 0.0 {
        return Err(ConfigError::validation(format!(
            "bot.nlp_confidence_threshold must not be negative, got {threshold}"
        )));
    }

    validate_logging(&config.logging)
}

fn validate_server(server: &ServerConfig) -> ConfigResult<()> {
    if server.port == 0 {
        return Err(ConfigError::InvalidPort(server.port));
    }
    if server.host.trim().is_empty() {
        return Err(ConfigError::validation("server.host must not be empty"));
    }
    if server.ws_paths.is_empty() {
        return Err(ConfigError::validation("server.ws_paths must not be empty"));
    }
    if let Some(path) = server.ws_paths.iter().find(|path| !path.starts_with('/')) {
        return Err(ConfigError::validation(format!(
            "WebSocket path must start with '/': {path}"
        )));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    validate_level("logging.level", &logging.level)?;
    for (target, level) in &logging.filters {
        validate_level(&format!("logging.filters.{target}"), level)?;
    }
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is 'file'",
        ));
    }
    Ok(())
}

fn validate_level(key: &str, level: &str) -> ConfigResult<()> {
    if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        return Ok(());
    }
    Err(ConfigError::validation(format!(
        "Invalid log level for {key}: {level}. Valid values are: {LOG_LEVELS:?}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AnyBotConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_zero_port() {
        let mut config = AnyBotConfig::default();
        config.server.port = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidPort(0))
        ));
    }

    #[test]
    fn test_rejects_bad_ws_paths() {
        let mut config = AnyBotConfig::default();
        config.server.ws_paths = Vec::new();
        assert!(validate_config(&config).is_err());

        config.server.ws_paths = vec!["/ws".to_string(), "event".to_string()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_timeout_and_negative_threshold() {
        let mut config = AnyBotConfig::default();
        config.gateway.api_timeout_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AnyBotConfig::default();
        config.bot.nlp_confidence_threshold = -1.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_invalid_log_levels() {
        let mut config = AnyBotConfig::default();
        config.logging.level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AnyBotConfig::default();
        config.logging.level = "DEBUG".to_string();
        config
            .logging
            .filters
            .insert("anybot_core".to_string(), "verbose".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = AnyBotConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("anybot.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
