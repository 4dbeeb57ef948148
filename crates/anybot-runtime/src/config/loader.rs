//! Layered configuration loading with figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic defaults passed to [`ConfigLoader::merge`]
//! 3. Main file (`anybot.toml` / `anybot.yaml`)
//! 4. Profile-specific file (`anybot.{profile}.toml` / `anybot.{profile}.yaml`)
//! 5. Environment variables (`ANYBOT_*`)
//! 6. Overrides passed to [`ConfigLoader::set`]
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: TOML files
//! - `yaml-config`: YAML files (`anybot.yaml`, `anybot.yml`)
//!
//! # Environment Variable Mapping
//!
//! Variables use the `ANYBOT_` prefix with `__` between keys:
//!
//! - `ANYBOT_SERVER__PORT=9000` → `server.port = 9000`
//! - `ANYBOT_GATEWAY__ACCESS_TOKEN=xxx` → `gateway.access_token = "xxx"`
//! - `ANYBOT_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//!
//! # Example
//!
//! ```rust,ignore
//! use anybot_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("prod")
//!     .file("./deploy/anybot.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::AnyBotConfig;

const ENV_PREFIX: &str = "ANYBOT_";

/// Deployment profile selecting the profile-specific config file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Development,
    Test,
    Production,
    Custom(String),
}

impl Profile {
    /// The name used in profile file names.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "dev",
            Self::Test => "test",
            Self::Production => "prod",
            Self::Custom(name) => name,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "dev" | "development" => Self::Development,
            "test" | "testing" => Self::Test,
            "prod" | "production" => Self::Production,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `ANYBOT_PROFILE`, then `DEPLOYMENT_ENV`.
    pub fn from_env() -> Self {
        std::env::var("ANYBOT_PROFILE")
            .or_else(|_| std::env::var("DEPLOYMENT_ENV"))
            .map(|name| Self::parse(&name))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    defaults: Figment,
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            defaults: Figment::new(),
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search for config files. Without any, the current
    /// directory and the user config directory are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a full configuration below files and environment variables.
    pub fn merge(mut self, config: AnyBotConfig) -> Self {
        self.defaults = self.defaults.merge(Serialized::defaults(config));
        self
    }

    /// Overrides a single dotted key above every other source.
    ///
    /// ```rust,ignore
    /// let config = ConfigLoader::new().set("server.port", 9000).load()?;
    /// ```
    pub fn set<T: serde::Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::global(key, value));
        self
    }

    pub fn load(self) -> ConfigResult<AnyBotConfig> {
        let profile = self.profile.clone();
        let config: AnyBotConfig = self.build_figment()?.extract()?;

        debug!(
            profile = %profile,
            host = %config.server.host,
            port = config.server.port,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(AnyBotConfig::default()))
            .merge(std::mem::take(&mut self.defaults));

        figment = match &self.config_file {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading configuration file");
                merge_config_file(figment, path)?
            }
            Some(path) => return Err(ConfigError::FileNotFound(path.clone())),
            None => self.load_config_files(figment),
        };

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment.merge(self.overrides))
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("anybot"));
        }
        paths
    }

    /// Merges the main file and then the profile file of the first directory
    /// holding a main file.
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let extensions = enabled_extensions();
        for dir in self.resolve_search_paths() {
            for ext in &extensions {
                let main_path = dir.join(format!("anybot.{ext}"));
                if !main_path.exists() {
                    continue;
                }
                info!(path = %main_path.display(), "Loading configuration file");
                figment = merge_known_file(figment, &main_path, ext);

                let profile_path = dir.join(format!("anybot.{}.{ext}", self.profile));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile configuration");
                    figment = merge_known_file(figment, &profile_path, ext);
                }
                return figment;
            }
        }
        warn!("No configuration file found, using defaults");
        figment
    }
}

fn enabled_extensions() -> Vec<&'static str> {
    let mut extensions = Vec::new();
    #[cfg(feature = "toml-config")]
    extensions.push("toml");
    #[cfg(feature = "yaml-config")]
    extensions.extend(["yaml", "yml"]);
    extensions
}

/// Merges `path` according to its extension; only enabled formats are accepted.
fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !enabled_extensions().contains(&ext) {
        return Err(ConfigError::ParseError(format!(
            "Unsupported or disabled configuration file format: .{ext}"
        )));
    }
    Ok(merge_known_file(figment, path, ext))
}

#[allow(unused_variables)]
fn merge_known_file(figment: Figment, path: &Path, ext: &str) -> Figment {
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => figment.merge(Toml::file(path)),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => figment.merge(Yaml::file(path)),
        _ => figment,
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<AnyBotConfig> {
    ConfigLoader::new().load()
}

pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<AnyBotConfig> {
    ConfigLoader::new().file(path).load()
}
