//! Server lifecycle.
//!
//! ```rust,ignore
//! use anybot_runtime::AnyBotRuntime;
//!
//! let runtime = AnyBotRuntime::builder()
//!     .config_file("anybot.toml")
//!     .bot(|bot| bot.builtin_commands())
//!     .build()?;
//! runtime.run().await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anybot_core::Gateway;
use anybot_framework::{Bot, BotBuilder};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{AnyBotConfig, ConfigLoader, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

type Configure = Box<dyn FnOnce(BotBuilder) -> BotBuilder + Send>;

/// Owns the gateway, the bot and the inbound server.
///
/// A stopped runtime cannot be started again.
pub struct AnyBotRuntime {
    config: AnyBotConfig,
    gateway: Arc<Gateway>,
    bot: Arc<Bot>,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl AnyBotRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Validates `config` and initializes logging from it.
    pub fn from_config(
        config: AnyBotConfig,
        configure: impl FnOnce(BotBuilder) -> BotBuilder,
    ) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_from_config(&config.logging);

        let gateway = Arc::new(Gateway::new(config.gateway.clone()));
        let bot = configure(BotBuilder::new(config.bot.clone())).build(Arc::clone(&gateway));

        info!(
            host = %config.server.host,
            port = config.server.port,
            log_level = %config.logging.level,
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config,
            gateway,
            bot,
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &AnyBotConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn bot(&self) -> &Arc<Bot> {
        &self.bot
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Binds the configured address and serves until ctrl-c, SIGTERM or
    /// [`stop`](Self::stop).
    pub async fn run(&self) -> RuntimeResult<()> {
        let addr = self.config.server.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RuntimeError::Bind { addr, source })?;

        let signals = self.shutdown.clone();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                () = wait_for_signal() => signals.cancel(),
                () = signals.cancelled() => {}
            }
        });

        let result = self.serve(listener).await;
        watcher.abort();
        result
    }

    /// Serves on `listener` until [`stop`](Self::stop) is called.
    pub async fn serve(&self, listener: TcpListener) -> RuntimeResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyRunning);
        }
        if !self.gateway.attach_runtime(Handle::current()) {
            debug!("Gateway already attached to a runtime");
        }

        let router = anybot_transport::build_router(
            Arc::clone(&self.gateway),
            &self.config.server.ws_paths,
        );
        match listener.local_addr() {
            Ok(addr) => info!(%addr, ws_paths = ?self.config.server.ws_paths, "Listening"),
            Err(err) => warn!(error = %err, "Listening on an unknown address"),
        }

        let result = anybot_transport::serve(listener, router, self.shutdown.clone()).await;
        self.running.store(false, Ordering::SeqCst);
        info!("Runtime stopped");
        result.map_err(RuntimeError::Serve)
    }

    /// Begins a graceful shutdown of [`run`](Self::run) or
    /// [`serve`](Self::serve).
    pub fn stop(&self) {
        info!("Stopping runtime");
        self.shutdown.cancel();
    }

    /// A token cancelled when the runtime stops.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!(error = %err, "Failed to register SIGTERM handler");
                ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            () = ctrl_c() => {}
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

/// Loads configuration and assembles an [`AnyBotRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    configure: Option<Configure>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            configure: None,
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the profile, e.g. `dev`, `test` or `prod`.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: AnyBotConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn set<T: serde::Serialize>(mut self, key: &str, value: T) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Registers commands, NLP matchers and hooks on the bot.
    pub fn bot(mut self, configure: impl FnOnce(BotBuilder) -> BotBuilder + Send + 'static) -> Self {
        self.configure = Some(Box::new(configure));
        self
    }

    pub fn build(self) -> RuntimeResult<AnyBotRuntime> {
        let config = self.config_loader.load()?;
        let configure = self.configure;
        AnyBotRuntime::from_config(config, |bot| match configure {
            Some(configure) => configure(bot),
            None => bot,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn runtime() -> AnyBotRuntime {
        AnyBotRuntime::from_config(AnyBotConfig::default(), BotBuilder::builtin_commands).unwrap()
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = AnyBotConfig::default();
        config.gateway.api_timeout_secs = 0;
        let result = AnyBotRuntime::from_config(config, |bot| bot);
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_bot_is_subscribed() {
        let runtime = runtime();
        assert!(runtime.bot().commands().contains("echo"));
        assert_eq!(
            runtime.gateway().bus().subscriber_count("message.private"),
            1
        );
    }

    #[tokio::test]
    async fn test_serve_until_stopped() {
        let runtime = Arc::new(runtime());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let server = {
            let runtime = Arc::clone(&runtime);
            tokio::spawn(async move { runtime.serve(listener).await })
        };
        for _ in 0..50 {
            if runtime.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(runtime.is_running());
        assert!(runtime.gateway().runtime_handle().is_some());

        let again = TcpListener::bind("127.0.0.1:0").await.unwrap();
        assert!(matches!(
            runtime.serve(again).await,
            Err(RuntimeError::AlreadyRunning)
        ));

        runtime.stop();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!runtime.is_running());
        assert!(runtime.shutdown_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_handle_event_without_adapters() {
        let runtime = runtime();
        let reply = runtime
            .gateway()
            .handle_event(
                json!({
                    "type": "message",
                    "detail_type": "private",
                    "self_id": 1,
                    "user_id": 2,
                    "message": "/echo hi",
                })
                .as_object()
                .cloned()
                .unwrap(),
            )
            .await;
        assert!(reply.is_none());
    }
}
