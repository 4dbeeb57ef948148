//! The message pipeline.

use std::sync::{Arc, Weak};

use anybot_core::{Event, EventHandler, Gateway, SubscriptionId};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

use crate::builtin::builtin_commands;
use crate::command::{Command, CommandEngine, CommandRegistry, Dispatch};
use crate::config::BotConfig;
use crate::message::{
    BeforeHandleMessage, BeforeSendMessage, MessageSender, NicknameMatcher, plain_text,
};
use crate::nlp::{NlpMatcher, NlpResolver};

/// Collects commands, NLP matchers and hooks before the bot goes live.
pub struct BotBuilder {
    config: BotConfig,
    commands: CommandRegistry,
    matchers: Vec<NlpMatcher>,
    before_handle: Vec<Arc<dyn BeforeHandleMessage>>,
    before_send: Vec<Arc<dyn BeforeSendMessage>>,
}

impl BotBuilder {
    pub fn new(config: BotConfig) -> Self {
        Self {
            config,
            commands: CommandRegistry::new(),
            matchers: Vec::new(),
            before_handle: Vec::new(),
            before_send: Vec::new(),
        }
    }

    pub fn command(mut self, command: Command) -> Self {
        self.commands.register(command);
        self
    }

    pub fn commands(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        for command in commands {
            self.commands.register(command);
        }
        self
    }

    /// Registers `echo`.
    pub fn builtin_commands(self) -> Self {
        self.commands(builtin_commands())
    }

    pub fn nlp(mut self, matcher: NlpMatcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn before_handle_message(mut self, hook: impl BeforeHandleMessage + 'static) -> Self {
        self.before_handle.push(Arc::new(hook));
        self
    }

    pub fn before_send_message(mut self, hook: impl BeforeSendMessage + 'static) -> Self {
        self.before_send.push(Arc::new(hook));
        self
    }

    /// Builds the bot and subscribes it to the configured message events.
    pub fn build(self, gateway: Arc<Gateway>) -> Arc<Bot> {
        let Self {
            config,
            commands,
            matchers,
            before_handle,
            before_send,
        } = self;

        let bot = Arc::new(Bot {
            sender: MessageSender::new(Arc::clone(&gateway), before_send),
            nickname: NicknameMatcher::new(&config.nickname),
            engine: CommandEngine::new(
                commands,
                config.command_start.clone(),
                config.session_expire_timeout(),
            ),
            nlp: NlpResolver::new(matchers, config.nlp_confidence_threshold),
            before_handle,
            subscriptions: Mutex::new(Vec::new()),
            gateway,
            config,
        });

        let handler: Arc<dyn EventHandler> = Arc::new(MessageHandler {
            bot: Arc::downgrade(&bot),
        });
        let subscriptions = bot
            .config
            .message_events
            .iter()
            .map(|name| {
                let id = bot.gateway.bus().subscribe(name, Arc::clone(&handler));
                (name.clone(), id)
            })
            .collect();
        *bot.subscriptions.lock() = subscriptions;

        info!(
            commands = bot.engine.commands().len(),
            events = ?bot.config.message_events,
            "Bot ready"
        );
        bot
    }
}

/// A bot subscribed to a gateway's message events.
pub struct Bot {
    gateway: Arc<Gateway>,
    config: BotConfig,
    sender: MessageSender,
    nickname: Option<NicknameMatcher>,
    engine: CommandEngine,
    nlp: NlpResolver,
    before_handle: Vec<Arc<dyn BeforeHandleMessage>>,
    subscriptions: Mutex<Vec<(String, SubscriptionId)>>,
}

impl Bot {
    pub fn builder(config: BotConfig) -> BotBuilder {
        BotBuilder::new(config)
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn commands(&self) -> &CommandRegistry {
        self.engine.commands()
    }

    /// Unsubscribes from the gateway. Returns how many subscriptions were
    /// removed.
    pub fn detach(&self) -> usize {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        subscriptions
            .into_iter()
            .filter(|(name, id)| self.gateway.bus().unsubscribe(name, *id))
            .count()
    }

    /// Runs one message event through hooks, commands and NLP.
    pub async fn handle_message(&self, mut event: Event) {
        info!(
            event = %event.name(),
            self_id = ?event.self_id(),
            message = %event.message().map(plain_text).unwrap_or_default(),
            "Handling message"
        );

        for hook in &self.before_handle {
            hook.before_handle(&self.gateway, &mut event).await;
        }

        let mut to_me = event.to_me() || event.detail_type() == "private";
        if let Some(nickname) = &self.nickname
            && let Some(mut message) = event.remove("message")
        {
            to_me |= nickname.strip(&mut message);
            event.set_message(message);
        }
        event.set_to_me(to_me);

        if let Dispatch::Switched(message) = self
            .engine
            .handle_message(&event, &self.sender, &self.nlp)
            .await
        {
            self.switch(&event, message).await;
        }
    }

    /// Re-injects `message` as a new event addressed to the bot.
    async fn switch(&self, event: &Event, message: Value) {
        if event.is_redispatched() {
            warn!(event = %event.name(), "Dropping repeated command switch");
            return;
        }
        self.gateway.dispatch(&event.redispatch(message)).await;
    }
}

struct MessageHandler {
    bot: Weak<Bot>,
}

#[async_trait]
impl EventHandler for MessageHandler {
    async fn handle(&self, event: Event) -> Option<Value> {
        let bot = self.bot.upgrade()?;
        bot.handle_message(event).await;
        None
    }
}
