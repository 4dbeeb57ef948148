//! Natural language intent resolution.
//!
//! Messages no command claims are offered to the registered NLP matchers.
//! Each matcher guesses what the user meant and answers with an
//! [`IntentCommand`]; the most confident guess at or above the configured
//! threshold is run as a command.

use std::future::Future;

use anybot_core::Event;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;

use crate::command::{CommandArgs, CommandRegistry};
use crate::message::MessageSender;

/// A message offered to an NLP matcher.
#[derive(Clone)]
pub struct NlpSession {
    event: Event,
    msg: String,
    sender: MessageSender,
}

impl NlpSession {
    pub(crate) fn new(event: Event, msg: String, sender: MessageSender) -> Self {
        Self { event, msg, sender }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Plain text of the message.
    pub fn msg(&self) -> &str {
        &self.msg
    }

    pub async fn send(&self, message: impl Into<serde_json::Value>) -> Option<serde_json::Value> {
        self.sender.send(&self.event, message.into()).await
    }
}

/// A command the user probably meant.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentCommand {
    pub confidence: f64,
    pub name: String,
    pub args: Option<CommandArgs>,
    pub current_arg: String,
}

impl IntentCommand {
    pub fn new(confidence: f64, name: impl Into<String>) -> Self {
        Self {
            confidence,
            name: name.into(),
            args: None,
            current_arg: String::new(),
        }
    }

    pub fn with_args(mut self, args: CommandArgs) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_current_arg(mut self, current_arg: impl Into<String>) -> Self {
        self.current_arg = current_arg.into();
        self
    }
}

/// Candidate command names for one guess; the first registered one is used.
#[derive(Debug, Clone, PartialEq)]
pub struct NlpResult {
    pub confidence: f64,
    pub names: Vec<String>,
    pub args: Option<CommandArgs>,
}

impl NlpResult {
    pub fn new<I, S>(confidence: f64, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            confidence,
            names: names.into_iter().map(Into::into).collect(),
            args: None,
        }
    }

    pub fn with_args(mut self, args: CommandArgs) -> Self {
        self.args = Some(args);
        self
    }

    /// Picks the first name `commands` knows.
    pub fn into_intent(self, commands: &CommandRegistry) -> Option<IntentCommand> {
        let name = self.names.into_iter().find(|name| commands.contains(name))?;
        Some(IntentCommand {
            confidence: self.confidence,
            name,
            args: self.args,
            current_arg: String::new(),
        })
    }
}

/// What an NLP handler produced.
#[derive(Debug, Clone, PartialEq)]
pub enum NlpOutput {
    Intent(IntentCommand),
    Result(NlpResult),
}

impl From<IntentCommand> for NlpOutput {
    fn from(intent: IntentCommand) -> Self {
        Self::Intent(intent)
    }
}

impl From<NlpResult> for NlpOutput {
    fn from(result: NlpResult) -> Self {
        Self::Result(result)
    }
}

#[async_trait]
pub trait NlpHandler: Send + Sync {
    async fn process(&self, session: NlpSession) -> Option<NlpOutput>;
}

struct FnNlp<F>(F);

#[async_trait]
impl<F, Fut> NlpHandler for FnNlp<F>
where
    F: Fn(NlpSession) -> Fut + Send + Sync,
    Fut: Future<Output = Option<NlpOutput>> + Send,
{
    async fn process(&self, session: NlpSession) -> Option<NlpOutput> {
        (self.0)(session).await
    }
}

/// A registered NLP handler and the messages it applies to.
pub struct NlpMatcher {
    keywords: Vec<String>,
    only_to_me: bool,
    allow_empty_message: bool,
    handler: Box<dyn NlpHandler>,
}

impl NlpMatcher {
    pub fn new(handler: impl NlpHandler + 'static) -> Self {
        Self {
            keywords: Vec::new(),
            only_to_me: true,
            allow_empty_message: false,
            handler: Box::new(handler),
        }
    }

    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(NlpSession) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<NlpOutput>> + Send + 'static,
    {
        Self::new(FnNlp(f))
    }

    /// Restricts the matcher to messages containing at least one keyword.
    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn only_to_me(mut self, only_to_me: bool) -> Self {
        self.only_to_me = only_to_me;
        self
    }

    pub fn allow_empty_message(mut self, allow: bool) -> Self {
        self.allow_empty_message = allow;
        self
    }

    fn applies_to(&self, event: &Event, msg: &str) -> bool {
        if self.only_to_me && !event.to_me() {
            return false;
        }
        if msg.is_empty() && !self.allow_empty_message {
            return false;
        }
        self.keywords.is_empty()
            || self
                .keywords
                .iter()
                .any(|keyword| msg.contains(keyword.as_str()))
    }
}

/// Runs matchers and selects the winning intent.
pub(crate) struct NlpResolver {
    matchers: Vec<NlpMatcher>,
    threshold: f64,
}

impl NlpResolver {
    pub(crate) fn new(matchers: Vec<NlpMatcher>, threshold: f64) -> Self {
        Self {
            matchers,
            threshold,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Runs every applicable matcher concurrently.
    ///
    /// The strictly most confident intent wins, so ties go to the matcher
    /// registered first. Intents below the threshold are discarded.
    pub(crate) async fn resolve(
        &self,
        session: &NlpSession,
        commands: &CommandRegistry,
    ) -> Option<IntentCommand> {
        let runs = self
            .matchers
            .iter()
            .filter(|matcher| matcher.applies_to(session.event(), session.msg()))
            .map(|matcher| matcher.handler.process(session.clone()));

        let mut best: Option<IntentCommand> = None;
        for output in join_all(runs).await.into_iter().flatten() {
            let intent = match output {
                NlpOutput::Intent(intent) => intent,
                NlpOutput::Result(result) => match result.into_intent(commands) {
                    Some(intent) => intent,
                    None => continue,
                },
            };
            if best
                .as_ref()
                .is_none_or(|best| intent.confidence > best.confidence)
            {
                best = Some(intent);
            }
        }

        let intent = best?;
        if intent.confidence < self.threshold {
            debug!(
                command = %intent.name,
                confidence = intent.confidence,
                threshold = self.threshold,
                "Intent below confidence threshold"
            );
            return None;
        }
        Some(intent)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anybot_core::{Gateway, GatewayConfig};
    use serde_json::json;

    use super::*;
    use crate::command::{Command, CommandSession};

    fn session(msg: &str, to_me: bool) -> NlpSession {
        let gateway = Arc::new(Gateway::new(GatewayConfig::default()));
        let event = Event::from_value(json!({
            "type": "message",
            "detail_type": "group",
            "self_id": 1,
            "group_id": 3,
            "message": msg,
            "to_me": to_me,
        }))
        .unwrap();
        NlpSession::new(event, msg.to_string(), MessageSender::new(gateway, Vec::new()))
    }

    fn intent(confidence: f64, name: &'static str) -> NlpMatcher {
        NlpMatcher::from_fn(move |_session| async move {
            Some(NlpOutput::Intent(IntentCommand::new(confidence, name)))
        })
    }

    fn commands(names: &[&str]) -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        for name in names {
            registry.register(Command::from_fn(*name, |_session: &mut CommandSession| {
                Box::pin(async { Ok(()) })
            }));
        }
        registry
    }

    #[tokio::test]
    async fn test_highest_confidence_wins() {
        let resolver = NlpResolver::new(
            vec![intent(70.0, "low"), intent(90.0, "high"), intent(80.0, "mid")],
            60.0,
        );
        let winner = resolver
            .resolve(&session("hi", true), &CommandRegistry::new())
            .await
            .unwrap();
        assert_eq!(winner.name, "high");
    }

    #[tokio::test]
    async fn test_ties_go_to_first_registered() {
        let resolver = NlpResolver::new(vec![intent(80.0, "first"), intent(80.0, "second")], 60.0);
        let winner = resolver
            .resolve(&session("hi", true), &CommandRegistry::new())
            .await
            .unwrap();
        assert_eq!(winner.name, "first");
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let resolver = NlpResolver::new(vec![intent(59.9, "weak")], 60.0);
        assert!(resolver.resolve(&session("hi", true), &CommandRegistry::new()).await.is_none());

        let resolver = NlpResolver::new(vec![intent(60.0, "enough")], 60.0);
        assert!(resolver.resolve(&session("hi", true), &CommandRegistry::new()).await.is_some());
    }

    #[tokio::test]
    async fn test_keyword_disjoint_matchers_never_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let matcher = NlpMatcher::from_fn(move |_session| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Some(NlpOutput::Intent(IntentCommand::new(100.0, "echo"))) }
        })
        .keywords(["你好"]);
        let resolver = NlpResolver::new(vec![matcher], 60.0);
        let commands = CommandRegistry::new();

        assert!(resolver.resolve(&session("goodbye", true), &commands).await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(resolver.resolve(&session("你好呀", true), &commands).await.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_only_to_me_and_empty_messages_are_filtered() {
        let resolver = NlpResolver::new(vec![intent(100.0, "echo")], 60.0);
        let commands = CommandRegistry::new();
        assert!(resolver.resolve(&session("hi", false), &commands).await.is_none());
        assert!(resolver.resolve(&session("", true), &commands).await.is_none());

        let open = NlpResolver::new(
            vec![intent(100.0, "echo").only_to_me(false).allow_empty_message(true)],
            60.0,
        );
        assert!(open.resolve(&session("", false), &commands).await.is_some());
    }

    #[tokio::test]
    async fn test_nlp_result_uses_first_registered_name() {
        let matcher = NlpMatcher::from_fn(|_session| async {
            Some(NlpOutput::Result(NlpResult::new(75.0, ["missing", "weather", "echo"])))
        });
        let resolver = NlpResolver::new(vec![matcher], 60.0);
        let winner = resolver
            .resolve(&session("rain?", true), &commands(&["echo", "weather"]))
            .await
            .unwrap();
        assert_eq!(winner.name, "weather");
        assert_eq!(winner.confidence, 75.0);

        let unknown = NlpResult::new(99.0, ["nothing"]);
        assert!(unknown.into_intent(&commands(&["echo"])).is_none());
    }
}
