//! Milktea - a small demo bot built on anybot.
//!
//! Start the bot, then point an adapter's reverse WebSocket at
//! `ws://127.0.0.1:8080/ws/`:
//!
//! ```bash
//! cargo run -p milktea -- --config demos/milktea/anybot.toml
//! DEPLOYMENT_ENV=prod cargo run -p milktea
//! ```
//!
//! Things to say to it:
//!
//! - `/echo <text>` or `echo <text>`
//! - `跟我说 <text>` (asks for the text when it is missing)
//! - `你是谁`, `你好`
//! - `/test`

use std::path::PathBuf;

use anybot::prelude::*;
use anyhow::Result;
use clap::Parser;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "milktea", about = "A demo anybot bot")]
struct Args {
    /// Configuration file; searched for in the usual places when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Deployment profile (dev, test, prod). Defaults to `DEPLOYMENT_ENV`.
    #[arg(short, long)]
    profile: Option<String>,

    /// Tag every handled and sent message, to make the hooks visible.
    #[arg(long)]
    show_hooks: bool,
}

// ============================================================================
// Commands
// ============================================================================

const SPEAK_WORD: &str = "跟我说";

/// `speak.to_me <content>` repeats the content back, asking for it first
/// when the command came without one.
fn speak_to_me() -> Command {
    Command::from_fn("speak.to_me", |session: &mut CommandSession| {
        Box::pin(async move {
            let content = session.get("content", Some("跟你说啥？"))?;
            Err(Interrupt::finish(content))
        })
    })
    .alias(SPEAK_WORD)
    .args_parser_fn(|session: &mut CommandSession| {
        Box::pin(async move {
            let stripped = session.current_arg().trim().to_string();
            if session.is_first_run() {
                if !stripped.is_empty() {
                    session
                        .state_mut()
                        .insert("content".to_string(), Value::String(stripped));
                }
                return Ok(());
            }

            if stripped.is_empty() {
                return Err(Interrupt::finish("你好奇怪呀，看不懂你的意思QAQ"));
            }
            if let Some(key) = session.current_key().map(str::to_string) {
                session.state_mut().insert(key, Value::String(stripped));
            }
            Ok(())
        })
    })
}

fn test_command() -> Command {
    Command::from_fn("test", |session: &mut CommandSession| {
        Box::pin(async move {
            session.send("wow").await;
            Ok(())
        })
    })
}

// ============================================================================
// Natural language
// ============================================================================

/// "跟我说xxx" without a separating space still reaches `speak.to_me`.
fn speak_intent() -> NlpMatcher {
    NlpMatcher::from_fn(|session: NlpSession| async move {
        let stripped = session.msg().trim();
        let content = stripped.strip_prefix(SPEAK_WORD)?.trim_start();

        let mut args = CommandArgs::new();
        args.insert("content".to_string(), Value::String(content.to_string()));
        Some(NlpOutput::Intent(
            IntentCommand::new(65.0, "speak.to_me").with_args(args),
        ))
    })
}

fn who_intent() -> NlpMatcher {
    NlpMatcher::from_fn(|_session: NlpSession| async move {
        Some(NlpOutput::Intent(
            IntentCommand::new(100.0, "echo").with_current_arg("我是奶茶！"),
        ))
    })
    .keywords(["你是谁"])
}

fn hello_intent() -> NlpMatcher {
    NlpMatcher::from_fn(|_session: NlpSession| async move {
        Some(NlpOutput::Intent(
            IntentCommand::new(100.0, "echo").with_current_arg("你也好"),
        ))
    })
    .keywords(["你好"])
}

// ============================================================================
// Hooks
// ============================================================================

struct Tagline(&'static str);

#[async_trait]
impl BeforeHandleMessage for Tagline {
    async fn before_handle(&self, _gateway: &Gateway, event: &mut Event) {
        if let Some(mut message) = event.message().cloned() {
            append_text(&mut message, self.0);
            event.set_message(message);
        }
    }
}

#[async_trait]
impl BeforeSendMessage for Tagline {
    async fn before_send(&self, event: &Event, message: &mut Value) {
        debug!(event = %event.name(), "Tagging outgoing message");
        append_text(message, self.0);
    }
}

fn configure(bot: BotBuilder, show_hooks: bool) -> BotBuilder {
    let bot = bot
        .builtin_commands()
        .command(speak_to_me())
        .command(test_command())
        .nlp(speak_intent())
        .nlp(who_intent())
        .nlp(hello_intent());

    if show_hooks {
        bot.before_handle_message(Tagline("\n\n----处理前"))
            .before_send_message(Tagline("\n\n----发送前"))
    } else {
        bot
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = AnyBotRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }

    let show_hooks = args.show_hooks;
    let runtime = builder
        .bot(move |bot| configure(bot, show_hooks))
        .build()?;

    info!(
        commands = ?runtime.bot().commands().names(),
        "Milktea is ready"
    );
    runtime.run().await?;

    Ok(())
}
