//! Commands every bot can opt into.

use serde_json::Value;

use crate::command::{Command, CommandSession};

/// `echo <text>` replies with `state["message"]`, or the text after the
/// command word.
pub fn echo() -> Command {
    Command::from_fn("echo", |session: &mut CommandSession| {
        Box::pin(async move {
            let message = match session.state().get("message") {
                Some(message) if !is_blank(message) => message.clone(),
                _ => Value::String(session.current_arg().to_string()),
            };
            session.send(message).await;
            Ok(())
        })
    })
}

pub fn builtin_commands() -> Vec<Command> {
    vec![echo()]
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
