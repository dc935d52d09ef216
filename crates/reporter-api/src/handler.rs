use tracing::debug;

use reporter_types::events::InboundMessage;

use crate::commands::{self, Command};
use crate::conversation;
use crate::state::AppStateInner;

/// Handle one inbound message and return the reply, if any.
///
/// Group and channel messages are ignored. Slash commands are handled before
/// the conversation, so `/start` always resets a stuck session.
pub async fn handle_message(state: &AppStateInner, message: &InboundMessage) -> Option<String> {
    if !message.is_private {
        debug!("Ignoring non-private message from {}", message.chat_id);
        return None;
    }

    if let Some(command) = Command::parse(&message.text) {
        debug!("Chat {} sent /{}", message.chat_id, command_name(&command));
        return Some(commands::execute(state, message.chat_id, command).await);
    }

    let Some(slot) = state.sessions.get(message.chat_id).await else {
        return Some("Please use /start to begin.".to_string());
    };

    let mut session = slot.lock().await;
    let from = session.step;
    let reply = conversation::advance(state, &mut session, message).await;
    if session.step != from {
        debug!(
            "Chat {} moved {} -> {}",
            message.chat_id,
            from.as_str(),
            session.step.as_str()
        );
    }
    Some(reply)
}

// Tokens must never reach the logs.
fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Start => "start",
        Command::Stats => "stats",
        Command::Verify(_) => "verify",
        Command::Analytics => "analytics",
        Command::SetToken { .. } => "set_token",
        Command::Usage(_) => "usage",
    }
}
