use tracing::warn;

use relay_core::{
    context::ResetMode,
    domain::UserId,
    messaging::types::{Command, TextMessage},
    Result,
};

use crate::router::AppState;

pub const GREETING: &str =
    "Hi! I’m your assistant. Send me a message and I’ll reply with AI ✨";

pub async fn handle_command(state: &AppState, msg: &TextMessage, cmd: Command) -> Result<()> {
    let reply = match cmd {
        Command::Start => GREETING,
        Command::Reset => reset(state, msg.user_id, ResetMode::Hard).await,
        Command::New => reset(state, msg.user_id, ResetMode::Soft).await,
    };

    state.messenger.send_text(msg.chat_id, reply).await?;
    Ok(())
}

async fn reset(state: &AppState, user_id: UserId, mode: ResetMode) -> &'static str {
    match state.conversation.reset(user_id, mode).await {
        Ok(_) => match mode {
            ResetMode::Hard => "🧹 Conversation history deleted.",
            ResetMode::Soft => "🆕 New conversation started.",
        },
        Err(e) => {
            warn!(%user_id, ?mode, error = %e, "reset failed");
            "Sorry, I couldn’t reset the conversation right now. Please try again."
        }
    }
}
