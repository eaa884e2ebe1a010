//! Telegram update handlers.
//!
//! `handle_message` strips the teloxide types off an update and hands it to
//! `route`, which only talks to the core through `AppState`. Commands go to
//! `commands`, everything else with text goes to the model via `text`.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{Message, MessageKind},
};
use tracing::warn;

use relay_core::{
    domain::{ChatId, MessageId, UserId},
    messaging::types::{Command, TextMessage},
    Result,
};

use crate::router::AppState;

mod commands;
mod text;

#[cfg(test)]
mod test_support;

/// Answer to stickers, photos, voice notes and anything else without text.
pub const TEXT_ONLY_NOTICE: &str = "Please send text messages only.";

/// An update reduced to what the relay acts on.
#[derive(Clone, Debug)]
pub enum Incoming {
    Text(TextMessage),
    Unsupported { chat_id: ChatId },
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(incoming) = incoming(&msg) else {
        return Ok(());
    };

    if let Err(e) = route(&state, incoming).await {
        warn!(chat_id = msg.chat.id.0, error = %e, "update handling failed");
    }
    Ok(())
}

pub async fn route(state: &AppState, incoming: Incoming) -> Result<()> {
    match incoming {
        Incoming::Unsupported { chat_id } => {
            state.messenger.send_text(chat_id, TEXT_ONLY_NOTICE).await?;
            Ok(())
        }
        Incoming::Text(msg) => match Command::parse(&msg.text) {
            Some(cmd) => commands::handle_command(state, &msg, cmd).await,
            None => text::handle_text(state, msg).await,
        },
    }
}

/// Service messages (joins, pins, ...) are ignored.
fn incoming(msg: &Message) -> Option<Incoming> {
    if !matches!(msg.kind, MessageKind::Common(_)) {
        return None;
    }

    let chat_id = ChatId(msg.chat.id.0);
    let incoming = match msg.text() {
        Some(text) => Incoming::Text(TextMessage {
            chat_id,
            message_id: Some(MessageId(msg.id.0)),
            // History is kept per chat: a private chat id is the user's id.
            user_id: UserId::from(chat_id),
            username: msg.from().and_then(|u| u.username.clone()),
            text: text.to_string(),
        }),
        None => Incoming::Unsupported { chat_id },
    };
    Some(incoming)
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use relay_core::streaming::DeliveryMode;

    #[tokio::test(start_paused = true)]
    async fn non_text_gets_notice() {
        let h = Harness::new(DeliveryMode::Bubbles, FakeModel::ok("unused"));

        route(&h.state, Incoming::Unsupported { chat_id: CHAT })
            .await
            .unwrap();

        assert_eq!(h.messenger.texts(), vec![TEXT_ONLY_NOTICE.to_string()]);
        assert_eq!(h.model.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_commands_are_answered_by_the_model() {
        let h = Harness::new(DeliveryMode::Bubbles, FakeModel::ok("No help here."));

        route(&h.state, text_update("/help")).await.unwrap();

        assert_eq!(h.model.calls(), 1);
        assert_eq!(h.messenger.texts(), vec!["No help here.".to_string()]);
    }
}
