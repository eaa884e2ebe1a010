use std::{sync::Arc, time::Duration};

use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, info, warn};

use relay_core::{
    domain::{ChatId, MessageId},
    errors::Error,
    messaging::{port::MessagingPort, types::TextMessage},
    streaming::split_text,
    Result,
};

use crate::router::AppState;

/// Telegram shows "typing…" for about five seconds per chat action.
const TYPING_REFRESH: Duration = Duration::from_secs(4);

pub async fn handle_text(state: &AppState, msg: TextMessage) -> Result<()> {
    let TextMessage {
        chat_id,
        message_id,
        user_id,
        username,
        text,
    } = msg;

    if text.trim().is_empty() {
        return Ok(());
    }

    // Rate limit before heavy work.
    let (ok, retry_after) = state.rate_limiter.lock().await.check(user_id);
    if !ok {
        let retry = retry_after.unwrap_or_default().as_secs_f64();
        info!(%user_id, retry_after_secs = retry, "rate limited");
        state
            .messenger
            .send_text(
                chat_id,
                &format!("⏳ Slow down a little. Please wait {retry:.1} seconds."),
            )
            .await?;
        return Ok(());
    }

    info!(
        %user_id,
        username = username.as_deref().unwrap_or("unknown"),
        chars = text.chars().count(),
        "message received"
    );

    let typing = TypingIndicator::start(state.messenger.clone(), chat_id);
    let reply = state.conversation.respond(user_id, &text).await;
    typing.stop().await;

    let delivered = state
        .delivery
        .deliver_reply(
            state.messenger.as_ref(),
            chat_id,
            message_id,
            &reply.text,
            state.delivery_mode,
        )
        .await;

    match delivered {
        Ok(report) if report.is_clean() => {
            debug!(
                %user_id,
                messages = report.messages_sent,
                edits = report.edits,
                from_model = reply.from_model,
                "reply delivered"
            );
        }
        Ok(report) => {
            warn!(
                %user_id,
                failures = report.failures.len(),
                messages = report.messages_sent,
                "reply delivered with failures"
            );
        }
        Err(Error::DeliveryInitFailed(reason)) => {
            warn!(%user_id, %reason, "paced delivery could not start; sending plainly");
            send_plain(state, chat_id, message_id, &reply.text).await;
        }
        Err(e) => return Err(e),
    }

    Ok(())
}

/// Unpaced fallback: the reply in as few messages as the length limit allows.
async fn send_plain(
    state: &AppState,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
    text: &str,
) {
    let messenger = state.messenger.as_ref();
    let limit = state
        .delivery
        .config()
        .max_message_len
        .min(messenger.capabilities().max_message_len);
    for (index, chunk) in split_text(text.trim(), limit).iter().enumerate() {
        let sent = match reply_to {
            Some(reply_to) if index == 0 => messenger.send_reply(chat_id, reply_to, chunk).await,
            _ => messenger.send_text(chat_id, chunk).await,
        };
        if let Err(e) = sent {
            warn!(chat_id = chat_id.0, index, error = %e, "plain send failed");
        }
    }
}

/// Re-sends the typing action until stopped (best-effort).
struct TypingIndicator {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TypingIndicator {
    fn start(messenger: Arc<dyn MessagingPort>, chat_id: ChatId) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let enabled = messenger.capabilities().supports_chat_actions;
        let task = tokio::spawn(async move {
            if !enabled {
                return;
            }
            let mut tick = tokio::time::interval(TYPING_REFRESH);
            loop {
                tokio::select! {
                    biased;
                    _ = tick.tick() => {
                        if let Err(e) = messenger.show_typing(chat_id).await {
                            debug!(chat_id = chat_id.0, error = %e, "typing action failed");
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });
        Self { stop_tx, task }
    }

    async fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::super::{route, test_support::*};
    use relay_core::{
        context::ContextStore, conversation::APOLOGY, domain::UserId, streaming::DeliveryMode,
    };

    #[tokio::test(start_paused = true)]
    async fn short_reply_is_one_bubble_and_both_turns_are_kept() {
        let h = Harness::new(DeliveryMode::Bubbles, FakeModel::ok("Hi! How can I help?"));

        route(&h.state, text_update("hello")).await.unwrap();

        assert_eq!(h.messenger.texts(), vec!["Hi! How can I help?".to_string()]);
        assert!(h.messenger.calls().contains(&Call::Typing));
        assert_eq!(h.store.count(UserId::from(CHAT), false).await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn long_reply_is_split_into_sentence_bubbles() {
        let reply = "Rust is a systems language focused on safety. \
                     It has no garbage collector. Want to know more?";
        let h = Harness::new(DeliveryMode::Bubbles, FakeModel::ok(reply));

        route(&h.state, text_update("what is rust")).await.unwrap();

        assert_eq!(
            h.messenger.texts(),
            vec![
                "Rust is a systems language focused on safety.".to_string(),
                "It has no garbage collector.".to_string(),
                "Want to know more?".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_first_bubble_replies_to_the_question() {
        let reply = "Rust is a systems language focused on safety. \
                     It has no garbage collector.";
        let h = Harness::new(DeliveryMode::Bubbles, FakeModel::ok(reply));

        route(&h.state, text_update("what is rust")).await.unwrap();

        let sends: Vec<Call> = h
            .messenger
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Typing))
            .collect();
        assert_eq!(
            sends,
            vec![
                Call::Reply(
                    QUESTION,
                    "Rust is a systems language focused on safety.".to_string()
                ),
                Call::Send("It has no garbage collector.".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_message_within_interval_is_rejected() {
        let h = Harness::new(DeliveryMode::Bubbles, FakeModel::ok("ok"));

        route(&h.state, text_update("one")).await.unwrap();
        route(&h.state, text_update("two")).await.unwrap();

        assert_eq!(h.model.calls(), 1);
        let texts = h.messenger.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[1].starts_with("⏳ Slow down"), "{texts:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn model_outage_sends_apology() {
        let h = Harness::new(DeliveryMode::Bubbles, FakeModel::down());

        route(&h.state, text_update("hello")).await.unwrap();

        assert_eq!(h.messenger.texts(), vec![APOLOGY.to_string()]);
        // Only the user turn is kept.
        assert_eq!(h.store.count(UserId::from(CHAT), true).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn edit_mode_streams_into_one_bubble() {
        let reply = "This reply is long enough to need three edits.";
        let h = Harness::new(DeliveryMode::Edit, FakeModel::ok(reply));

        route(&h.state, text_update("hello")).await.unwrap();

        let calls = h.messenger.calls();
        assert_eq!(h.messenger.texts(), vec!["…".to_string()]);
        assert_eq!(calls.last(), Some(&Call::Edit(reply.to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_placeholder_falls_back_to_plain_send() {
        let h = Harness::with_messenger(
            DeliveryMode::Edit,
            FakeModel::ok("Plain is fine."),
            FakeMessenger::failing_first_sends(1),
        );

        route(&h.state, text_update("hello")).await.unwrap();

        assert_eq!(
            h.messenger.calls().last(),
            Some(&Call::Reply(QUESTION, "Plain is fine.".to_string()))
        );
        assert_eq!(h.messenger.texts(), vec!["Plain is fine.".to_string()]);
        assert!(!h
            .messenger
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Edit(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn blank_text_is_ignored() {
        let h = Harness::new(DeliveryMode::Bubbles, FakeModel::ok("unused"));

        route(&h.state, text_update("   ")).await.unwrap();

        assert!(h.messenger.calls().is_empty());
        assert_eq!(h.model.calls(), 0);
    }
}
