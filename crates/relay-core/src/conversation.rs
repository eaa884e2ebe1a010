//! One conversational exchange: log the user turn, build the prompt window, ask
//! the model, log the reply.
//!
//! Storage and model failures stop here. The caller always gets text to deliver.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    context::{ContextStore, ResetMode, WindowPolicy},
    domain::UserId,
    errors::Error,
    model::{
        client::CompletionClient,
        types::{ChatMessage, Speaker},
    },
    Result,
};

/// Sent instead of a reply when the completion call fails.
pub const APOLOGY: &str = "Sorry, I couldn’t reach the AI right now. Please try again.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// `false` when `text` is the apology.
    pub from_model: bool,
    /// History could not be read or written for this exchange.
    pub history_degraded: bool,
}

pub struct Conversation {
    store: Arc<dyn ContextStore>,
    model: Arc<dyn CompletionClient>,
    window: WindowPolicy,
    system_prompt: Option<String>,
}

impl Conversation {
    pub fn new(
        store: Arc<dyn ContextStore>,
        model: Arc<dyn CompletionClient>,
        window: WindowPolicy,
    ) -> Self {
        Self {
            store,
            model,
            window,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub async fn respond(&self, user_id: UserId, text: &str) -> Reply {
        let mut degraded = false;

        let user_logged = match self.store.append(user_id, Speaker::User, text).await {
            Ok(_) => true,
            Err(e) => {
                warn!(%user_id, error = %e, "could not store user turn; replying without history");
                degraded = true;
                false
            }
        };

        let history = if user_logged {
            match self
                .store
                .window(user_id, self.window.token_budget, self.window.max_turns)
                .await
            {
                Ok(h) => h,
                Err(e) => {
                    warn!(%user_id, error = %e, "could not read history; replying without it");
                    degraded = true;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let prompt = compose_prompt(self.system_prompt.as_deref(), history, text);
        debug!(%user_id, messages = prompt.len(), "requesting completion");

        let reply = match self.model.complete(&prompt).await {
            Ok(r) if r.trim().is_empty() => Err(Error::ModelError("empty completion".to_string())),
            other => other,
        };

        match reply {
            Ok(reply) => {
                if user_logged {
                    if let Err(e) = self
                        .store
                        .append(user_id, Speaker::Assistant, &reply)
                        .await
                    {
                        warn!(%user_id, error = %e, "could not store assistant turn");
                        degraded = true;
                    }
                }
                Reply {
                    text: reply,
                    from_model: true,
                    history_degraded: degraded,
                }
            }
            Err(e) => {
                warn!(%user_id, error = %e, "completion failed; sending apology");
                Reply {
                    text: APOLOGY.to_string(),
                    from_model: false,
                    history_degraded: degraded,
                }
            }
        }
    }

    pub async fn reset(&self, user_id: UserId, mode: ResetMode) -> Result<u64> {
        let n = self.store.reset(user_id, mode).await?;
        info!(%user_id, ?mode, turns = n, "conversation reset");
        Ok(n)
    }
}

/// Optional system prompt, then history, with the current user message last.
///
/// The history normally already ends with the current message. It does not when
/// the message alone exceeds the token budget or history is unavailable; in both
/// cases the message is sent on its own.
pub fn compose_prompt(
    system_prompt: Option<&str>,
    history: Vec<ChatMessage>,
    current: &str,
) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(history.len() + 2);
    if let Some(sys) = system_prompt {
        out.push(ChatMessage::system(sys));
    }

    let current = ChatMessage::user(current);
    let ends_with_current = history.last() == Some(&current);
    out.extend(history);
    if !ends_with_current {
        out.push(current);
    }
    out
}
