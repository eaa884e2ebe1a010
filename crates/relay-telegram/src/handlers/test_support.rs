use std::sync::{
    atomic::{AtomicI32, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;

use relay_core::{
    context::{InMemoryContextStore, WindowPolicy},
    conversation::Conversation,
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, TextMessage},
    },
    model::{client::CompletionClient, types::ChatMessage},
    rate_limit::RateLimiter,
    streaming::{DeliveryConfig, DeliveryMode, StreamingDelivery},
    Result,
};

use super::Incoming;
use crate::router::AppState;

pub const CHAT: ChatId = ChatId(42);
/// Id of the user's message in `text_update`.
pub const QUESTION: MessageId = MessageId(7);

pub fn text_update(text: &str) -> Incoming {
    Incoming::Text(TextMessage {
        chat_id: CHAT,
        message_id: Some(QUESTION),
        user_id: UserId::from(CHAT),
        username: Some("alice".to_string()),
        text: text.to_string(),
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Send(String),
    Reply(MessageId, String),
    Edit(String),
    Typing,
}

#[derive(Default)]
pub struct FakeMessenger {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI32,
    /// Number of leading sends (plain or reply) that fail.
    fail_first_sends: AtomicUsize,
}

impl FakeMessenger {
    pub fn failing_first_sends(n: usize) -> Self {
        Self {
            fail_first_sends: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record_send(&self, chat_id: ChatId, call: Call) -> Result<MessageRef> {
        let remaining = self.fail_first_sends.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first_sends.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::External("telegram error: bad gateway".to_string()));
        }
        self.calls.lock().unwrap().push(call);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(id),
        })
    }

    /// Texts of successful sends and replies, in order.
    pub fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send(t) | Call::Reply(_, t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_edit: true,
            supports_chat_actions: true,
            max_message_len: 4096,
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.record_send(chat_id, Call::Send(text.to_string()))
    }

    async fn send_reply(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        text: &str,
    ) -> Result<MessageRef> {
        self.record_send(chat_id, Call::Reply(reply_to, text.to_string()))
    }

    async fn edit_text(&self, _msg: MessageRef, text: &str) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Edit(text.to_string()));
        Ok(())
    }

    async fn show_typing(&self, _chat_id: ChatId) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Typing);
        Ok(())
    }
}

pub struct FakeModel {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl FakeModel {
    pub fn ok(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn down() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for FakeModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .ok_or_else(|| Error::ModelUnavailable("connect timeout".to_string()))
    }
}

pub struct Harness {
    pub state: AppState,
    pub messenger: Arc<FakeMessenger>,
    pub model: Arc<FakeModel>,
    pub store: Arc<InMemoryContextStore>,
}

impl Harness {
    pub fn new(mode: DeliveryMode, model: FakeModel) -> Self {
        Self::with_messenger(mode, model, FakeMessenger::default())
    }

    pub fn with_messenger(mode: DeliveryMode, model: FakeModel, messenger: FakeMessenger) -> Self {
        let messenger = Arc::new(messenger);
        let model = Arc::new(model);
        let store = Arc::new(InMemoryContextStore::new());
        let conversation = Arc::new(Conversation::new(
            store.clone(),
            model.clone(),
            WindowPolicy::default(),
        ));

        let state = AppState {
            conversation,
            messenger: messenger.clone(),
            delivery: StreamingDelivery::new(DeliveryConfig::default()),
            delivery_mode: mode,
            rate_limiter: Arc::new(tokio::sync::Mutex::new(RateLimiter::new(
                true,
                std::time::Duration::from_secs(1),
            ))),
        };

        Self {
            state,
            messenger,
            model,
            store,
        }
    }
}
