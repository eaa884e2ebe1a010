use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::types::MessagingCapabilities,
    Result,
};

/// Messaging sink used by delivery and the update handlers.
///
/// Every call may fail; callers decide whether a failure is fatal. Text is sent
/// as-is (no markup), since model replies are not escaped HTML.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    /// Send `text` threaded under the user's message `reply_to`.
    ///
    /// Messengers without threading send a plain message.
    async fn send_reply(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        text: &str,
    ) -> Result<MessageRef> {
        let _ = reply_to;
        self.send_text(chat_id, text).await
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()>;
    async fn show_typing(&self, chat_id: ChatId) -> Result<()>;
}
