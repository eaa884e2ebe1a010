use async_trait::async_trait;

use crate::Result;

use super::types::ChatMessage;

/// Opaque completion function: chronological messages in, reply text out.
///
/// Implementations return `Error::ModelUnavailable` when the endpoint cannot be
/// reached and `Error::ModelError` when the answer is malformed or empty.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}
