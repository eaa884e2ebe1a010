/// Core error type for the relay.
///
/// Adapter crates map their specific errors (sqlx, reqwest, teloxide) into this
/// type so the handler can pick the right fallback: degrade, apologise, skip or
/// re-send.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// The turn log cannot be read or written.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Transport failure, timeout or 5xx from the completion endpoint.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// The completion endpoint answered, but the answer is unusable.
    #[error("model error: {0}")]
    ModelError(String),

    /// One bubble, edit or typing call failed; delivery went on without it.
    #[error("delivery chunk {index} failed: {reason}")]
    DeliveryChunkFailed { index: usize, reason: String },

    /// The edit-mode placeholder could not be sent, so there is nothing to edit.
    #[error("delivery init failed: {0}")]
    DeliveryInitFailed(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
