//! Conversation turn log and budgeted context windows.
//!
//! Stores only persist and fetch turns; choosing which turns fit in a token
//! budget is [`select_window`], shared by every backend.

mod memory;

pub use memory::InMemoryContextStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::UserId,
    model::types::{ChatMessage, Speaker},
    Result,
};

pub const DEFAULT_TOKEN_BUDGET: u32 = 1500;
pub const DEFAULT_MAX_TURNS: usize = 200;

/// One stored conversation message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    /// Insertion order; breaks `created_at` ties.
    pub id: i64,
    pub user_id: UserId,
    pub role: Speaker,
    pub text: String,
    pub approx_tokens: u32,
    pub created_at: DateTime<Utc>,
    pub archived: bool,
}

impl Turn {
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::new(self.role.into(), self.text.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetMode {
    /// Delete every turn for the user.
    Hard,
    /// Mark every turn archived; rows stay in storage.
    Soft,
}

/// How much history a prompt may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowPolicy {
    pub token_budget: u32,
    pub max_turns: usize,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            token_budget: DEFAULT_TOKEN_BUDGET,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

/// Cheap character-based token estimate: `ceil(chars / 4)`.
pub fn approx_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

/// Pick the newest turns that fit in `token_budget`, returned oldest first.
///
/// `newest_first` must already be ordered newest to oldest. The walk stops at the
/// first turn that would push the total above the budget, so an oversized newest
/// turn yields an empty window.
pub fn select_window(newest_first: &[Turn], token_budget: u32) -> Vec<ChatMessage> {
    let budget = u64::from(token_budget);
    let mut running = 0u64;
    let mut chosen = Vec::new();

    for turn in newest_first {
        let cost = u64::from(turn.approx_tokens);
        if running + cost > budget {
            break;
        }
        running += cost;
        chosen.push(turn.to_message());
    }

    chosen.reverse();
    chosen
}

/// Append-only turn log with a budgeted reader.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Persist a new, non-archived turn.
    async fn append(&self, user_id: UserId, role: Speaker, text: &str) -> Result<Turn>;

    /// Up to `limit` most recent non-archived turns, newest first.
    async fn recent(&self, user_id: UserId, limit: usize) -> Result<Vec<Turn>>;

    /// Hard-delete or archive every turn of `user_id`. Returns affected rows.
    async fn reset(&self, user_id: UserId, mode: ResetMode) -> Result<u64>;

    /// Row count for `user_id`, optionally including archived turns.
    async fn count(&self, user_id: UserId, include_archived: bool) -> Result<u64>;

    /// Chronological `{role, content}` history that fits in `token_budget`.
    async fn window(
        &self,
        user_id: UserId,
        token_budget: u32,
        max_turns: usize,
    ) -> Result<Vec<ChatMessage>> {
        let recent = self.recent(user_id, max_turns).await?;
        Ok(select_window(&recent, token_budget))
    }
}
