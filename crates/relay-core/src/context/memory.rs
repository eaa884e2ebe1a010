use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    context::{approx_tokens, ContextStore, ResetMode, Turn},
    domain::UserId,
    model::types::Speaker,
    Result,
};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    turns: HashMap<UserId, Vec<Turn>>,
}

/// Process-lifetime turn log, used when no database is configured.
///
/// Each user's turns are kept in insertion order, and `created_at` never goes
/// backwards within a user, so iteration order matches `(created_at, id)`.
#[derive(Debug, Default)]
pub struct InMemoryContextStore {
    state: Mutex<MemoryState>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn append(&self, user_id: UserId, role: Speaker, text: &str) -> Result<Turn> {
        let mut st = self.state.lock().await;
        st.next_id += 1;
        let id = st.next_id;

        let log = st.turns.entry(user_id).or_default();
        let mut created_at = Utc::now();
        if let Some(last) = log.last() {
            created_at = created_at.max(last.created_at);
        }

        let turn = Turn {
            id,
            user_id,
            role,
            text: text.to_string(),
            approx_tokens: approx_tokens(text),
            created_at,
            archived: false,
        };
        log.push(turn.clone());
        Ok(turn)
    }

    async fn recent(&self, user_id: UserId, limit: usize) -> Result<Vec<Turn>> {
        let st = self.state.lock().await;
        let Some(log) = st.turns.get(&user_id) else {
            return Ok(Vec::new());
        };
        Ok(log
            .iter()
            .rev()
            .filter(|t| !t.archived)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn reset(&self, user_id: UserId, mode: ResetMode) -> Result<u64> {
        let mut st = self.state.lock().await;
        let affected = match mode {
            ResetMode::Hard => st.turns.remove(&user_id).map(|v| v.len()).unwrap_or(0),
            ResetMode::Soft => match st.turns.get_mut(&user_id) {
                Some(log) => {
                    for t in log.iter_mut() {
                        t.archived = true;
                    }
                    log.len()
                }
                None => 0,
            },
        };
        Ok(affected as u64)
    }

    async fn count(&self, user_id: UserId, include_archived: bool) -> Result<u64> {
        let st = self.state.lock().await;
        let n = st
            .turns
            .get(&user_id)
            .map(|log| {
                log.iter()
                    .filter(|t| include_archived || !t.archived)
                    .count()
            })
            .unwrap_or(0);
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::ChatMessage;

    const U: UserId = UserId(42);

    #[tokio::test]
    async fn window_ends_with_latest_append() {
        let store = InMemoryContextStore::new();
        store.append(U, Speaker::User, "hello").await.unwrap();
        store.append(U, Speaker::Assistant, "hi there").await.unwrap();
        let t = store.append(U, Speaker::User, "how are you?").await.unwrap();
        assert_eq!(t.approx_tokens, 3);
        assert!(!t.archived);

        let w = store.window(U, 1500, 200).await.unwrap();
        assert_eq!(w.len(), 3);
        assert_eq!(w.last(), Some(&ChatMessage::user("how are you?")));
        assert_eq!(w.first(), Some(&ChatMessage::user("hello")));
    }

    #[tokio::test]
    async fn max_turns_caps_the_fetch() {
        let store = InMemoryContextStore::new();
        for i in 0..10 {
            store.append(U, Speaker::User, &format!("m{i}")).await.unwrap();
        }
        let w = store.window(U, 1500, 3).await.unwrap();
        let contents: Vec<&str> = w.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m7", "m8", "m9"]);
    }

    #[tokio::test]
    async fn hard_reset_empties_window_and_storage() {
        let store = InMemoryContextStore::new();
        store.append(U, Speaker::User, "a").await.unwrap();
        store.append(U, Speaker::Assistant, "b").await.unwrap();

        assert_eq!(store.reset(U, ResetMode::Hard).await.unwrap(), 2);
        assert!(store.window(U, 1500, 200).await.unwrap().is_empty());
        assert_eq!(store.count(U, true).await.unwrap(), 0);

        // Idempotent.
        assert_eq!(store.reset(U, ResetMode::Hard).await.unwrap(), 0);
        assert!(store.window(U, 1500, 200).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn soft_reset_hides_turns_but_keeps_rows() {
        let store = InMemoryContextStore::new();
        store.append(U, Speaker::User, "a").await.unwrap();
        store.append(U, Speaker::Assistant, "b").await.unwrap();

        store.reset(U, ResetMode::Soft).await.unwrap();
        store.reset(U, ResetMode::Soft).await.unwrap();
        assert!(store.window(U, 1500, 200).await.unwrap().is_empty());
        assert_eq!(store.count(U, true).await.unwrap(), 2);
        assert_eq!(store.count(U, false).await.unwrap(), 0);

        // New turns after a soft reset start a fresh window.
        store.append(U, Speaker::User, "again").await.unwrap();
        let w = store.window(U, 1500, 200).await.unwrap();
        assert_eq!(w, vec![ChatMessage::user("again")]);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let store = InMemoryContextStore::new();
        store.append(UserId(1), Speaker::User, "one").await.unwrap();
        store.append(UserId(2), Speaker::User, "two").await.unwrap();

        store.reset(UserId(1), ResetMode::Hard).await.unwrap();
        assert_eq!(
            store.window(UserId(2), 1500, 200).await.unwrap(),
            vec![ChatMessage::user("two")]
        );
        assert_eq!(store.reset(UserId(3), ResetMode::Soft).await.unwrap(), 0);
    }
}
