use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::domain::UserId;

/// Per-user minimum spacing between accepted messages.
///
/// Keyed in-memory state with process lifetime, owned by the application state
/// and shared behind a mutex. Throttling is approximate: two updates for the same
/// user racing through different tasks may both pass.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    enabled: bool,
    min_interval: Duration,
    last_accepted: HashMap<UserId, Instant>,
}

impl RateLimiter {
    pub fn new(enabled: bool, min_interval: Duration) -> Self {
        Self {
            enabled,
            min_interval,
            last_accepted: HashMap::new(),
        }
    }

    pub fn check(&mut self, user_id: UserId) -> (bool, Option<Duration>) {
        self.check_at(user_id, Instant::now())
    }

    /// Accept and record the message, or reject it with the remaining wait.
    ///
    /// Rejected messages do not move the window.
    pub fn check_at(&mut self, user_id: UserId, now: Instant) -> (bool, Option<Duration>) {
        if !self.enabled {
            return (true, None);
        }

        if let Some(&last) = self.last_accepted.get(&user_id) {
            let since = now.saturating_duration_since(last);
            if since < self.min_interval {
                return (false, Some(self.min_interval - since));
            }
        }

        self.last_accepted.insert(user_id, now);
        (true, None)
    }

    pub fn evict_idle(&mut self, idle: Duration) -> usize {
        self.evict_idle_at(idle, Instant::now())
    }

    /// Drop users idle for longer than `idle`. Returns how many were evicted.
    pub fn evict_idle_at(&mut self, idle: Duration, now: Instant) -> usize {
        let before = self.last_accepted.len();
        self.last_accepted
            .retain(|_, last| now.saturating_duration_since(*last) <= idle);
        before - self.last_accepted.len()
    }

    pub fn tracked_users(&self) -> usize {
        self.last_accepted.len()
    }
}
