//! Pending interactive prompts
//!
//! One prompt per user, tagged with a fresh token each time it is opened. A
//! timer only expires the prompt it was started for; completing or reopening
//! the prompt changes the token and turns the old timer into a no-op.

use dashmap::DashMap;
use serenity::all::UserId;
use std::time::Duration;
use uuid::Uuid;

/// Per-user transient state with cooperative timeouts
#[derive(Debug)]
pub struct PendingPrompts<T> {
    pending: DashMap<UserId, (Uuid, T)>,
}

impl<T> Default for PendingPrompts<T> {
    fn default() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }
}

impl<T> PendingPrompts<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a prompt for `user`, replacing any previous one
    pub fn open(&self, user: UserId, value: T) -> Uuid {
        let token = Uuid::new_v4();
        self.pending.insert(user, (token, value));
        token
    }

    /// Complete the prompt of `user`
    pub fn take(&self, user: UserId) -> Option<T> {
        self.pending.remove(&user).map(|(_, (_, value))| value)
    }

    /// Remove the prompt of `user` only if it is still the one tagged `token`
    pub fn expire(&self, user: UserId, token: Uuid) -> Option<T> {
        self.pending
            .remove_if(&user, |_, (current, _)| *current == token)
            .map(|(_, (_, value))| value)
    }

    /// Wait `after`, then expire the prompt tagged `token`
    pub async fn expire_after(&self, user: UserId, token: Uuid, after: Duration) -> Option<T> {
        tokio::time::sleep(after).await;
        self.expire(user, token)
    }

    #[must_use]
    pub fn is_pending(&self, user: UserId) -> bool {
        self.pending.contains_key(&user)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
