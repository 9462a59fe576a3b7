//! In-memory session store.
//!
//! Each user gets a slot guarded by an async mutex. Every operation on a
//! user's session happens while holding that slot, so events for the same
//! user are serialized while different users proceed in parallel.
//!
//! Slots exist only while a session exists or someone is holding or waiting
//! on them. Read-only lookups never create one, and a slot left empty is
//! pruned when its last guard is released.

use super::types::{MessageRole, Session};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use helpdesk_common::ReplyRole;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<Option<Session>>>;
type Slots = DashMap<String, Slot>;

/// Owned registry of per-user sessions.
pub struct SessionStore {
    slots: Slots,
    system_prompt: String,
    reply_role: MessageRole,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new(system_prompt: impl Into<String>, reply_role: ReplyRole) -> Self {
        Self {
            slots: DashMap::new(),
            system_prompt: system_prompt.into(),
            reply_role: reply_role.into(),
        }
    }

    /// Number of users with a session or an operation in flight.
    pub fn active_users(&self) -> usize {
        self.slots.len()
    }

    /// Acquire exclusive access to a user's session, allocating the slot if needed.
    pub async fn lock(&self, user_id: &str) -> SessionGuard<'_> {
        // Clone out of the map so the shard lock is released before awaiting.
        let slot = self.slots.entry(user_id.to_string()).or_default().clone();
        self.acquire(user_id, slot).await
    }

    /// Like [`lock`](Self::lock), but `None` when the user has no slot.
    pub async fn lock_existing(&self, user_id: &str) -> Option<SessionGuard<'_>> {
        let slot = self.slots.get(user_id).map(|slot| slot.value().clone())?;
        Some(self.acquire(user_id, slot).await)
    }

    async fn acquire(&self, user_id: &str, slot: Slot) -> SessionGuard<'_> {
        SessionGuard {
            guard: slot.lock_owned().await,
            pruner: SlotPruner {
                slots: &self.slots,
                user_id: user_id.to_string(),
            },
            system_prompt: &self.system_prompt,
            reply_role: self.reply_role,
        }
    }

    /// Create a session for `user_id` if none exists.
    pub async fn ensure(&self, user_id: &str, now: DateTime<Utc>) {
        self.lock(user_id).await.ensure(now);
    }

    /// Snapshot of the user's session.
    pub async fn get(&self, user_id: &str) -> Option<Session> {
        self.lock_existing(user_id).await?.session().cloned()
    }

    /// Append a user turn.
    pub async fn append_user_turn(&self, user_id: &str, text: &str, timestamp: DateTime<Utc>) {
        self.lock(user_id).await.append_user_turn(text, timestamp);
    }

    /// Append a model reply.
    pub async fn append_bot_turn(&self, user_id: &str, text: &str, timestamp: DateTime<Utc>) {
        self.lock(user_id).await.append_bot_turn(text, timestamp);
    }

    /// Remove the user's session. Returns `false` if there was nothing to clear.
    pub async fn clear(&self, user_id: &str) -> bool {
        match self.lock_existing(user_id).await {
            Some(mut guard) => guard.clear(),
            None => false,
        }
    }
}

/// Exclusive handle on one user's session slot.
pub struct SessionGuard<'a> {
    // Declared before `pruner`: the mutex must be released before pruning runs.
    guard: OwnedMutexGuard<Option<Session>>,
    pruner: SlotPruner<'a>,
    system_prompt: &'a str,
    reply_role: MessageRole,
}

impl SessionGuard<'_> {
    /// Current session, if any.
    pub fn session(&self) -> Option<&Session> {
        self.guard.as_ref()
    }

    /// Create the session if absent and return it.
    pub fn ensure(&mut self, now: DateTime<Utc>) -> &mut Session {
        let system_prompt = self.system_prompt;
        let user_id = &self.pruner.user_id;
        self.guard.get_or_insert_with(|| {
            tracing::debug!(user_id = %user_id, "Session created");
            Session::new(system_prompt, now)
        })
    }

    /// Append a user turn, creating the session first if needed.
    pub fn append_user_turn(&mut self, text: &str, timestamp: DateTime<Utc>) {
        self.ensure(timestamp).push_user(text, timestamp);
    }

    /// Append a model reply, creating the session first if needed.
    pub fn append_bot_turn(&mut self, text: &str, timestamp: DateTime<Utc>) {
        let role = self.reply_role;
        self.ensure(timestamp).push_bot(text, timestamp, role);
    }

    /// Discard the session as a whole.
    pub fn clear(&mut self) -> bool {
        let existed = self.guard.take().is_some();
        if existed {
            tracing::debug!(user_id = %self.pruner.user_id, "Session cleared");
        }
        existed
    }
}

/// Drops the user's slot once it is empty and unreferenced.
struct SlotPruner<'a> {
    slots: &'a Slots,
    user_id: String,
}

impl Drop for SlotPruner<'_> {
    fn drop(&mut self) {
        // A count of one means only the map holds the slot: no guard, no waiter.
        self.slots.remove_if(&self.user_id, |_, slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|session| session.is_none())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::{HistoryRole, PromptMessage};
    use std::time::Duration;

    fn store() -> SessionStore {
        SessionStore::new("support prompt", ReplyRole::Assistant)
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let store = store();
        let now = Utc::now();
        store.ensure("42", now).await;
        store.append_user_turn("42", "hello", now).await;
        store.ensure("42", now).await;

        let session = store.get("42").await.unwrap();
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn get_without_session_is_none() {
        assert!(store().get("nobody").await.is_none());
    }

    #[tokio::test]
    async fn turns_are_recorded_in_both_lists() {
        let store = store();
        let now = Utc::now();
        store.ensure("7", now).await;
        store.append_user_turn("7", "A", now).await;
        store.append_bot_turn("7", "B", now).await;

        let session = store.get("7").await.unwrap();
        assert_eq!(session.messages()[0], PromptMessage::system("support prompt"));
        assert_eq!(session.messages()[1], PromptMessage::user("A"));
        assert_eq!(session.messages()[2].role, MessageRole::Assistant);
        let roles: Vec<_> = session.history().iter().map(|h| h.role).collect();
        assert_eq!(roles, vec![HistoryRole::System, HistoryRole::User, HistoryRole::Bot]);
    }

    #[tokio::test]
    async fn legacy_reply_role_tags_replies_as_system() {
        let store = SessionStore::new("sys", ReplyRole::System);
        store.append_bot_turn("1", "reply", Utc::now()).await;
        let session = store.get("1").await.unwrap();
        assert_eq!(session.messages()[1].role, MessageRole::System);
    }

    #[tokio::test]
    async fn append_without_ensure_creates_session() {
        let store = store();
        store.append_user_turn("9", "hi", Utc::now()).await;
        let session = store.get("9").await.unwrap();
        assert_eq!(session.history()[0].role, HistoryRole::System);
        assert_eq!(session.history()[1].text, "hi");
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let store = store();
        store.ensure("5", Utc::now()).await;
        assert!(store.clear("5").await);
        assert!(!store.clear("5").await);
        assert!(store.get("5").await.is_none());
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let store = store();
        let now = Utc::now();
        store.append_user_turn("a", "from a", now).await;
        store.ensure("b", now).await;
        store.clear("a").await;

        assert!(store.get("a").await.is_none());
        assert_eq!(store.get("b").await.unwrap().turns(), 0);
    }

    #[tokio::test]
    async fn lock_serializes_same_user() {
        let store = Arc::new(store());
        let mut guard = store.lock("1").await;
        guard.append_user_turn("first", Utc::now());

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                store.append_user_turn("1", "second", Utc::now()).await;
            })
        };

        // The contender cannot interleave while the guard is held
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        guard.append_bot_turn("reply to first", Utc::now());
        drop(guard);

        contender.await.unwrap();
        let texts: Vec<_> = store
            .get("1")
            .await
            .unwrap()
            .history()
            .iter()
            .map(|h| h.text.clone())
            .collect();
        assert_eq!(texts[1..], ["first", "reply to first", "second"]);
    }

    #[tokio::test]
    async fn lookups_of_unknown_users_allocate_nothing() {
        let store = store();
        for i in 0..100 {
            let user = i.to_string();
            assert!(store.get(&user).await.is_none());
            assert!(!store.clear(&user).await);
            assert!(store.lock_existing(&user).await.is_none());
        }
        assert_eq!(store.slots.len(), 0);
    }

    #[tokio::test]
    async fn cleared_session_releases_its_slot() {
        let store = store();
        store.append_user_turn("1", "hello", Utc::now()).await;
        store.ensure("2", Utc::now()).await;
        assert_eq!(store.slots.len(), 2);

        assert!(store.clear("1").await);
        assert_eq!(store.slots.len(), 1);

        // A guard that never created a session leaves nothing behind
        drop(store.lock("3").await);
        assert_eq!(store.slots.len(), 1);
    }

    #[tokio::test]
    async fn waiting_contender_keeps_slot_alive() {
        let store = Arc::new(store());
        store.ensure("1", Utc::now()).await;
        let mut guard = store.lock("1").await;

        let contender = {
            let store = store.clone();
            tokio::spawn(async move { store.append_user_turn("1", "after clear", Utc::now()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The contender holds a reference, so clearing must not drop the slot
        assert!(guard.clear());
        drop(guard);
        assert_eq!(store.slots.len(), 1);

        contender.await.unwrap();
        let session = store.get("1").await.unwrap();
        assert_eq!(session.history()[1].text, "after clear");
    }

    #[tokio::test]
    async fn lock_does_not_block_other_users() {
        let store = store();
        let _held = store.lock("1").await;
        let other = tokio::time::timeout(Duration::from_millis(100), store.lock("2")).await;
        assert!(other.is_ok());
    }
}
