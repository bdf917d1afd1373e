use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

use super::key::CacheKey;
use crate::models::{Conversation, Message};

/// A value held under a cache key.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Conversations(Vec<Conversation>),
    Messages(Vec<Message>),
}

/// Handle to an in-flight optimistic mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationId(u64);

#[derive(Debug, Error, PartialEq)]
pub enum MutationError {
    #[error("unknown mutation {0:?}")]
    UnknownMutation(MutationId),

    #[error("conversation {conversation_id} not found")]
    UnknownConversation { conversation_id: String },

    #[error("updater returned a value of the wrong kind for key {key}")]
    KindMismatch { key: String },
}

/// One pending mutation: the pre-state of every key it touched.
/// `None` records that the key was absent before the mutation.
#[derive(Debug)]
struct PendingMutation {
    id: u64,
    entries: Vec<(CacheKey, Option<CacheValue>)>,
}

/// The client-side source of truth for conversation records and message
/// lists, with optimistic mutation and snapshot/rollback.
///
/// Every mutation follows the same steps: cancel in-flight reads for the key
/// (epoch bump — stale fetches revalidate against [`Self::epoch`] before
/// applying), snapshot the current value, apply the update synchronously,
/// then `commit` discards the snapshot or `rollback` restores it exactly.
/// Overlapping mutations each capture their own pre-state.
///
/// The cache is an explicit object owned by the orchestrator — there is no
/// process-wide singleton, and only the orchestrator writes to it.
#[derive(Debug, Default)]
pub struct ConversationCache {
    conversations: Vec<Conversation>,
    messages: HashMap<String, Vec<Message>>,
    epochs: HashMap<CacheKey, u64>,
    pending: Vec<PendingMutation>,
    next_mutation_id: u64,
}

impl ConversationCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- reads ----

    /// Last known value for a key; `None` when the key is absent.
    pub fn read(&self, key: &CacheKey) -> Option<CacheValue> {
        match key {
            CacheKey::Conversations => {
                Some(CacheValue::Conversations(self.conversations.clone()))
            }
            CacheKey::Messages { conversation_id } => self
                .messages
                .get(conversation_id)
                .map(|m| CacheValue::Messages(m.clone())),
        }
    }

    /// Conversation records in cache order (newest created first).
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id() == id)
    }

    pub fn messages(&self, conversation_id: &str) -> Option<&[Message]> {
        self.messages.get(conversation_id).map(Vec::as_slice)
    }

    /// Records sorted by `updated_at` descending, for sidebar display.
    pub fn list_recent(&self) -> Vec<&Conversation> {
        let mut records: Vec<&Conversation> = self.conversations.iter().collect();
        records.sort_by_key(|c| std::cmp::Reverse(c.updated_at()));
        records
    }

    /// Read-cancellation epoch for a key. Bumped whenever a mutation (or
    /// rollback) touches the key; in-flight fetches compare epochs before
    /// applying their result.
    pub fn epoch(&self, key: &CacheKey) -> u64 {
        self.epochs.get(key).copied().unwrap_or(0)
    }

    // ---- generic mutation surface ----

    /// Apply an optimistic update to one key. The pre-state snapshot is
    /// captured automatically; the returned id resolves it via [`Self::commit`]
    /// or [`Self::rollback`].
    pub fn optimistic_write(
        &mut self,
        key: CacheKey,
        updater: impl FnOnce(Option<CacheValue>) -> CacheValue,
    ) -> Result<MutationId, MutationError> {
        let snapshot = self.read(&key);
        let next = updater(snapshot.clone());

        match (&key, &next) {
            (CacheKey::Conversations, CacheValue::Conversations(_)) => {}
            (CacheKey::Messages { .. }, CacheValue::Messages(_)) => {}
            _ => {
                return Err(MutationError::KindMismatch {
                    key: key.to_string(),
                });
            }
        }

        self.bump_epoch(&key);
        match next {
            CacheValue::Conversations(records) => self.conversations = records,
            CacheValue::Messages(list) => {
                let CacheKey::Messages { conversation_id } = &key else {
                    unreachable!("kind checked above");
                };
                self.messages.insert(conversation_id.clone(), list);
            }
        }

        Ok(self.push_pending(vec![(key, snapshot)]))
    }

    /// Confirm a mutation: the snapshot is discarded and the optimistic
    /// value stands.
    pub fn commit(&mut self, id: MutationId) -> Result<(), MutationError> {
        let pos = self
            .pending
            .iter()
            .position(|m| m.id == id.0)
            .ok_or(MutationError::UnknownMutation(id))?;
        self.pending.remove(pos);
        Ok(())
    }

    /// Restore the exact pre-mutation state of every key the mutation
    /// touched. Pending mutations applied after it on the same keys are
    /// discarded — their snapshots no longer describe reachable state.
    pub fn rollback(&mut self, id: MutationId) -> Result<(), MutationError> {
        let pos = self
            .pending
            .iter()
            .position(|m| m.id == id.0)
            .ok_or(MutationError::UnknownMutation(id))?;
        let mutation = self.pending.remove(pos);
        let keys: Vec<CacheKey> = mutation.entries.iter().map(|(k, _)| k.clone()).collect();

        for (key, snapshot) in mutation.entries {
            self.bump_epoch(&key);
            match (key, snapshot) {
                (CacheKey::Conversations, Some(CacheValue::Conversations(records))) => {
                    self.conversations = records;
                }
                (CacheKey::Conversations, _) => self.conversations = Vec::new(),
                (CacheKey::Messages { conversation_id }, Some(CacheValue::Messages(list))) => {
                    self.messages.insert(conversation_id, list);
                }
                (CacheKey::Messages { conversation_id }, _) => {
                    self.messages.remove(&conversation_id);
                }
            }
        }

        self.pending.retain(|m| {
            let superseded = m.id > id.0 && m.entries.iter().any(|(k, _)| keys.contains(k));
            if superseded {
                warn!(mutation = m.id, "pending mutation superseded by rollback");
            }
            !superseded
        });

        Ok(())
    }

    // ---- typed operations ----

    /// Create a conversation record (prepended, newest first) and initialize
    /// its empty message list. A rollback removes both: the record and the
    /// message-list entry, restoring the exact pre-mutation state.
    pub fn create_conversation(&mut self, conversation: Conversation) -> MutationId {
        let conv_key = CacheKey::Conversations;
        let msg_key = CacheKey::messages(conversation.id());
        let entries = vec![
            (
                conv_key.clone(),
                Some(CacheValue::Conversations(self.conversations.clone())),
            ),
            (
                msg_key.clone(),
                self.messages
                    .get(conversation.id())
                    .map(|m| CacheValue::Messages(m.clone())),
            ),
        ];

        self.bump_epoch(&conv_key);
        self.bump_epoch(&msg_key);
        self.messages
            .entry(conversation.id().to_string())
            .or_default();
        self.conversations.insert(0, conversation);

        self.push_pending(entries)
    }

    /// Unconditional tail-append; never reorders existing messages.
    pub fn append_message(&mut self, conversation_id: &str, message: Message) -> MutationId {
        let key = CacheKey::messages(conversation_id);
        let snapshot = self
            .messages
            .get(conversation_id)
            .map(|m| CacheValue::Messages(m.clone()));

        self.bump_epoch(&key);
        self.messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);

        self.push_pending(vec![(key, snapshot)])
    }

    /// Update a conversation title, bumping `updated_at`.
    pub fn update_title(
        &mut self,
        conversation_id: &str,
        title: String,
    ) -> Result<MutationId, MutationError> {
        self.update_record(conversation_id, |record| record.set_title(title))
    }

    /// Bump a conversation's `updated_at` (e.g. when a turn completes).
    pub fn touch(&mut self, conversation_id: &str) -> Result<MutationId, MutationError> {
        self.update_record(conversation_id, Conversation::touch)
    }

    fn update_record(
        &mut self,
        conversation_id: &str,
        update: impl FnOnce(&mut Conversation),
    ) -> Result<MutationId, MutationError> {
        if self.conversation(conversation_id).is_none() {
            return Err(MutationError::UnknownConversation {
                conversation_id: conversation_id.to_string(),
            });
        }

        let key = CacheKey::Conversations;
        let snapshot = Some(CacheValue::Conversations(self.conversations.clone()));
        self.bump_epoch(&key);
        if let Some(record) = self
            .conversations
            .iter_mut()
            .find(|c| c.id() == conversation_id)
        {
            update(record);
        }

        Ok(self.push_pending(vec![(key, snapshot)]))
    }

    // ---- hydration (server-confirmed or restored data, not mutations) ----

    /// Replace the record list with server-confirmed data.
    pub fn replace_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
    }

    /// Replace one conversation's message list with server-confirmed data.
    pub fn replace_messages(&mut self, conversation_id: &str, messages: Vec<Message>) {
        self.messages
            .insert(conversation_id.to_string(), messages);
    }

    /// Replace the whole cache contents (session restore).
    pub fn replace_all(
        &mut self,
        conversations: Vec<Conversation>,
        messages: HashMap<String, Vec<Message>>,
    ) {
        debug!(
            conversations = conversations.len(),
            "replacing cache contents"
        );
        self.conversations = conversations;
        self.messages = messages;
        self.pending.clear();
    }

    fn bump_epoch(&mut self, key: &CacheKey) {
        *self.epochs.entry(key.clone()).or_insert(0) += 1;
    }

    fn push_pending(&mut self, entries: Vec<(CacheKey, Option<CacheValue>)>) -> MutationId {
        self.next_mutation_id += 1;
        let id = self.next_mutation_id;
        self.pending.push(PendingMutation { id, entries });
        MutationId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_conversation(id: &str) -> ConversationCache {
        let mut cache = ConversationCache::new();
        let m = cache.create_conversation(Conversation::from_unix(id, "Test", 1000, 1000));
        cache.commit(m).unwrap();
        cache
    }

    #[test]
    fn test_read_back_yields_identical_object_graph() {
        let mut cache = cache_with_conversation("c-1");
        let m = cache.append_message("c-1", Message::user("Hello"));
        cache.commit(m).unwrap();

        let records = cache.read(&CacheKey::Conversations).unwrap();
        let messages = cache.read(&CacheKey::messages("c-1")).unwrap();

        assert_eq!(
            records,
            CacheValue::Conversations(cache.conversations().to_vec())
        );
        assert_eq!(
            messages,
            CacheValue::Messages(cache.messages("c-1").unwrap().to_vec())
        );
    }

    #[test]
    fn test_rollback_restores_exact_pre_mutation_state() {
        let mut cache = cache_with_conversation("c-1");
        let m = cache.append_message("c-1", Message::user("one"));
        cache.commit(m).unwrap();

        let before = cache.read(&CacheKey::messages("c-1"));
        let m = cache.append_message("c-1", Message::user("two"));
        assert_eq!(cache.messages("c-1").unwrap().len(), 2);

        cache.rollback(m).unwrap();
        assert_eq!(cache.read(&CacheKey::messages("c-1")), before);
    }

    #[test]
    fn test_rollback_of_create_removes_both_entries() {
        let mut cache = ConversationCache::new();
        let m = cache.create_conversation(Conversation::from_unix("c-1", "T", 1000, 1000));

        assert_eq!(cache.conversations().len(), 1);
        assert!(cache.messages("c-1").is_some());

        cache.rollback(m).unwrap();
        assert!(cache.conversations().is_empty());
        assert!(cache.messages("c-1").is_none());
        assert_eq!(cache.read(&CacheKey::messages("c-1")), None);
    }

    #[test]
    fn test_overlapping_mutations_capture_their_own_pre_state() {
        let mut cache = cache_with_conversation("c-1");
        let m1 = cache.append_message("c-1", Message::user("one"));
        let m2 = cache.append_message("c-1", Message::user("two"));

        // Rolling back the second leaves the first's write in place.
        cache.rollback(m2).unwrap();
        assert_eq!(cache.messages("c-1").unwrap().len(), 1);

        // Rolling back the first restores the empty list.
        cache.rollback(m1).unwrap();
        assert!(cache.messages("c-1").unwrap().is_empty());
    }

    #[test]
    fn test_rollback_discards_superseded_later_mutations() {
        let mut cache = cache_with_conversation("c-1");
        let m1 = cache.append_message("c-1", Message::user("one"));
        let m2 = cache.append_message("c-1", Message::user("two"));

        cache.rollback(m1).unwrap();
        assert!(cache.messages("c-1").unwrap().is_empty());

        // m2 was discarded along with m1's rollback.
        assert_eq!(cache.commit(m2), Err(MutationError::UnknownMutation(m2)));
    }

    #[test]
    fn test_commit_then_rollback_is_rejected() {
        let mut cache = cache_with_conversation("c-1");
        let m = cache.append_message("c-1", Message::user("one"));
        cache.commit(m).unwrap();
        assert_eq!(cache.rollback(m), Err(MutationError::UnknownMutation(m)));
    }

    #[test]
    fn test_update_title_bumps_updated_at() {
        let mut cache = cache_with_conversation("c-1");
        let before = cache.conversation("c-1").unwrap().updated_at();

        let m = cache.update_title("c-1", "Renamed".to_string()).unwrap();
        cache.commit(m).unwrap();

        let record = cache.conversation("c-1").unwrap();
        assert_eq!(record.title(), "Renamed");
        assert!(record.updated_at() >= before);
    }

    #[test]
    fn test_update_title_unknown_conversation() {
        let mut cache = ConversationCache::new();
        let err = cache.update_title("missing", "T".to_string()).unwrap_err();
        assert!(matches!(err, MutationError::UnknownConversation { .. }));
    }

    #[test]
    fn test_independent_conversations_never_interfere() {
        let mut cache = cache_with_conversation("c-1");
        let m = cache.create_conversation(Conversation::from_unix("c-2", "Other", 2000, 2000));
        cache.commit(m).unwrap();

        let m = cache.append_message("c-1", Message::user("for one"));
        cache.commit(m).unwrap();
        let m2 = cache.append_message("c-2", Message::user("for two"));

        cache.rollback(m2).unwrap();
        assert_eq!(cache.messages("c-1").unwrap().len(), 1);
        assert!(cache.messages("c-2").unwrap().is_empty());
    }

    #[test]
    fn test_mutation_bumps_epoch_for_its_key_only() {
        let mut cache = cache_with_conversation("c-1");
        let conversations_epoch = cache.epoch(&CacheKey::Conversations);
        let messages_epoch = cache.epoch(&CacheKey::messages("c-1"));

        let m = cache.append_message("c-1", Message::user("Hello"));
        cache.commit(m).unwrap();

        assert_eq!(cache.epoch(&CacheKey::Conversations), conversations_epoch);
        assert_eq!(cache.epoch(&CacheKey::messages("c-1")), messages_epoch + 1);
    }

    #[test]
    fn test_optimistic_write_rejects_wrong_kind() {
        let mut cache = ConversationCache::new();
        let err = cache
            .optimistic_write(CacheKey::Conversations, |_| CacheValue::Messages(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, MutationError::KindMismatch { .. }));
    }

    #[test]
    fn test_create_conversation_prepends() {
        let mut cache = cache_with_conversation("c-1");
        let m = cache.create_conversation(Conversation::from_unix("c-2", "Newer", 2000, 2000));
        cache.commit(m).unwrap();

        let ids: Vec<&str> = cache.conversations().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["c-2", "c-1"]);
    }

    #[test]
    fn test_append_never_reorders() {
        let mut cache = cache_with_conversation("c-1");
        for text in ["a", "b", "c"] {
            let m = cache.append_message("c-1", Message::user(text));
            cache.commit(m).unwrap();
        }
        let texts: Vec<String> = cache
            .messages("c-1")
            .unwrap()
            .iter()
            .map(Message::text)
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }
}
