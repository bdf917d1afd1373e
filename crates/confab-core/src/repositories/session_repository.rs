use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use super::error::RepositoryResult;
use crate::cache::ConversationCache;
use crate::models::{Conversation, Message, now_unix};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Serializable conversation data for persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationData {
    pub id: String,
    pub title: String,
    pub messages: String, // JSON-serialized Vec<Message>
    pub created_at: i64,  // Unix timestamp
    pub updated_at: i64,  // Unix timestamp
}

impl ConversationData {
    pub fn from_parts(
        conversation: &Conversation,
        messages: &[Message],
    ) -> RepositoryResult<Self> {
        Ok(Self {
            id: conversation.id().to_string(),
            title: conversation.title().to_string(),
            messages: serde_json::to_string(messages)?,
            created_at: conversation.created_at_unix(),
            updated_at: conversation.updated_at_unix(),
        })
    }

    pub fn into_parts(self) -> RepositoryResult<(Conversation, Vec<Message>)> {
        let messages: Vec<Message> = serde_json::from_str(&self.messages)?;
        let conversation =
            Conversation::from_unix(self.id, self.title, self.created_at, self.updated_at);
        Ok((conversation, messages))
    }
}

/// One persisted session: the cache contents plus the save instant, used to
/// expire sessions past their maximum age.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub saved_at: i64, // Unix timestamp
    #[serde(default)]
    pub conversations: Vec<ConversationData>,
}

impl SessionData {
    /// Capture the current cache contents.
    pub fn capture(cache: &ConversationCache) -> RepositoryResult<Self> {
        let mut conversations = Vec::with_capacity(cache.conversations().len());
        for conversation in cache.conversations() {
            let messages = cache.messages(conversation.id()).unwrap_or(&[]);
            conversations.push(ConversationData::from_parts(conversation, messages)?);
        }
        Ok(Self {
            saved_at: now_unix(),
            conversations,
        })
    }

    /// Decompose into cache contents, preserving record order.
    pub fn into_cache_contents(
        self,
    ) -> RepositoryResult<(Vec<Conversation>, HashMap<String, Vec<Message>>)> {
        let mut conversations = Vec::with_capacity(self.conversations.len());
        let mut messages = HashMap::new();
        for data in self.conversations {
            let (conversation, list) = data.into_parts()?;
            messages.insert(conversation.id().to_string(), list);
            conversations.push(conversation);
        }
        Ok((conversations, messages))
    }

    /// Seconds elapsed since this session was saved.
    pub fn age_secs(&self, now: i64) -> i64 {
        (now - self.saved_at).max(0)
    }
}

/// Repository trait for session persistence
pub trait SessionRepository: Send + Sync + 'static {
    /// Load the persisted session, if a fresh one exists.
    fn load(&self) -> BoxFuture<'static, RepositoryResult<Option<SessionData>>>;

    /// Save a session to storage.
    fn save(&self, data: SessionData) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Remove the persisted session.
    fn clear(&self) -> BoxFuture<'static, RepositoryResult<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_and_restore_round_trip() {
        let mut cache = ConversationCache::new();
        let m = cache.create_conversation(Conversation::from_unix("c-1", "Hello", 1000, 1100));
        cache.commit(m).unwrap();
        let m = cache.append_message("c-1", Message::user("Hello"));
        cache.commit(m).unwrap();

        let data = SessionData::capture(&cache).unwrap();
        assert_eq!(data.conversations.len(), 1);

        let (conversations, messages) = data.into_cache_contents().unwrap();
        assert_eq!(conversations, cache.conversations().to_vec());
        assert_eq!(
            messages.get("c-1").map(Vec::as_slice),
            cache.messages("c-1")
        );
    }

    #[test]
    fn test_age_is_non_negative() {
        let data = SessionData {
            saved_at: 1000,
            conversations: Vec::new(),
        };
        assert_eq!(data.age_secs(1500), 500);
        assert_eq!(data.age_secs(500), 0);
    }
}
