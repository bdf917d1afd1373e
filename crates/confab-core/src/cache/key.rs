use std::fmt;

/// Hierarchical cache key.
///
/// Keys are conversation-scoped: the record list and each conversation's
/// message list are independent entries, so mutations on one conversation
/// never interfere with another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The ordered list of conversation records.
    Conversations,
    /// The message list of one conversation.
    Messages { conversation_id: String },
}

impl CacheKey {
    pub fn messages(conversation_id: impl Into<String>) -> Self {
        CacheKey::Messages {
            conversation_id: conversation_id.into(),
        }
    }

    /// The key's path segments, root first.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            CacheKey::Conversations => vec!["chats", "conversations"],
            CacheKey::Messages { conversation_id } => {
                vec!["chats", "conversations", conversation_id, "messages"]
            }
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments().join("/"))
    }
}
