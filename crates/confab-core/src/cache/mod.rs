pub mod conversation_cache;
pub mod key;

pub use conversation_cache::{CacheValue, ConversationCache, MutationError, MutationId};
pub use key::CacheKey;
