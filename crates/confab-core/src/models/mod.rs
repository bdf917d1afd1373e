pub mod conversation;
pub mod message;

pub use conversation::{Conversation, TITLE_MAX_CHARS, derive_title};
pub use message::{Message, Part, Role, new_message_id, now_unix};
