pub mod error;
pub mod in_memory_repository;
pub mod json_session_repository;
pub mod session_repository;

pub use error::{RepositoryError, RepositoryResult};
pub use in_memory_repository::InMemorySessionRepository;
pub use json_session_repository::JsonSessionRepository;
pub use session_repository::{ConversationData, SessionData, SessionRepository};
