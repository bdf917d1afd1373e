use std::sync::Arc;

use parking_lot::Mutex;

use super::error::RepositoryResult;
use super::session_repository::{BoxFuture, SessionData, SessionRepository};

/// In-memory repository for the session cache
/// Useful for testing and development
#[derive(Clone, Default)]
pub struct InMemorySessionRepository {
    session: Arc<Mutex<Option<SessionData>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<Option<SessionData>>> {
        let session = self.session.clone();
        Box::pin(async move { Ok(session.lock().clone()) })
    }

    fn save(&self, data: SessionData) -> BoxFuture<'static, RepositoryResult<()>> {
        let session = self.session.clone();
        Box::pin(async move {
            *session.lock() = Some(data);
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        let session = self.session.clone();
        Box::pin(async move {
            *session.lock() = None;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_unix;

    #[tokio::test]
    async fn test_save_and_load() {
        let repo = InMemorySessionRepository::new();

        let data = SessionData {
            saved_at: now_unix(),
            conversations: Vec::new(),
        };
        repo.save(data.clone()).await.unwrap();

        let loaded = repo.load().await.unwrap().unwrap();
        assert_eq!(loaded.saved_at, data.saved_at);
    }

    #[tokio::test]
    async fn test_clear() {
        let repo = InMemorySessionRepository::new();

        let data = SessionData {
            saved_at: now_unix(),
            conversations: Vec::new(),
        };
        repo.save(data).await.unwrap();
        repo.clear().await.unwrap();

        assert!(repo.load().await.unwrap().is_none());
    }
}
