use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use super::error::{RepositoryError, RepositoryResult};
use super::session_repository::{BoxFuture, SessionData, SessionRepository};
use crate::config::APP_ID;
use crate::models::now_unix;

/// JSON file-based repository for the session cache.
/// Stores the whole session as one file under `<cache_dir>/confab/`.
pub struct JsonSessionRepository {
    session_path: PathBuf,
    max_age: Duration,
}

impl JsonSessionRepository {
    pub fn new(max_age: Duration) -> RepositoryResult<Self> {
        let session_path = dirs::cache_dir()
            .ok_or_else(|| RepositoryError::InitializationError {
                message: "Could not determine cache directory".to_string(),
            })?
            .join(APP_ID)
            .join("session.json");

        Ok(Self {
            session_path,
            max_age,
        })
    }

    /// Use an explicit path instead of the platform cache directory.
    pub fn with_path(session_path: PathBuf, max_age: Duration) -> Self {
        Self {
            session_path,
            max_age,
        }
    }
}

impl SessionRepository for JsonSessionRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<Option<SessionData>>> {
        let path = self.session_path.clone();
        let max_age = self.max_age;

        Box::pin(async move {
            run_blocking(move || {
                if !path.exists() {
                    return Ok(None);
                }

                let content = std::fs::read_to_string(&path)?;
                let data: SessionData = serde_json::from_str(&content)?;

                if data.age_secs(now_unix()) as u64 > max_age.as_secs() {
                    info!(path = %path.display(), "persisted session expired; discarding");
                    return Ok(None);
                }

                Ok(Some(data))
            })
            .await
        })
    }

    fn save(&self, data: SessionData) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.session_path.clone();

        Box::pin(async move {
            run_blocking(move || {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }

                let json = serde_json::to_string_pretty(&data)?;

                // Write to file atomically (write to temp, then rename)
                let temp_path = path.with_extension("json.tmp");
                std::fs::write(&temp_path, json)?;
                std::fs::rename(&temp_path, &path)?;

                Ok(())
            })
            .await
        })
    }

    fn clear(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.session_path.clone();

        Box::pin(async move {
            run_blocking(move || {
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                Ok(())
            })
            .await
        })
    }
}

async fn run_blocking<T: Send + 'static>(
    work: impl FnOnce() -> RepositoryResult<T> + Send + 'static,
) -> RepositoryResult<T> {
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| RepositoryError::InitializationError {
            message: format!("blocking task failed: {err}"),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_unix;

    fn repository(dir: &tempfile::TempDir, max_age: Duration) -> JsonSessionRepository {
        JsonSessionRepository::with_path(dir.path().join("session.json"), max_age)
    }

    #[tokio::test]
    async fn test_load_missing_session_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, Duration::from_secs(3600));
        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, Duration::from_secs(3600));

        let data = SessionData {
            saved_at: now_unix(),
            conversations: Vec::new(),
        };
        repo.save(data.clone()).await.unwrap();

        let loaded = repo.load().await.unwrap().unwrap();
        assert_eq!(loaded.saved_at, data.saved_at);
    }

    #[tokio::test]
    async fn test_expired_session_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, Duration::from_secs(24 * 60 * 60));

        let data = SessionData {
            saved_at: now_unix() - 25 * 60 * 60, // 25 hours ago
            conversations: Vec::new(),
        };
        repo.save(data).await.unwrap();

        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_session() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, Duration::from_secs(3600));

        let data = SessionData {
            saved_at: now_unix(),
            conversations: Vec::new(),
        };
        repo.save(data).await.unwrap();
        repo.clear().await.unwrap();

        assert!(repo.load().await.unwrap().is_none());
    }
}
