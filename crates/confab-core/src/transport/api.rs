use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::error::{ErrorBody, TransportError, map_error_status};
use super::http::build_client;
use crate::auth::AuthProvider;
use crate::config::TransportConfig;
use crate::models::{Conversation, Message, Part, Role, now_unix};

/// Conversation summary returned by `GET /chats`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ChatSummary {
    pub fn into_conversation(self) -> Conversation {
        Conversation::from_unix(
            self.id,
            self.title,
            parse_timestamp(&self.created_at),
            parse_timestamp(&self.updated_at),
        )
    }
}

/// Stored message returned by `GET /chats/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

impl StoredMessage {
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            role: self.role,
            parts: vec![Part::text(self.content)],
            timestamp: parse_timestamp(&self.created_at),
        }
    }
}

/// Response from `POST /users/new-chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewChatResponse {
    pub id: String,
}

/// REST client for the conversation catalogue, used to hydrate the cache
/// when a server is present. Shares the streaming transport's base URL,
/// bearer handling, and status mapping; requests time out after the
/// configured window.
pub struct ChatApi {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    auth: Arc<dyn AuthProvider>,
}

impl ChatApi {
    pub fn new(
        config: &TransportConfig,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(config)?,
            base_url: format!("{}/api/v1", config.base_url),
            request_timeout: config.request_timeout,
            auth,
        })
    }

    /// All conversations for the authenticated user.
    pub async fn get_chats(&self) -> Result<Vec<ChatSummary>, TransportError> {
        let request = self.client.get(format!("{}/chats", self.base_url));
        self.execute(request).await
    }

    /// All messages of one conversation.
    pub async fn get_chat(&self, chat_id: &str) -> Result<Vec<StoredMessage>, TransportError> {
        let request = self
            .client
            .get(format!("{}/chats/{}", self.base_url, chat_id));
        self.execute(request).await
    }

    /// Create a server-side conversation record.
    pub async fn create_chat(&self) -> Result<NewChatResponse, TransportError> {
        let request = self
            .client
            .post(format!("{}/users/new-chat", self.base_url))
            .json(&serde_json::json!({}));
        self.execute(request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        mut request: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        request = request.timeout(self.request_timeout);
        if let Some(token) = self.auth.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ErrorBody>().await.ok();
            return Err(map_error_status(status.as_u16(), body));
        }

        Ok(response.json().await?)
    }
}

/// Parse an RFC 3339 timestamp to unix seconds, falling back to "now" for
/// values the server should not have produced.
fn parse_timestamp(value: &str) -> i64 {
    match chrono::DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => parsed.timestamp(),
        Err(err) => {
            warn!(value = %value, error = %err, "unparseable server timestamp");
            now_unix()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_rfc3339() {
        assert_eq!(parse_timestamp("1970-01-01T00:00:10Z"), 10);
        assert_eq!(parse_timestamp("1970-01-01T01:00:10+01:00"), 10);
    }

    #[test]
    fn test_chat_summary_conversion() {
        let summary = ChatSummary {
            id: "c-1".to_string(),
            title: "Can you fly?".to_string(),
            created_at: "2024-05-01T12:00:00Z".to_string(),
            updated_at: "2024-05-01T12:05:00Z".to_string(),
        };
        let conversation = summary.into_conversation();
        assert_eq!(conversation.id(), "c-1");
        assert_eq!(conversation.title(), "Can you fly?");
        assert_eq!(
            conversation.updated_at_unix() - conversation.created_at_unix(),
            300
        );
    }

    #[test]
    fn test_stored_message_conversion() {
        let stored = StoredMessage {
            id: "m-1".to_string(),
            role: Role::Assistant,
            content: "Not on my own!".to_string(),
            created_at: "2024-05-01T12:01:00Z".to_string(),
        };
        let message = stored.into_message();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.parts, vec![Part::text("Not on my own!")]);
    }
}
