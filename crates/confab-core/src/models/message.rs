use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A typed fragment of a message's content.
///
/// The wire representation matches the streaming endpoint's part objects
/// (`{"type": "text", "text": ...}` etc.), so the same serialization is used
/// for the request body and for session persistence. Adding a part kind is a
/// compile-time-checked change: every consumption site matches exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    #[serde(rename = "source-url")]
    Source {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    File {
        filename: String,
        url: String,
        media_type: String,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// The textual content of this part, if it has any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } | Part::Reasoning { text } => Some(text),
            Part::Source { .. } | Part::File { .. } => None,
        }
    }
}

/// A single message in a conversation.
///
/// `timestamp` is unix seconds; parts preserve arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    pub timestamp: i64,
}

impl Message {
    /// Build a user message from raw input text.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: Role::User,
            parts: vec![Part::text(text)],
            timestamp: now_unix(),
        }
    }

    /// Build an empty assistant message.
    ///
    /// A server-provided id is honored when present; otherwise a
    /// client-generated one is minted.
    pub fn assistant(id: Option<String>) -> Self {
        Self {
            id: id.unwrap_or_else(new_message_id),
            role: Role::Assistant,
            parts: Vec::new(),
            timestamp: now_unix(),
        }
    }

    /// Concatenated text of all text parts, in order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Generate a collision-resistant client-side message id.
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time as unix seconds.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_wire_format_matches_endpoint() {
        let part = Part::text("hello");
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "text": "hello"}));

        let part = Part::File {
            filename: "report.pdf".to_string(),
            url: "https://example.com/report.pdf".to_string(),
            media_type: "application/pdf".to_string(),
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["mediaType"], "application/pdf");

        let part = Part::Source {
            url: "https://example.com".to_string(),
            title: None,
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "source-url");
        assert!(json.get("title").is_none());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_message_text_concatenates_text_parts_only() {
        let mut message = Message::user("Hello");
        message.parts.push(Part::Reasoning {
            text: "thinking".to_string(),
        });
        message.parts.push(Part::text(" world"));
        assert_eq!(message.text(), "Hello world");
    }

    #[test]
    fn test_message_round_trips_through_json() {
        let message = Message {
            id: "m-1".to_string(),
            role: Role::Assistant,
            parts: vec![
                Part::text("answer"),
                Part::Source {
                    url: "https://example.com".to_string(),
                    title: Some("Example".to_string()),
                },
            ],
            timestamp: 1_700_000_000,
        };

        let json = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }
}
