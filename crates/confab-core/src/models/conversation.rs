use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Maximum title length derived from the first user message.
pub const TITLE_MAX_CHARS: usize = 50;

/// A conversation record: identity and metadata only.
///
/// Message lists live under their own cache key, so the sidebar can render
/// records without touching message history.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    id: String,
    title: String,
    created_at: SystemTime,
    updated_at: SystemTime,
}

impl Conversation {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            id: id.into(),
            title: title.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Restore a conversation from persisted unix timestamps.
    pub fn from_unix(
        id: impl Into<String>,
        title: impl Into<String>,
        created_at: i64,
        updated_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at: unix_to_system_time(created_at),
            updated_at: unix_to_system_time(updated_at.max(created_at)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn updated_at(&self) -> SystemTime {
        self.updated_at
    }

    pub fn created_at_unix(&self) -> i64 {
        system_time_to_unix(self.created_at)
    }

    pub fn updated_at_unix(&self) -> i64 {
        system_time_to_unix(self.updated_at)
    }

    /// Set the title and bump `updated_at`.
    pub fn set_title(&mut self, title: String) {
        self.title = title;
        self.touch();
    }

    /// Bump `updated_at`, preserving `updated_at >= created_at`.
    pub fn touch(&mut self) {
        self.updated_at = SystemTime::now().max(self.created_at);
    }
}

/// Derive a conversation title from the first user message: the first 50
/// characters, with `"..."` appended when the message was longer.
pub fn derive_title(first_message: &str) -> String {
    let mut title: String = first_message.chars().take(TITLE_MAX_CHARS).collect();
    if first_message.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

fn system_time_to_unix(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn unix_to_system_time(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_title_short_message_unchanged() {
        assert_eq!(derive_title("Hello"), "Hello");
    }

    #[test]
    fn test_derive_title_exactly_fifty_chars_no_ellipsis() {
        let message = "a".repeat(50);
        assert_eq!(derive_title(&message), message);
    }

    #[test]
    fn test_derive_title_truncates_long_message() {
        let message = "a".repeat(60);
        let title = derive_title(&message);
        assert_eq!(title, format!("{}...", "a".repeat(50)));
    }

    #[test]
    fn test_derive_title_counts_chars_not_bytes() {
        let message = "é".repeat(51);
        let title = derive_title(&message);
        assert_eq!(title, format!("{}...", "é".repeat(50)));
    }

    #[test]
    fn test_set_title_bumps_updated_at() {
        let mut conversation = Conversation::from_unix("c-1", "Old", 1000, 1000);
        let before = conversation.updated_at();
        conversation.set_title("New".to_string());
        assert_eq!(conversation.title(), "New");
        assert!(conversation.updated_at() >= before);
        assert!(conversation.updated_at() >= conversation.created_at());
    }

    #[test]
    fn test_from_unix_clamps_updated_at_to_created_at() {
        let conversation = Conversation::from_unix("c-1", "T", 2000, 1000);
        assert_eq!(conversation.created_at_unix(), 2000);
        assert_eq!(conversation.updated_at_unix(), 2000);
    }
}
