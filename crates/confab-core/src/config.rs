use std::time::Duration;

/// Fixed application identifier: names the session-storage scope and the
/// on-disk directory.
pub const APP_ID: &str = "confab";

/// Persisted sessions older than this are discarded on load.
const SESSION_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache entries older than this are eligible for background refresh.
const SESSION_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// REST requests time out after this long. The streaming request carries
/// only a connect timeout — the stream itself is not time-limited here.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Persistence windows. Configuration values, not hard contracts.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_age: Duration,
    pub stale_after: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: SESSION_MAX_AGE,
            stale_after: SESSION_STALE_AFTER,
        }
    }
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Server origin, e.g. `http://127.0.0.1:3000`.
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            connect_timeout: REQUEST_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

impl TransportConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_trailing_slash(base_url.into()),
            ..Self::default()
        }
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

/// A selectable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOption {
    pub name: &'static str,
    pub value: &'static str,
}

/// The model catalogue offered by the prompt input.
pub const MODELS: &[ModelOption] = &[
    ModelOption {
        name: "Gemini 2.5 Flash",
        value: "gemini-2.5-flash",
    },
    ModelOption {
        name: "Gemini 2.5 Pro",
        value: "gemini-2.5-pro",
    },
];

pub fn default_model() -> &'static str {
    MODELS[0].value
}

/// Display name for a model id, falling back to the id itself.
pub fn model_name(value: &str) -> &str {
    MODELS
        .iter()
        .find(|m| m.value == value)
        .map(|m| m.name)
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_is_first_catalogue_entry() {
        assert_eq!(default_model(), "gemini-2.5-flash");
    }

    #[test]
    fn test_model_name_lookup() {
        assert_eq!(model_name("gemini-2.5-pro"), "Gemini 2.5 Pro");
        assert_eq!(model_name("custom-model"), "custom-model");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = TransportConfig::with_base_url("http://example.com/");
        assert_eq!(config.base_url, "http://example.com");
    }

    #[test]
    fn test_cache_windows() {
        let config = CacheConfig::default();
        assert_eq!(config.max_age, Duration::from_secs(86_400));
        assert_eq!(config.stale_after, Duration::from_secs(300));
    }
}
