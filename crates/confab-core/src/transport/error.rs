use serde::Deserialize;
use thiserror::Error;

/// A failed HTTP exchange, mapped from the status code. Never silently
/// swallowed: every kind surfaces to the orchestrator's state machine.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl TransportError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::Unauthorized)
    }
}

/// Non-2xx responses carry a JSON `{error, message}` body.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.message.or(self.error)
    }
}

/// Map a non-2xx status (and its parsed body, when one was readable) to an
/// error kind.
pub(crate) fn map_error_status(status: u16, body: Option<ErrorBody>) -> TransportError {
    let message = body.and_then(ErrorBody::into_message);
    match status {
        401 => TransportError::Unauthorized,
        403 => TransportError::Forbidden(
            message.unwrap_or_else(|| {
                "You do not have permission to perform this action".to_string()
            }),
        ),
        404 => TransportError::NotFound(
            message.unwrap_or_else(|| "The requested resource was not found".to_string()),
        ),
        500..=599 => TransportError::Server {
            status,
            message: message
                .unwrap_or_else(|| "Internal server error. Please try again later.".to_string()),
        },
        other => TransportError::Server {
            status: other,
            message: message.unwrap_or_else(|| format!("Server error: {other}")),
        },
    }
}
