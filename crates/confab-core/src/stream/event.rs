use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
    #[default]
    Unknown,
}

impl FinishReason {
    pub fn parse(value: &str) -> Self {
        match value {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content-filter" => FinishReason::ContentFilter,
            "error" => FinishReason::Error,
            _ => FinishReason::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content-filter",
            FinishReason::Error => "error",
            FinishReason::Unknown => "unknown",
        }
    }
}

/// A typed event decoded from the response stream.
///
/// Events for a given part id arrive strictly in order; different parts may
/// interleave freely.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Start { message_id: Option<String> },
    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },
    ReasoningStart { id: String },
    ReasoningDelta { id: String, delta: String },
    ReasoningEnd { id: String },
    Source { url: String, title: Option<String> },
    File {
        filename: Option<String>,
        url: String,
        media_type: String,
    },
    Finish { reason: FinishReason },
    Error { message: String },
}

/// A malformed stream frame. Decoding terminates on the first of these; the
/// error is surfaced downstream as a `StreamEvent::Error`, never thrown.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("stream chunk is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("stream frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stream frame has no event type: {frame}")]
    MissingType { frame: String },

    #[error("malformed `{event_type}` frame: missing field `{field}`")]
    MissingField {
        event_type: String,
        field: &'static str,
    },
}

impl StreamEvent {
    /// Parse one JSON frame payload into an event.
    ///
    /// Returns `Ok(None)` for well-formed frames of unknown type, which are
    /// skipped for forward compatibility.
    pub(crate) fn parse_frame(payload: &str) -> Result<Option<StreamEvent>, DecodeError> {
        let value: Value = serde_json::from_str(payload)?;
        let event_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::MissingType {
                frame: snippet(payload),
            })?
            .to_string();

        let event = match event_type.as_str() {
            "start" => StreamEvent::Start {
                message_id: optional_str(&value, "messageId"),
            },
            "text-start" => StreamEvent::TextStart {
                id: required_str(&value, "id", &event_type)?,
            },
            "text-delta" => StreamEvent::TextDelta {
                id: required_str(&value, "id", &event_type)?,
                delta: required_str(&value, "delta", &event_type)?,
            },
            "text-end" => StreamEvent::TextEnd {
                id: required_str(&value, "id", &event_type)?,
            },
            "reasoning-start" => StreamEvent::ReasoningStart {
                id: required_str(&value, "id", &event_type)?,
            },
            "reasoning-delta" => StreamEvent::ReasoningDelta {
                id: required_str(&value, "id", &event_type)?,
                delta: required_str(&value, "delta", &event_type)?,
            },
            "reasoning-end" => StreamEvent::ReasoningEnd {
                id: required_str(&value, "id", &event_type)?,
            },
            "source-url" => StreamEvent::Source {
                url: required_str(&value, "url", &event_type)?,
                title: optional_str(&value, "title"),
            },
            "file" => StreamEvent::File {
                filename: optional_str(&value, "filename"),
                url: required_str(&value, "url", &event_type)?,
                media_type: required_str(&value, "mediaType", &event_type)?,
            },
            "finish" => StreamEvent::Finish {
                reason: optional_str(&value, "reason")
                    .map(|r| FinishReason::parse(&r))
                    .unwrap_or_default(),
            },
            "error" => StreamEvent::Error {
                message: optional_str(&value, "message")
                    .or_else(|| optional_str(&value, "errorText"))
                    .unwrap_or_else(|| "stream error".to_string()),
            },
            other => {
                debug!(event_type = %other, "skipping unknown stream event type");
                return Ok(None);
            }
        };

        Ok(Some(event))
    }
}

fn required_str(value: &Value, field: &'static str, event_type: &str) -> Result<String, DecodeError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DecodeError::MissingField {
            event_type: event_type.to_string(),
            field,
        })
}

fn optional_str(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

fn snippet(payload: &str) -> String {
    payload.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_delta_frame() {
        let event = StreamEvent::parse_frame(r#"{"type":"text-delta","id":"0","delta":"Hi"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            StreamEvent::TextDelta {
                id: "0".to_string(),
                delta: "Hi".to_string()
            }
        );
    }

    #[test]
    fn test_parse_finish_defaults_to_unknown_reason() {
        let event = StreamEvent::parse_frame(r#"{"type":"finish"}"#).unwrap().unwrap();
        assert_eq!(
            event,
            StreamEvent::Finish {
                reason: FinishReason::Unknown
            }
        );

        let event = StreamEvent::parse_frame(r#"{"type":"finish","reason":"stop"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            StreamEvent::Finish {
                reason: FinishReason::Stop
            }
        );
    }

    #[test]
    fn test_parse_error_frame_accepts_both_field_names() {
        let event = StreamEvent::parse_frame(r#"{"type":"error","errorText":"boom"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            StreamEvent::Error {
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_event_type_is_skipped() {
        let parsed = StreamEvent::parse_frame(r#"{"type":"finish-step"}"#).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_missing_required_field_is_malformed() {
        let err = StreamEvent::parse_frame(r#"{"type":"text-delta","id":"0"}"#).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MissingField { field: "delta", .. }
        ));
    }

    #[test]
    fn test_frame_without_type_is_malformed() {
        let err = StreamEvent::parse_frame(r#"{"delta":"Hi"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingType { .. }));
    }
}
