use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::Serialize;
use tracing::{debug, warn};

use super::error::{ErrorBody, TransportError, map_error_status};
use crate::auth::AuthProvider;
use crate::config::TransportConfig;
use crate::models::{Message, Part, Role};
use crate::stream::{StreamDecoder, StreamEvent};

/// A finite sequence of decoded stream events. Failures past connection
/// time are embedded as [`StreamEvent::Error`], so consumers fold a single
/// event type.
pub type EventStream = BoxStream<'static, StreamEvent>;

/// Issues one chat turn: prior messages plus a model selector, answered by
/// an event stream.
pub trait ChatTransport: Send + Sync {
    fn send(
        &self,
        messages: Vec<Message>,
        model: String,
    ) -> BoxFuture<'static, Result<EventStream, TransportError>>;
}

/// Request body for the streaming endpoint: `{messages: [{role, parts}], model}`.
#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    parts: &'a [Part],
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    messages: Vec<WireMessage<'a>>,
    model: &'a str,
}

/// Streaming transport over HTTP.
///
/// Carries only a connect timeout: the response stream itself is not
/// time-limited at this layer.
pub struct HttpChatTransport {
    client: reqwest::Client,
    endpoint: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpChatTransport {
    pub fn new(
        config: &TransportConfig,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(config)?,
            endpoint: format!("{}/api/chat", config.base_url),
            auth,
        })
    }
}

impl ChatTransport for HttpChatTransport {
    fn send(
        &self,
        messages: Vec<Message>,
        model: String,
    ) -> BoxFuture<'static, Result<EventStream, TransportError>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let token = self.auth.token();

        Box::pin(async move {
            let body = ChatRequestBody {
                messages: messages
                    .iter()
                    .map(|m| WireMessage {
                        role: m.role,
                        parts: &m.parts,
                    })
                    .collect(),
                model: &model,
            };

            let mut request = client.post(&endpoint).json(&body);
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }

            debug!(endpoint = %endpoint, model = %model, messages = messages.len(), "sending chat request");
            let response = request.send().await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.json::<ErrorBody>().await.ok();
                return Err(map_error_status(status.as_u16(), body));
            }

            let mut chunks = response.bytes_stream();
            let events = async_stream::stream! {
                let mut decoder = StreamDecoder::new();
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(bytes) => {
                            for event in decoder.feed(&bytes) {
                                yield event;
                            }
                            if decoder.is_terminated() {
                                return;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "chat stream interrupted");
                            yield StreamEvent::Error {
                                message: err.to_string(),
                            };
                            return;
                        }
                    }
                }
                for event in decoder.finish() {
                    yield event;
                }
            };

            Ok(Box::pin(events) as EventStream)
        })
    }
}

/// Shared client construction for the streaming and REST transports.
pub(crate) fn build_client(config: &TransportConfig) -> Result<reqwest::Client, TransportError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_wire_shape() {
        let messages = vec![Message::user("Hello")];
        let body = ChatRequestBody {
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    parts: &m.parts,
                })
                .collect(),
            model: "gemini-2.5-flash",
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "messages": [
                    {"role": "user", "parts": [{"type": "text", "text": "Hello"}]}
                ],
                "model": "gemini-2.5-flash",
            })
        );
    }

    #[test]
    fn test_endpoint_path() {
        let config = TransportConfig::with_base_url("http://example.com/");
        let transport = HttpChatTransport::new(
            &config,
            Arc::new(crate::auth::StaticTokenProvider::anonymous()),
        )
        .unwrap();
        assert_eq!(transport.endpoint, "http://example.com/api/chat");
    }
}
