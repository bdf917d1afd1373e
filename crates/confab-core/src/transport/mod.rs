pub mod api;
pub mod error;
pub mod http;

pub use api::{ChatApi, ChatSummary, NewChatResponse, StoredMessage};
pub use error::TransportError;
pub use http::{ChatTransport, EventStream, HttpChatTransport};
