pub mod assembler;
pub mod decoder;
pub mod event;
pub mod session;

pub use assembler::Transcript;
pub use decoder::StreamDecoder;
pub use event::{DecodeError, FinishReason, StreamEvent};
pub use session::{ChatStatus, StreamSession};
