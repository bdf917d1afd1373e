pub mod chat_controller;

pub use chat_controller::{ChatController, ChatError, TurnRequest};
