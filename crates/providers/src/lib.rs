//! Model capability for meeting plugins: a two-tier chat gateway over an
//! OpenAI-compatible API.

pub mod chat;
pub mod error;
pub mod gateway;
pub mod openai;

pub use {
    chat::ChatMessage,
    error::{Error, ProviderError, Result},
    gateway::{ChatModel, ModelGateway},
    openai::OpenAiChatModel,
};
