//! Two-tier model gateway: a low-cost model for frequent in-meeting calls
//! and a primary model for heavier work.

use std::sync::Arc;

use async_trait::async_trait;

use huddle_config::ModelsConfig;

use crate::{chat::ChatMessage, error::Result, openai::OpenAiChatModel};

/// A chat-completion capable model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier as sent to the API.
    fn id(&self) -> &str;

    /// Complete the conversation, returning the assistant text.
    async fn prompt(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;
}

/// Pairs the two tiers behind the facade's `prompt` / `fast_prompt`.
pub struct ModelGateway {
    fast: Arc<dyn ChatModel>,
    full: Arc<dyn ChatModel>,
}

impl ModelGateway {
    #[must_use]
    pub fn new(fast: Arc<dyn ChatModel>, full: Arc<dyn ChatModel>) -> Self {
        Self { fast, full }
    }

    /// Build both tiers against the same OpenAI-compatible endpoint.
    #[must_use]
    pub fn from_config(config: &ModelsConfig) -> Self {
        let fast = OpenAiChatModel::from_config(config, &config.fast_model);
        let full = OpenAiChatModel::from_config(config, &config.full_model);
        Self::new(Arc::new(fast), Arc::new(full))
    }

    /// Low-cost tier, for frequent in-meeting calls.
    pub async fn fast_prompt(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        self.fast.prompt(messages, temperature).await
    }

    /// Primary tier.
    pub async fn prompt(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        self.full.prompt(messages, temperature).await
    }

    #[must_use]
    pub fn fast_model_id(&self) -> &str {
        self.fast.id()
    }

    #[must_use]
    pub fn full_model_id(&self) -> &str {
        self.full.id()
    }
}
