//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    tokio::sync::OnceCell,
    tracing::{debug, warn},
};

use huddle_config::ModelsConfig;

use crate::{
    chat::ChatMessage,
    error::{Error, Result},
    gateway::ChatModel,
};

/// One model tier speaking the OpenAI chat-completions protocol.
///
/// The HTTP client is constructed lazily on first use, at most once, and
/// reused for the life of the instance.
pub struct OpenAiChatModel {
    model: String,
    base_url: String,
    api_key: Option<Secret<String>>,
    request_timeout: Duration,
    client: OnceCell<reqwest::Client>,
}

impl OpenAiChatModel {
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<Secret<String>>,
    ) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            api_key,
            request_timeout: Duration::from_secs(60),
            client: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &ModelsConfig, model: &str) -> Self {
        Self::new(
            model,
            config.base_url.trim_end_matches('/'),
            config.api_key.clone(),
        )
        .with_request_timeout(config.request_timeout())
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Lazy, at-most-once client construction.
    async fn client(&self) -> Result<&reqwest::Client> {
        self.client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .timeout(self.request_timeout)
                    .build()
                    .map_err(Error::from)
            })
            .await
    }

    fn bearer_token(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.expose_secret().clone());
        }
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::auth("no API key configured and OPENAI_API_KEY is unset"))
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn id(&self) -> &str {
        &self.model
    }

    async fn prompt(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let token = self.bearer_token()?;
        let client = self.client().await?;

        let request_messages: Vec<_> = messages.iter().map(ChatMessage::to_request_value).collect();
        let body = serde_json::json!({
            "model": self.model,
            "messages": request_messages,
            "temperature": temperature,
        });

        debug!(
            model = %self.model,
            messages_count = messages.len(),
            "chat completion request"
        );

        let http_resp = client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body_text = http_resp.text().await.unwrap_or_default();
            warn!(status = %status, model = %self.model, body = %body_text, "model API error");
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return Err(Error::auth(format!("HTTP {status}: {body_text}")));
            }
            return Err(Error::Api {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let resp = http_resp.json::<serde_json::Value>().await?;
        resp["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::malformed("missing choices[0].message.content"))
    }
}
