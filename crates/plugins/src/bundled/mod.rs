//! The plugins shipped in-tree, plus a helper to register them all.

mod action_items;
mod transcript_recap;

pub use {action_items::ActionItemsPlugin, transcript_recap::TranscriptRecapPlugin};

use std::sync::Arc;

use serde_json::Value;

use huddle_runtime::PluginRuntime;

/// Register every bundled plugin on `runtime`.
pub async fn install_bundled(runtime: &PluginRuntime) -> huddle_runtime::Result<()> {
    runtime
        .install(Arc::new(TranscriptRecapPlugin::new()))
        .await?;
    runtime.install(Arc::new(ActionItemsPlugin)).await?;
    Ok(())
}

/// Human-readable text of one transcript payload. Payloads are expected to
/// carry a `text` field; anything else is rendered as raw JSON.
fn line_text(payload: &Value) -> String {
    payload
        .get("text")
        .and_then(Value::as_str)
        .map_or_else(|| payload.to_string(), ToOwned::to_owned)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        huddle_config::DispatchConfig,
        huddle_providers::{ChatMessage, ChatModel, ModelGateway},
        huddle_runtime::RuntimeFacade,
        huddle_state::MeetingStore,
    };

    use {async_trait::async_trait, serde_json::json};

    use super::*;

    struct NullModel;

    #[async_trait]
    impl ChatModel for NullModel {
        fn id(&self) -> &str {
            "null"
        }

        async fn prompt(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
        ) -> huddle_providers::Result<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn install_bundled_registers_both_plugins() {
        let store = MeetingStore::in_memory().await.unwrap();
        let models = ModelGateway::new(Arc::new(NullModel), Arc::new(NullModel));
        let facade = Arc::new(RuntimeFacade::new(models, store));
        let runtime = PluginRuntime::new(facade, &DispatchConfig::default());

        install_bundled(&runtime).await.unwrap();
        assert_eq!(
            runtime.plugin_names().await,
            vec!["action-items".to_owned(), "transcript-recap".to_owned()]
        );
    }

    #[test]
    fn line_text_prefers_the_text_field() {
        assert_eq!(line_text(&json!({"text": "hello"})), "hello");
        assert_eq!(line_text(&json!({"words": 3})), r#"{"words":3}"#);
        assert_eq!(line_text(&json!("bare")), r#""bare""#);
    }
}
