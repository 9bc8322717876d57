//! Rolling recap of the meeting transcript, refreshed every N turns.

use std::sync::atomic::{AtomicU32, Ordering};

use {
    async_trait::async_trait,
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::debug,
};

use {
    huddle_common::{
        error::ConfigError,
        types::{ExecutionContext, PluginConfig, PluginMetadata},
    },
    huddle_providers::ChatMessage,
    huddle_runtime::{HookMap, MeetingPlugin, RuntimeFacade, hook_fn},
};

use crate::bundled::line_text;

const NAME: &str = "transcript-recap";
const DEFAULT_EVERY: u32 = 5;
const RECAP_PROMPT: &str = "You maintain a terse rolling recap of an ongoing meeting. \
    Rewrite the recap from the transcript lines below, at most three sentences.";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecapSettings {
    /// Refresh the recap after this many transcript turns.
    pub every: u32,
}

impl Default for RecapSettings {
    fn default() -> Self {
        Self {
            every: DEFAULT_EVERY,
        }
    }
}

/// Keeps a short rolling summary of the transcript under the `recap` key,
/// refreshed with the fast model tier every `every` turns.
pub struct TranscriptRecapPlugin {
    every: AtomicU32,
}

impl TranscriptRecapPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self {
            every: AtomicU32::new(DEFAULT_EVERY),
        }
    }
}

impl Default for TranscriptRecapPlugin {
    fn default() -> Self {
        Self::new()
    }
}

// Turn counting goes through compare_and_set: transcript hooks for one
// meeting may run concurrently.
async fn next_turn(facade: &RuntimeFacade, ctx: &ExecutionContext) -> anyhow::Result<u64> {
    loop {
        let current = facade.store().get(ctx, "turn_count").await?;
        let next = current.as_ref().and_then(Value::as_u64).unwrap_or(0) + 1;
        let swapped = facade
            .store()
            .compare_and_set(ctx, "turn_count", current.as_ref(), &json!(next))
            .await?;
        if swapped {
            return Ok(next);
        }
    }
}

async fn refresh_recap(
    facade: &RuntimeFacade,
    ctx: &ExecutionContext,
    every: u32,
    current: &Value,
) -> anyhow::Result<()> {
    let mut lines: Vec<String> = if every > 1 {
        facade
            .store()
            .get_history(ctx, Some(every as usize - 1), None)
            .await?
            .iter()
            .map(|entry| line_text(&entry.payload))
            .collect()
    } else {
        Vec::new()
    };
    lines.push(line_text(current));

    let messages = [
        ChatMessage::system(RECAP_PROMPT),
        ChatMessage::user(lines.join("\n")),
    ];
    let recap = facade.models().fast_prompt(&messages, 0.3).await?;
    facade.store().set(ctx, "recap", &json!(recap)).await?;
    debug!(context = %ctx, "rolling recap refreshed");
    Ok(())
}

#[async_trait]
impl MeetingPlugin for TranscriptRecapPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(NAME, env!("CARGO_PKG_VERSION"), ["transcript"])
            .with_config(PluginConfig::new(json!({"every": DEFAULT_EVERY})))
    }

    fn data_receive_hooks(&self) -> HookMap {
        let every = self.every.load(Ordering::SeqCst).max(1);
        let mut hooks = HookMap::new();
        hooks.insert(
            "transcript".to_owned(),
            hook_fn(move |packet, facade| async move {
                let ctx = ExecutionContext::new(packet.origin.meeting_id.clone(), NAME);
                let turns = next_turn(&facade, &ctx).await?;
                if turns % u64::from(every) == 0 {
                    refresh_recap(&facade, &ctx, every, &packet.payload).await?;
                }
                Ok(Some(packet.payload))
            }),
        );
        hooks
    }

    async fn on_startup(&self, config: &PluginConfig) -> anyhow::Result<()> {
        let settings: RecapSettings = config.parse()?;
        if settings.every == 0 {
            return Err(ConfigError::constraint("every must be at least 1").into());
        }
        self.every.store(settings.every, Ordering::SeqCst);
        debug!(every = settings.every, "transcript recap configured");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use {async_trait::async_trait, serde_json::json};

    use {
        huddle_common::types::{DataPacket, MeetingId, PacketOrigin},
        huddle_config::DispatchConfig,
        huddle_providers::{ChatModel, ModelGateway},
        huddle_runtime::PluginRuntime,
        huddle_state::MeetingStore,
    };

    use super::*;

    struct ScriptedModel {
        reply: &'static str,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(reply: &'static str) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn prompt(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
        ) -> huddle_providers::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.to_owned())
        }
    }

    async fn runtime_with(
        model: Arc<ScriptedModel>,
        overrides: HashMap<String, Value>,
    ) -> PluginRuntime {
        let store = MeetingStore::in_memory().await.unwrap();
        let models = ModelGateway::new(
            Arc::clone(&model) as Arc<dyn ChatModel>,
            model as Arc<dyn ChatModel>,
        );
        let facade = Arc::new(RuntimeFacade::new(models, store));
        PluginRuntime::new(facade, &DispatchConfig::default()).with_plugin_overrides(overrides)
    }

    fn line(turn: usize) -> DataPacket {
        DataPacket::new(
            PacketOrigin::new("m-1", "transcript"),
            json!({"text": format!("line {turn}")}),
        )
    }

    #[tokio::test]
    async fn recap_fires_on_the_configured_interval() {
        let model = Arc::new(ScriptedModel::new("Recap: two topics so far."));
        let overrides = HashMap::from([(NAME.to_owned(), json!({"every": 2}))]);
        let runtime = runtime_with(Arc::clone(&model), overrides).await;

        runtime
            .install(Arc::new(TranscriptRecapPlugin::new()))
            .await
            .unwrap();
        runtime.startup().await.unwrap();
        let meeting = MeetingId::new("m-1");
        runtime.meeting_start(&meeting).await.unwrap();

        for turn in 0..4 {
            let outcome = runtime.dispatch(line(turn)).await;
            assert!(outcome.is_clean(), "turn {turn} failed: {:?}", outcome.failures);
        }

        // Turns 2 and 4 refresh; 1 and 3 only count.
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);

        let ctx = ExecutionContext::new("m-1", NAME);
        let store = runtime.facade();
        let recap = store.store().get(&ctx, "recap").await.unwrap();
        assert_eq!(recap, Some(json!("Recap: two topics so far.")));
        let turns = store.store().get(&ctx, "turn_count").await.unwrap();
        assert_eq!(turns, Some(json!(4)));
    }

    #[tokio::test]
    async fn every_turn_lands_in_history() {
        let model = Arc::new(ScriptedModel::new("recap"));
        let runtime = runtime_with(model, HashMap::new()).await;
        runtime
            .install(Arc::new(TranscriptRecapPlugin::new()))
            .await
            .unwrap();
        runtime.startup().await.unwrap();
        runtime.meeting_start(&MeetingId::new("m-1")).await.unwrap();

        for turn in 0..3 {
            runtime.dispatch(line(turn)).await;
        }

        let ctx = ExecutionContext::new("m-1", NAME);
        let history = runtime
            .facade()
            .store()
            .get_history(&ctx, Some(10), None)
            .await
            .unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].payload, json!({"text": "line 0"}));
    }

    #[tokio::test]
    async fn zero_interval_is_rejected_at_startup() {
        let plugin = TranscriptRecapPlugin::new();
        let err = plugin
            .on_startup(&PluginConfig::new(json!({"every": 0})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("every must be at least 1"));
    }

    #[tokio::test]
    async fn malformed_config_is_a_parse_error() {
        let plugin = TranscriptRecapPlugin::new();
        let err = plugin
            .on_startup(&PluginConfig::new(json!({"every": "five"})))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("invalid plugin config"));
    }

    #[tokio::test]
    async fn empty_config_keeps_the_default_interval() {
        let plugin = TranscriptRecapPlugin::new();
        plugin.on_startup(&PluginConfig::empty()).await.unwrap();
        assert_eq!(RecapSettings::default().every, DEFAULT_EVERY);
    }
}
