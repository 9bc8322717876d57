//! Action item extraction from the transcript at meeting end.

use std::sync::Arc;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde_json::{Value, json},
    tracing::{debug, info},
};

use {
    huddle_common::types::{ExecutionContext, PluginMetadata},
    huddle_providers::ChatMessage,
    huddle_runtime::{HookMap, MeetingPlugin, RuntimeFacade, hook_fn},
};

use crate::bundled::line_text;

const NAME: &str = "action-items";
const MAX_LINES: usize = 200;
const EXTRACT_PROMPT: &str = "Extract the action items from this meeting transcript. \
    Reply with a JSON array of short strings, one per action item. \
    Reply with [] when there are none.";

/// Collects transcript lines while the meeting runs, then asks the full
/// model tier for the action items when it ends and stores them under the
/// `action_items` key.
pub struct ActionItemsPlugin;

#[async_trait]
impl MeetingPlugin for ActionItemsPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(NAME, env!("CARGO_PKG_VERSION"), ["transcript"])
    }

    fn data_receive_hooks(&self) -> HookMap {
        let mut hooks = HookMap::new();
        hooks.insert(
            "transcript".to_owned(),
            hook_fn(|packet, _facade| async move { Ok(Some(packet.payload)) }),
        );
        hooks
    }

    async fn on_meeting_start(
        &self,
        ctx: &ExecutionContext,
        facade: &Arc<RuntimeFacade>,
    ) -> anyhow::Result<()> {
        let started = json!(Utc::now().to_rfc3339());
        facade.store().set(ctx, "started_at", &started).await?;
        debug!(context = %ctx, "collecting transcript for action items");
        Ok(())
    }

    async fn on_meeting_end(
        &self,
        ctx: &ExecutionContext,
        facade: &Arc<RuntimeFacade>,
    ) -> anyhow::Result<()> {
        let floor = facade
            .store()
            .get(ctx, "started_at")
            .await?
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc));

        let history = match floor {
            Some(not_before) => {
                facade
                    .store()
                    .get_history(ctx, None, Some(not_before))
                    .await?
            },
            None => {
                facade
                    .store()
                    .get_history(ctx, Some(MAX_LINES), None)
                    .await?
            },
        };
        if history.is_empty() {
            debug!(context = %ctx, "no transcript lines, skipping extraction");
            return Ok(());
        }

        let lines: Vec<String> = history
            .iter()
            .map(|entry| line_text(&entry.payload))
            .collect();
        let messages = [
            ChatMessage::system(EXTRACT_PROMPT),
            ChatMessage::user(lines.join("\n")),
        ];
        let reply = facade.models().prompt(&messages, 0.2).await?;
        let items = serde_json::from_str::<Value>(&reply).unwrap_or_else(|_| json!([reply]));
        facade.store().set(ctx, "action_items", &items).await?;
        info!(context = %ctx, "action items extracted");
        Ok(())
    }
}
