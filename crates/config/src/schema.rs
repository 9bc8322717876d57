//! Config schema for the huddle runtime: store location, model tiers, and
//! dispatch hardening knobs.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HuddleConfig {
    pub store: StoreConfig,
    pub models: ModelsConfig,
    pub dispatch: DispatchConfig,
    /// Per-plugin config overrides keyed by plugin name. An override is
    /// passed to that plugin's `on_startup` in place of the default config
    /// frozen in its metadata.
    #[serde(default)]
    pub plugins: HashMap<String, serde_json::Value>,
}

impl HuddleConfig {
    /// The startup config override for a plugin, if one is configured.
    #[must_use]
    pub fn plugin_override(&self, plugin_name: &str) -> Option<&serde_json::Value> {
        self.plugins.get(plugin_name)
    }
}

/// Where meeting state lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path. Unset means a process-private in-memory store.
    pub path: Option<PathBuf>,
}

/// Model capability configuration (OpenAI-compatible chat completions).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Base URL of the chat-completions API.
    pub base_url: String,

    /// API key. `${ENV_VAR}` substitution applies; when unset the
    /// `OPENAI_API_KEY` environment variable is consulted at request time.
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,

    /// Low-cost tier used by `fast_prompt`.
    pub fast_model: String,

    /// Primary tier used by `prompt`.
    pub full_model: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for ModelsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelsConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("fast_model", &self.fast_model)
            .field("full_model", &self.full_model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            fast_model: "gpt-4o-mini".to_string(),
            full_model: "gpt-4o".to_string(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ModelsConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// Dispatch hardening knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-hook time budget in seconds; a hook exceeding it is aborted and
    /// recorded as a timeout failure.
    #[serde(default = "default_hook_timeout")]
    pub hook_timeout_secs: u64,

    /// How long `shutdown()` waits for in-flight hooks before proceeding.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            hook_timeout_secs: default_hook_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_timeout_secs)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn default_hook_timeout() -> u64 {
    30
}

fn default_shutdown_grace() -> u64 {
    5
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_select_both_model_tiers() {
        let config = HuddleConfig::default();
        assert_eq!(config.models.base_url, "https://api.openai.com/v1");
        assert_eq!(config.models.fast_model, "gpt-4o-mini");
        assert_eq!(config.models.full_model, "gpt-4o");
        assert!(config.models.api_key.is_none());
        assert!(config.store.path.is_none());
    }

    #[test]
    fn dispatch_defaults_bound_hooks_and_shutdown() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.hook_timeout(), Duration::from_secs(30));
        assert_eq!(dispatch.shutdown_grace(), Duration::from_secs(5));
    }

    #[test]
    fn api_key_is_redacted_in_debug_output() {
        let models = ModelsConfig {
            api_key: Some(Secret::new("sk-very-secret".to_string())),
            ..ModelsConfig::default()
        };
        let rendered = format!("{models:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("sk-very-secret"));
    }

    #[test]
    fn toml_config_parses_with_plugin_overrides() {
        let raw = r#"
            [store]
            path = "/tmp/huddle.db"

            [models]
            fast_model = "gpt-4o-mini"
            full_model = "gpt-4.1"

            [dispatch]
            hook_timeout_secs = 10

            [plugins.transcript-recap]
            every = 3
        "#;
        let config: HuddleConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.store.path.as_deref(), Some(std::path::Path::new("/tmp/huddle.db")));
        assert_eq!(config.models.full_model, "gpt-4.1");
        assert_eq!(config.dispatch.hook_timeout_secs, 10);
        // Untouched knobs keep their defaults.
        assert_eq!(config.dispatch.shutdown_grace_secs, 5);

        let over = config.plugin_override("transcript-recap").unwrap();
        assert_eq!(over["every"], 3);
        assert!(config.plugin_override("unknown").is_none());
    }
}
