//! Core data model for the meeting plugin runtime.
//!
//! The runtime, dispatcher, and store live in their own crates; this module
//! carries only the types they exchange so that crates like `huddle-state`
//! can depend on the model without pulling in the runtime itself.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::error::ConfigError;

/// Identifier of one meeting.
///
/// Meetings are independent units of concurrency and state scoping; nothing
/// in the runtime synchronizes across two meeting ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeetingId(String);

impl MeetingId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MeetingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MeetingId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for MeetingId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One plugin's execution scope within one meeting.
///
/// Uniquely determines a persistence namespace: state written under one
/// context is never visible through another. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub meeting_id: MeetingId,
    pub plugin_name: String,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(meeting_id: impl Into<MeetingId>, plugin_name: impl Into<String>) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            plugin_name: plugin_name.into(),
        }
    }
}

impl std::fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.meeting_id, self.plugin_name)
    }
}

/// Routing tag carried by every packet: which meeting it belongs to and
/// which data source produced it.
///
/// Distinct from [`ExecutionContext`]: the origin is keyed by source for
/// routing, the context by plugin for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketOrigin {
    pub meeting_id: MeetingId,
    pub source: String,
}

impl PacketOrigin {
    #[must_use]
    pub fn new(meeting_id: impl Into<MeetingId>, source: impl Into<String>) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            source: source.into(),
        }
    }
}

/// A unit of in-meeting data, produced continuously by the host for each
/// active source and delivered to subscribed plugin hooks.
///
/// Packets are passed by value into hooks and are not owned by any plugin.
/// `timestamp` is optional: primary feeds stamp packets at capture time,
/// while synthetic packets may leave it unset and take receipt time instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPacket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub origin: PacketOrigin,
    #[serde(default)]
    pub payload: Value,
}

impl DataPacket {
    #[must_use]
    pub fn new(origin: PacketOrigin, payload: Value) -> Self {
        Self {
            timestamp: None,
            origin,
            payload,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Opaque configuration payload for one plugin type.
///
/// The runtime never interprets the contents; each plugin deserializes it
/// into its own schema at startup via [`PluginConfig::parse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginConfig(Value);

impl PluginConfig {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Empty config (`{}`), for plugins whose settings all have defaults.
    #[must_use]
    pub fn empty() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Deserialize into the plugin's own config schema.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, ConfigError> {
        Ok(serde_json::from_value(self.0.clone())?)
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for PluginConfig {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Install-time descriptor for one plugin type.
///
/// Gathered exactly once at install and frozen: the runtime clones it into
/// the registry record and never re-reads it. `name` is the unique key
/// across all installed plugins; `sources` drives the dispatcher's
/// subscription table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    /// Semantic version of the plugin implementation.
    pub version: String,
    /// Data sources this plugin wishes to receive packets from.
    pub sources: Vec<String>,
    /// Default configuration, overridable per deployment at startup.
    #[serde(default)]
    pub config: PluginConfig,
}

impl PluginMetadata {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        sources: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            sources: sources.into_iter().map(Into::into).collect(),
            config: PluginConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: PluginConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether this plugin subscribes to the given source.
    #[must_use]
    pub fn subscribes_to(&self, source: &str) -> bool {
        self.sources.iter().any(|s| s == source)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct RecapSettings {
        #[serde(default = "default_every")]
        every: u32,
        #[serde(default)]
        style: Option<String>,
    }

    fn default_every() -> u32 {
        5
    }

    #[test]
    fn contexts_with_different_plugins_are_distinct() {
        let a = ExecutionContext::new("m-1", "recap");
        let b = ExecutionContext::new("m-1", "actions");
        assert_ne!(a, b);
        assert_eq!(a.meeting_id, b.meeting_id);
        assert_eq!(a.to_string(), "m-1/recap");
    }

    #[test]
    fn packet_builder_sets_timestamp() {
        let origin = PacketOrigin::new("m-1", "transcript");
        let packet = DataPacket::new(origin.clone(), json!({"text": "hello"}));
        assert!(packet.timestamp.is_none());

        let stamped = packet.with_timestamp(Utc::now());
        assert!(stamped.timestamp.is_some());
        assert_eq!(stamped.origin, origin);
    }

    #[test]
    fn plugin_config_parses_into_schema() {
        let config = PluginConfig::new(json!({"every": 3}));
        let parsed: RecapSettings = config.parse().unwrap();
        assert_eq!(parsed.every, 3);
        assert_eq!(parsed.style, None);
    }

    #[test]
    fn empty_plugin_config_uses_schema_defaults() {
        let parsed: RecapSettings = PluginConfig::empty().parse().unwrap();
        assert_eq!(parsed.every, 5);
    }

    #[test]
    fn malformed_plugin_config_is_a_config_error() {
        let config = PluginConfig::new(json!({"every": "not a number"}));
        let err = config.parse::<RecapSettings>().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn constraint_error_carries_reason() {
        let err = ConfigError::constraint("every must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid plugin config: every must be at least 1"
        );
    }

    #[test]
    fn metadata_reports_subscriptions() {
        let meta = PluginMetadata::new("recap", "1.2.0", ["transcript", "chat"]);
        assert!(meta.subscribes_to("transcript"));
        assert!(!meta.subscribes_to("screen"));
    }

    #[test]
    fn metadata_survives_a_serde_round_trip() {
        let meta = PluginMetadata::new("recap", "1.2.0", ["transcript"])
            .with_config(PluginConfig::new(json!({"every": 2})));
        let encoded = serde_json::to_string(&meta).unwrap();
        let decoded: PluginMetadata = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, meta);
    }
}
