//! Keyed meeting state and per-context output history.
//!
//! State rows are scoped to `(plugin_name, meeting_id, key)` so concurrent
//! plugins never observe each other's namespace. History rows record the
//! outputs a plugin produced during a meeting, for windowed replay.

use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    tracing::debug,
};

use huddle_common::types::{ExecutionContext, MeetingId};

use crate::error::{Error, Result};

/// One appended record of output a plugin produced during a meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    /// Source whose packet triggered the output.
    pub source: String,
    pub payload: Value,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, source: impl Into<String>, payload: Value) -> Self {
        Self {
            timestamp,
            source: source.into(),
            payload,
        }
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    source: String,
    payload: String,
    ts: i64,
}

impl HistoryRow {
    fn into_entry(self) -> Result<HistoryEntry> {
        let timestamp = DateTime::from_timestamp_millis(self.ts)
            .ok_or_else(|| Error::message(format!("timestamp out of range: {}", self.ts)))?;
        Ok(HistoryEntry {
            timestamp,
            source: self.source,
            payload: serde_json::from_str(&self.payload)?,
        })
    }
}

/// SQLite-backed store shared by every plugin in the process.
///
/// Cloning is cheap: clones share the underlying pool.
#[derive(Clone)]
pub struct MeetingStore {
    pool: sqlx::SqlitePool,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl MeetingStore {
    /// Wrap an existing pool. Migrations must already have run.
    #[must_use]
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) a store at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        crate::run_migrations(&pool).await?;
        debug!(path = %path.display(), "opened meeting store");
        Ok(Self { pool })
    }

    /// Process-private in-memory store, for tests and local runs.
    pub async fn in_memory() -> Result<Self> {
        // One connection only: each new connection to `:memory:` would get
        // its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        crate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Write `value` under the context's composite key, overwriting any
    /// prior value (last write wins).
    pub async fn set(&self, ctx: &ExecutionContext, key: &str, value: &Value) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        sqlx::query(
            r#"INSERT INTO meeting_state (plugin_name, meeting_id, key, value, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(plugin_name, meeting_id, key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at"#,
        )
        .bind(&ctx.plugin_name)
        .bind(ctx.meeting_id.as_str())
        .bind(key)
        .bind(encoded)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Current value for the composite key, `None` when unset.
    pub async fn get(&self, ctx: &ExecutionContext, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query_scalar::<_, String>(
            "SELECT value FROM meeting_state WHERE plugin_name = ? AND meeting_id = ? AND key = ?",
        )
        .bind(&ctx.plugin_name)
        .bind(ctx.meeting_id.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|v| serde_json::from_str(&v))
            .transpose()
            .map_err(Error::from)
    }

    /// Atomically write `value` only when the stored value equals `expected`
    /// (`None` = only when the key is absent). Returns whether the write
    /// happened.
    pub async fn compare_and_set(
        &self,
        ctx: &ExecutionContext,
        key: &str,
        expected: Option<&Value>,
        value: &Value,
    ) -> Result<bool> {
        let encoded = serde_json::to_string(value)?;
        let result = match expected {
            None => {
                sqlx::query(
                    r#"INSERT INTO meeting_state (plugin_name, meeting_id, key, value, updated_at)
                       VALUES (?, ?, ?, ?, ?)
                       ON CONFLICT(plugin_name, meeting_id, key) DO NOTHING"#,
                )
                .bind(&ctx.plugin_name)
                .bind(ctx.meeting_id.as_str())
                .bind(key)
                .bind(encoded)
                .bind(now_ms())
                .execute(&self.pool)
                .await?
            },
            Some(want) => {
                let want_encoded = serde_json::to_string(want)?;
                sqlx::query(
                    r#"UPDATE meeting_state SET value = ?, updated_at = ?
                       WHERE plugin_name = ? AND meeting_id = ? AND key = ? AND value = ?"#,
                )
                .bind(encoded)
                .bind(now_ms())
                .bind(&ctx.plugin_name)
                .bind(ctx.meeting_id.as_str())
                .bind(key)
                .bind(want_encoded)
                .execute(&self.pool)
                .await?
            },
        };
        Ok(result.rows_affected() > 0)
    }

    /// Delete a single key. Returns whether a value was present.
    pub async fn delete(&self, ctx: &ExecutionContext, key: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM meeting_state WHERE plugin_name = ? AND meeting_id = ? AND key = ?",
        )
        .bind(&ctx.plugin_name)
        .bind(ctx.meeting_id.as_str())
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop all state and history for a finished meeting, across plugins.
    /// Returns the number of rows removed.
    pub async fn clear_meeting(&self, meeting_id: &MeetingId) -> Result<u64> {
        let state = sqlx::query("DELETE FROM meeting_state WHERE meeting_id = ?")
            .bind(meeting_id.as_str())
            .execute(&self.pool)
            .await?;
        let history = sqlx::query("DELETE FROM packet_history WHERE meeting_id = ?")
            .bind(meeting_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(state.rows_affected() + history.rows_affected())
    }

    /// Append one produced output to the context's history log.
    ///
    /// Runtime-facing: the dispatcher records hook outputs here; plugins
    /// read them back through [`MeetingStore::get_history`].
    pub async fn append_history(&self, ctx: &ExecutionContext, entry: &HistoryEntry) -> Result<()> {
        let payload = serde_json::to_string(&entry.payload)?;
        sqlx::query(
            r#"INSERT INTO packet_history (plugin_name, meeting_id, source, payload, ts)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&ctx.plugin_name)
        .bind(ctx.meeting_id.as_str())
        .bind(&entry.source)
        .bind(payload)
        .bind(entry.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Windowed replay of the outputs this context produced.
    ///
    /// `not_before` is applied first as an inclusive timestamp floor, then
    /// `num_packets` caps the result to the most recent N. At least one
    /// filter must be supplied, and a cap of zero is rejected. Results come
    /// back in non-decreasing timestamp order (insertion order breaks ties).
    pub async fn get_history(
        &self,
        ctx: &ExecutionContext,
        num_packets: Option<usize>,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<HistoryEntry>> {
        if num_packets.is_none() && not_before.is_none() {
            return Err(Error::invalid_query(
                "either num_packets or not_before must be supplied",
            ));
        }
        if num_packets == Some(0) {
            return Err(Error::invalid_query("num_packets must be at least 1"));
        }

        let floor = not_before.map_or(i64::MIN, |t| t.timestamp_millis());
        // LIMIT -1 is SQLite for "no limit".
        let cap = num_packets.map_or(-1, |n| n as i64);

        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"SELECT source, payload, ts FROM packet_history
               WHERE plugin_name = ? AND meeting_id = ? AND ts >= ?
               ORDER BY ts DESC, id DESC LIMIT ?"#,
        )
        .bind(&ctx.plugin_name)
        .bind(ctx.meeting_id.as_str())
        .bind(floor)
        .bind(cap)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = rows
            .into_iter()
            .map(HistoryRow::into_entry)
            .collect::<Result<Vec<_>>>()?;
        entries.reverse();
        Ok(entries)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn test_store() -> MeetingStore {
        MeetingStore::in_memory().await.unwrap()
    }

    fn ctx(meeting: &str, plugin: &str) -> ExecutionContext {
        ExecutionContext::new(meeting, plugin)
    }

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = test_store().await;
        let c = ctx("m-1", "recap");
        store.set(&c, "turns", &json!(3)).await.unwrap();
        assert_eq!(store.get(&c, "turns").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = test_store().await;
        let c = ctx("m-1", "recap");
        assert_eq!(store.get(&c, "never-set").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = test_store().await;
        let c = ctx("m-1", "recap");
        store.set(&c, "summary", &json!("first")).await.unwrap();
        store.set(&c, "summary", &json!("second")).await.unwrap();
        assert_eq!(
            store.get(&c, "summary").await.unwrap(),
            Some(json!("second"))
        );
    }

    #[tokio::test]
    async fn test_namespace_isolation() {
        let store = test_store().await;
        let recap = ctx("m-1", "recap");
        let actions = ctx("m-1", "actions");
        let other_meeting = ctx("m-2", "recap");

        store.set(&recap, "k", &json!("recap-value")).await.unwrap();
        assert_eq!(store.get(&actions, "k").await.unwrap(), None);
        assert_eq!(store.get(&other_meeting, "k").await.unwrap(), None);

        store.set(&actions, "k", &json!("action-value")).await.unwrap();
        assert_eq!(
            store.get(&recap, "k").await.unwrap(),
            Some(json!("recap-value"))
        );
    }

    #[tokio::test]
    async fn test_delete() {
        let store = test_store().await;
        let c = ctx("m-1", "recap");
        store.set(&c, "k", &json!(1)).await.unwrap();
        assert!(store.delete(&c, "k").await.unwrap());
        assert_eq!(store.get(&c, "k").await.unwrap(), None);
        assert!(!store.delete(&c, "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_set_insert_only() {
        let store = test_store().await;
        let c = ctx("m-1", "recap");
        assert!(store.compare_and_set(&c, "k", None, &json!(1)).await.unwrap());
        // Key now present, insert-only write must not clobber it.
        assert!(!store.compare_and_set(&c, "k", None, &json!(2)).await.unwrap());
        assert_eq!(store.get(&c, "k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_compare_and_set_expected_value() {
        let store = test_store().await;
        let c = ctx("m-1", "recap");
        store.set(&c, "k", &json!(1)).await.unwrap();

        assert!(
            store
                .compare_and_set(&c, "k", Some(&json!(1)), &json!(2))
                .await
                .unwrap()
        );
        assert_eq!(store.get(&c, "k").await.unwrap(), Some(json!(2)));

        // Stale expectation: no write.
        assert!(
            !store
                .compare_and_set(&c, "k", Some(&json!(1)), &json!(3))
                .await
                .unwrap()
        );
        assert_eq!(store.get(&c, "k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_clear_meeting() {
        let store = test_store().await;
        let ended = ctx("m-1", "recap");
        let ongoing = ctx("m-2", "recap");
        store.set(&ended, "k", &json!(1)).await.unwrap();
        store.set(&ongoing, "k", &json!(2)).await.unwrap();
        store
            .append_history(&ended, &HistoryEntry::new(at(1_000), "transcript", json!("x")))
            .await
            .unwrap();

        let removed = store.clear_meeting(&MeetingId::new("m-1")).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.get(&ended, "k").await.unwrap(), None);
        assert_eq!(store.get(&ongoing, "k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_history_floor_filter() {
        let store = test_store().await;
        let c = ctx("m-1", "recap");
        for (ts, text) in [(1_000, "a"), (2_000, "b"), (3_000, "c")] {
            store
                .append_history(&c, &HistoryEntry::new(at(ts), "transcript", json!(text)))
                .await
                .unwrap();
        }

        let entries = store.get_history(&c, None, Some(at(2_000))).await.unwrap();
        let texts: Vec<_> = entries.iter().map(|e| e.payload.clone()).collect();
        assert_eq!(texts, vec![json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn test_history_most_recent_cap_in_order() {
        let store = test_store().await;
        let c = ctx("m-1", "recap");
        for (ts, text) in [(1_000, "a"), (2_000, "b"), (3_000, "c")] {
            store
                .append_history(&c, &HistoryEntry::new(at(ts), "transcript", json!(text)))
                .await
                .unwrap();
        }

        let entries = store.get_history(&c, Some(2), None).await.unwrap();
        assert_eq!(entries.len(), 2);
        // Most recent two, still in ascending timestamp order.
        assert_eq!(entries[0].timestamp, at(2_000));
        assert_eq!(entries[1].timestamp, at(3_000));
    }

    #[tokio::test]
    async fn test_history_floor_then_cap() {
        let store = test_store().await;
        let c = ctx("m-1", "recap");
        for ts in [1_000, 2_000, 3_000, 4_000] {
            store
                .append_history(&c, &HistoryEntry::new(at(ts), "transcript", json!(ts)))
                .await
                .unwrap();
        }

        // Floor keeps 2000..4000, cap keeps the most recent two of those.
        let entries = store
            .get_history(&c, Some(2), Some(at(2_000)))
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp, at(3_000));
        assert_eq!(entries[1].timestamp, at(4_000));
    }

    #[tokio::test]
    async fn test_history_requires_a_filter() {
        let store = test_store().await;
        let c = ctx("m-1", "recap");

        let err = store.get_history(&c, None, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));

        let err = store.get_history(&c, Some(0), None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
    }

    #[tokio::test]
    async fn test_history_isolated_per_context() {
        let store = test_store().await;
        let recap = ctx("m-1", "recap");
        let actions = ctx("m-1", "actions");
        store
            .append_history(&recap, &HistoryEntry::new(at(1_000), "transcript", json!("x")))
            .await
            .unwrap();

        assert!(
            store
                .get_history(&actions, Some(5), None)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huddle.db");
        let store = MeetingStore::open(&path).await.unwrap();

        let c = ctx("m-1", "recap");
        store.set(&c, "k", &json!(1)).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.get(&c, "k").await.unwrap(), Some(json!(1)));
    }
}
