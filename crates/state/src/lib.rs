//! SQLite-backed persistence for meeting plugins: keyed state rows scoped to
//! one plugin's execution context, plus an append-only history of the
//! outputs it produced.

pub mod error;
pub mod store;

pub use {
    error::{Error, PersistenceError, Result},
    store::{HistoryEntry, MeetingStore},
};

/// Run embedded migrations (idempotent).
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
