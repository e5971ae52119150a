//! Site options stored in the `options` table.
//!
//! Holds the storage backend selector, the synchronization toggle, migration
//! bookkeeping and the eraser nonce. Values are read on every call; nothing
//! is cached across requests so operators can flip settings at runtime.

use sqlx::SqlitePool;

use super::PersistenceError;
use crate::config::{StorageBackend, StorageSettings};

pub const BACKEND_OPTION: &str = "progress_storage_backend";
/// Last selector value that parsed, used when the current one does not.
pub const BACKEND_LAST_GOOD_OPTION: &str = "progress_storage_backend_last_good";
pub const SYNC_OPTION: &str = "progress_storage_sync";
pub const MIGRATION_CURSOR_OPTION: &str = "progress_migration_last_id";
pub const MIGRATION_ERRORS_OPTION: &str = "progress_migration_errors";
pub const ERASER_NONCE_OPTION: &str = "progress_eraser_nonce";

/// Typed access to the options table.
#[derive(Clone)]
pub struct Settings {
    pool: SqlitePool,
}

impl Settings {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, name: &str) -> Result<Option<String>, PersistenceError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT option_value FROM options WHERE option_name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    pub async fn set(&self, name: &str, value: &str) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO options (option_name, option_value) VALUES (?, ?)
            ON CONFLICT (option_name) DO UPDATE SET option_value = excluded.option_value
            "#,
        )
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM options WHERE option_name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Read the selected backend, failing closed to the last known-good
    /// value when the stored selector is not recognised.
    pub async fn storage_backend(&self) -> Result<StorageBackend, PersistenceError> {
        let stored = self.get(BACKEND_OPTION).await?;
        let Some(raw) = stored else {
            return self.last_known_good().await;
        };

        match raw.parse::<StorageBackend>() {
            Ok(backend) => {
                if self.get(BACKEND_LAST_GOOD_OPTION).await?.as_deref() != Some(backend.as_str()) {
                    self.set(BACKEND_LAST_GOOD_OPTION, backend.as_str()).await?;
                }
                Ok(backend)
            }
            Err(e) => {
                let fallback = self.last_known_good().await?;
                tracing::warn!(
                    value = %raw,
                    fallback = %fallback,
                    "Unrecognised storage backend setting: {}",
                    e
                );
                Ok(fallback)
            }
        }
    }

    /// The last selector that parsed, or the default before any did.
    async fn last_known_good(&self) -> Result<StorageBackend, PersistenceError> {
        let stored = self.get(BACKEND_LAST_GOOD_OPTION).await?;
        Ok(stored
            .and_then(|raw| raw.parse::<StorageBackend>().ok())
            .unwrap_or_default())
    }

    pub async fn set_storage_backend(&self, backend: StorageBackend) -> Result<(), PersistenceError> {
        self.set(BACKEND_OPTION, backend.as_str()).await?;
        self.set(BACKEND_LAST_GOOD_OPTION, backend.as_str()).await?;
        tracing::info!(backend = %backend, "Storage backend selected");
        Ok(())
    }

    pub async fn sync_enabled(&self) -> Result<bool, PersistenceError> {
        let stored = self.get(SYNC_OPTION).await?;
        Ok(matches!(stored.as_deref(), Some("1") | Some("true") | Some("yes")))
    }

    pub async fn set_sync_enabled(&self, enabled: bool) -> Result<(), PersistenceError> {
        self.set(SYNC_OPTION, if enabled { "1" } else { "0" }).await?;
        tracing::info!(enabled, "Storage synchronization toggled");
        Ok(())
    }

    /// Both storage settings, read fresh.
    pub async fn storage_settings(&self) -> Result<StorageSettings, PersistenceError> {
        Ok(StorageSettings {
            backend: self.storage_backend().await?,
            sync_enabled: self.sync_enabled().await?,
        })
    }
}
