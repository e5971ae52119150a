//! Configuration for the progress tracker.
//!
//! Handles data directory configuration with the following precedence:
//! 1. PROGRESS_TRACKER_DATA_DIR environment variable
//! 2. ~/.config/progress-tracker/data (production default)
//! 3. ./data (fallback for development)
//!
//! Storage settings (backend selector, sync toggle) are not read from the
//! environment: they live in the database so every request sees the current
//! value. See [`crate::persistence::Settings`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_CONFIG_DIR: &str = ".config/progress-tracker/data";
const DEV_DATA_DIR: &str = "./data";
const DATABASE_FILE: &str = "progress.db";

/// Default number of legacy records converted per migration call.
pub const DEFAULT_MIGRATION_BATCH_SIZE: u32 = 100;

/// Get the data directory for persistence.
///
/// Priority:
/// 1. PROGRESS_TRACKER_DATA_DIR env variable if set
/// 2. $HOME/.config/progress-tracker/data if HOME is set
/// 3. ./data as fallback
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PROGRESS_TRACKER_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(DEFAULT_CONFIG_DIR);
    }

    PathBuf::from(DEV_DATA_DIR)
}

/// Path of the SQLite database inside the data directory.
pub fn get_database_path() -> PathBuf {
    get_data_dir().join(DATABASE_FILE)
}

/// Get the migration batch size.
///
/// Priority:
/// 1. PROGRESS_TRACKER_MIGRATION_BATCH env variable if set (falls back to
///    the default if the value is not a positive integer)
/// 2. 100 as fallback
pub fn get_migration_batch_size() -> u32 {
    parse_batch_size(std::env::var("PROGRESS_TRACKER_MIGRATION_BATCH").ok().as_deref())
}

fn parse_batch_size(raw: Option<&str>) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_MIGRATION_BATCH_SIZE)
}

/// Which store serves reads (and, without synchronization, writes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// Legacy comment records with metadata.
    #[default]
    Comments,
    /// Dedicated progress tables.
    Tables,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Comments => "comments",
            StorageBackend::Tables => "tables",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown storage backend '{0}' (expected 'comments' or 'tables')")]
pub struct UnknownBackend(pub String);

impl FromStr for StorageBackend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "comments" | "comment" => Ok(StorageBackend::Comments),
            "tables" | "table" | "custom_tables" => Ok(StorageBackend::Tables),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

/// Snapshot of the two storage settings for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub sync_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_data_dir_fallback() {
        // Note: returns PROGRESS_TRACKER_DATA_DIR when it is set, which is
        // correct behavior too.
        let dir = get_data_dir();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn test_database_path_in_data_dir() {
        let path = get_database_path();
        assert!(path.ends_with("progress.db"));
    }

    #[test]
    fn test_parse_batch_size() {
        assert_eq!(parse_batch_size(None), DEFAULT_MIGRATION_BATCH_SIZE);
        assert_eq!(parse_batch_size(Some("250")), 250);
        assert_eq!(parse_batch_size(Some("0")), DEFAULT_MIGRATION_BATCH_SIZE);
        assert_eq!(parse_batch_size(Some("lots")), DEFAULT_MIGRATION_BATCH_SIZE);
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("comments".parse::<StorageBackend>().unwrap(), StorageBackend::Comments);
        assert_eq!("tables".parse::<StorageBackend>().unwrap(), StorageBackend::Tables);
        assert_eq!(
            "custom_tables".parse::<StorageBackend>().unwrap(),
            StorageBackend::Tables
        );
        let err = "redis".parse::<StorageBackend>().unwrap_err();
        assert!(err.to_string().contains("redis"));
    }
}
