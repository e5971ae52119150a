//! Progress persistence.
//!
//! Two interchangeable backends implement the repository traits in
//! [`traits`]:
//!
//! - [`comments`]: the legacy store, one generic event record per entity
//!   with the remaining fields in a metadata table.
//! - [`sqlite`]: dedicated, typed tables with natural-key unique indexes.
//!
//! [`factory`] decides per call which backend serves reads and whether
//! writes are mirrored to both; [`guest`] substitutes a session-bound,
//! non-durable implementation for anonymous previews.

pub mod comments;
pub mod factory;
pub mod guest;
pub mod settings;
pub mod sqlite;
pub mod traits;

pub use factory::{ProgressStorage, RepositoryFactory, RequestContext, RoutedRepositories};
pub use guest::GuestSession;
pub use settings::Settings;
pub use traits::{
    CourseProgressRepository, GradeRepository, LessonProgressRepository, QuizSubmissionRepository,
};

use progress::ProgressError;

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Schema migration error: {0}")]
    Schema(#[from] sqlx::migrate::MigrateError),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("{entity} already exists for {key}")]
    AlreadyExists { entity: &'static str, key: String },
    #[error("{entity} not found for {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("Corrupt {entity} record {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: u64,
        reason: String,
    },
    #[error("Invalid progress data: {0}")]
    Validation(#[from] ProgressError),
}

impl PersistenceError {
    pub(crate) fn already_exists(entity: &'static str, user_id: u64, object_id: u64) -> Self {
        PersistenceError::AlreadyExists {
            entity,
            key: format!("user {user_id}, object {object_id}"),
        }
    }

    pub(crate) fn not_found(entity: &'static str, user_id: u64, object_id: u64) -> Self {
        PersistenceError::NotFound {
            entity,
            key: format!("user {user_id}, object {object_id}"),
        }
    }
}
