//! Operator tools: run a migration batch on demand and wipe the progress
//! tables.
//!
//! Both are confirmation-gated. The eraser additionally requires a
//! single-use token issued beforehand, and never touches the comment store,
//! so a wiped install can be migrated again from scratch.

use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::migration::{MigrationFailure, MigrationJob};
use crate::persistence::settings::{
    ERASER_NONCE_OPTION, MIGRATION_CURSOR_OPTION, MIGRATION_ERRORS_OPTION,
};
use crate::persistence::{PersistenceError, Settings};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("operation not confirmed")]
    NotConfirmed,
    #[error("invalid or expired erase token")]
    InvalidToken,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<sqlx::Error> for AdminError {
    fn from(e: sqlx::Error) -> Self {
        AdminError::Persistence(e.into())
    }
}

/// What an on-demand migration run did.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationSummary {
    pub inserted: usize,
    pub errors: Vec<MigrationFailure>,
    pub message: String,
}

/// Run one migration batch now.
pub async fn run_migration_now(job: &MigrationJob, confirmed: bool) -> Result<MigrationSummary, AdminError> {
    if !confirmed {
        return Err(AdminError::NotConfirmed);
    }
    let report = job.run(false).await?;
    Ok(MigrationSummary {
        inserted: report.inserted,
        message: report.summary(),
        errors: report.errors,
    })
}

/// Structured tables in delete order (children first).
const ERASED_TABLES: [&str; 4] = ["quiz_grades", "quiz_submissions", "lesson_progress", "course_progress"];

/// Rows deleted per table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EraseReport {
    pub course_progress: u64,
    pub lesson_progress: u64,
    pub quiz_submissions: u64,
    pub quiz_grades: u64,
}

impl EraseReport {
    pub fn total(&self) -> u64 {
        self.course_progress + self.lesson_progress + self.quiz_submissions + self.quiz_grades
    }

    fn set(&mut self, table: &str, count: u64) {
        match table {
            "course_progress" => self.course_progress = count,
            "lesson_progress" => self.lesson_progress = count,
            "quiz_submissions" => self.quiz_submissions = count,
            "quiz_grades" => self.quiz_grades = count,
            _ => {}
        }
    }
}

/// Empties the structured progress tables.
pub struct TableEraser {
    pool: SqlitePool,
    settings: Settings,
}

impl TableEraser {
    pub fn new(pool: SqlitePool, settings: Settings) -> Self {
        Self { pool, settings }
    }

    /// Issue a fresh token, invalidating any earlier one.
    pub async fn issue_token(&self) -> Result<String, AdminError> {
        let token = Uuid::new_v4().to_string();
        self.settings.set(ERASER_NONCE_OPTION, &token).await?;
        Ok(token)
    }

    /// Delete every row of the four progress tables and reset the
    /// migration state, all in one transaction. The token is consumed on
    /// success.
    pub async fn erase(&self, confirmed: bool, token: &str) -> Result<EraseReport, AdminError> {
        if !confirmed {
            return Err(AdminError::NotConfirmed);
        }
        let stored = self.settings.get(ERASER_NONCE_OPTION).await?;
        if stored.as_deref() != Some(token.trim()) || token.trim().is_empty() {
            warn!("Erase rejected: token mismatch");
            return Err(AdminError::InvalidToken);
        }

        let mut tx = self.pool.begin().await?;
        // Consume the token first; a concurrent erase with the same token
        // then deletes nothing here and is rejected.
        let consumed = sqlx::query("DELETE FROM options WHERE option_name = ? AND option_value = ?")
            .bind(ERASER_NONCE_OPTION)
            .bind(token.trim())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if consumed == 0 {
            return Err(AdminError::InvalidToken);
        }

        let mut report = EraseReport::default();
        for table in ERASED_TABLES {
            let deleted = sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?
                .rows_affected();
            report.set(table, deleted);
        }
        sqlx::query("DELETE FROM options WHERE option_name IN (?, ?)")
            .bind(MIGRATION_CURSOR_OPTION)
            .bind(MIGRATION_ERRORS_OPTION)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(
            courses = report.course_progress,
            lessons = report.lesson_progress,
            submissions = report.quiz_submissions,
            grades = report.quiz_grades,
            "Progress tables erased"
        );
        Ok(report)
    }
}
