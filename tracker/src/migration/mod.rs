//! Cursor-based migration from the comment store into the progress tables.
//!
//! Each call converts one batch of legacy records with ids beyond the stored
//! cursor. Inserts ignore natural-key conflicts, so re-running a batch (or
//! running over rows the dual-write path already produced) is harmless.

pub mod converter;
pub mod schedule;

pub use converter::{convert, Converted};
pub use schedule::{InMemoryScheduler, JobScheduler, MigrationScheduler, SchedulerError, TickOutcome};

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config;
use crate::persistence::comments::{CommentRecord, CommentStore};
use crate::persistence::settings::{MIGRATION_CURSOR_OPTION, MIGRATION_ERRORS_OPTION};
use crate::persistence::sqlite::helpers::{opt_to_db, to_db};
use crate::persistence::{PersistenceError, Settings};

/// What happened to one legacy record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    AlreadyMigrated,
    Failed,
}

/// A record that could not be migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFailure {
    pub comment_id: u64,
    pub message: String,
}

/// Result of one migration batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub processed: usize,
    pub inserted: usize,
    pub already_migrated: usize,
    pub errors: Vec<MigrationFailure>,
    pub cursor_before: u64,
    pub cursor_after: u64,
}

impl MigrationReport {
    fn record(&mut self, outcome: RecordOutcome) {
        self.processed += 1;
        match outcome {
            RecordOutcome::Inserted => self.inserted += 1,
            RecordOutcome::AlreadyMigrated => self.already_migrated += 1,
            RecordOutcome::Failed => {}
        }
    }

    /// One-line operator summary.
    pub fn summary(&self) -> String {
        let mut line = format!("{} rows migrated", self.inserted);
        if self.already_migrated > 0 {
            line.push_str(&format!(", {} already migrated", self.already_migrated));
        }
        if !self.errors.is_empty() {
            line.push_str(&format!(", {} errors", self.errors.len()));
        }
        if self.dry_run {
            line.push_str(" (dry run)");
        }
        line
    }
}

/// Where the migration stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    pub cursor: u64,
    /// Tracked legacy records with ids beyond the cursor.
    pub remaining: u64,
    pub errors: usize,
}

impl MigrationStatus {
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// Converts legacy comment records into the progress tables in batches.
#[derive(Clone)]
pub struct MigrationJob {
    pool: SqlitePool,
    settings: Settings,
    comments: CommentStore,
    batch_size: u32,
    running: Arc<Mutex<()>>,
}

impl MigrationJob {
    pub fn new(pool: SqlitePool, settings: Settings) -> Self {
        Self {
            comments: CommentStore::new(pool.clone()),
            pool,
            settings,
            batch_size: config::get_migration_batch_size(),
            running: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Migrate one batch. A dry run performs every insert inside a
    /// transaction that is rolled back, and persists neither cursor nor
    /// errors.
    pub async fn run(&self, dry_run: bool) -> Result<MigrationReport, PersistenceError> {
        let _guard = self.running.lock().await;

        let cursor = self.cursor().await?;
        let records = self.comments.list_after(cursor, self.batch_size).await?;
        let mut report = MigrationReport {
            dry_run,
            cursor_before: cursor,
            cursor_after: cursor,
            ..Default::default()
        };

        for record in &records {
            let comment_id = record.comment_id.unwrap_or_default();
            let outcome = match self.migrate_record(record, dry_run).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(comment_id, error = %e, "Failed to migrate legacy record");
                    report.errors.push(MigrationFailure {
                        comment_id,
                        message: e.to_string(),
                    });
                    RecordOutcome::Failed
                }
            };
            debug!(comment_id, ?outcome, "Legacy record processed");
            report.record(outcome);
            report.cursor_after = report.cursor_after.max(comment_id);
        }

        if !dry_run && !records.is_empty() {
            if !report.errors.is_empty() {
                let mut errors = self.errors().await?;
                errors.extend(report.errors.iter().cloned());
                self.settings
                    .set(MIGRATION_ERRORS_OPTION, &serde_json::to_string(&errors)?)
                    .await?;
            }
            self.settings
                .set(MIGRATION_CURSOR_OPTION, &report.cursor_after.to_string())
                .await?;
        }

        info!(
            dry_run,
            processed = report.processed,
            inserted = report.inserted,
            already_migrated = report.already_migrated,
            errors = report.errors.len(),
            cursor = report.cursor_after,
            "Migration batch finished"
        );
        Ok(report)
    }

    async fn migrate_record(
        &self,
        record: &CommentRecord,
        dry_run: bool,
    ) -> Result<RecordOutcome, PersistenceError> {
        let converted = convert(record)?;
        let mut tx = self.pool.begin().await?;
        let outcome = insert_converted(&mut tx, &converted).await?;
        if dry_run {
            tx.rollback().await?;
        } else {
            tx.commit().await?;
        }
        Ok(outcome)
    }

    /// Id of the last legacy record processed, 0 before the first batch.
    pub async fn cursor(&self) -> Result<u64, PersistenceError> {
        let stored = self.settings.get(MIGRATION_CURSOR_OPTION).await?;
        match stored {
            None => Ok(0),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| PersistenceError::Migration(format!("unreadable migration cursor '{raw}'"))),
        }
    }

    /// Every failure recorded since the last reset.
    pub async fn errors(&self) -> Result<Vec<MigrationFailure>, PersistenceError> {
        match self.settings.get(MIGRATION_ERRORS_OPTION).await? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }

    /// Forget the cursor and the error list so the next run starts over.
    pub async fn reset(&self) -> Result<(), PersistenceError> {
        let _guard = self.running.lock().await;
        self.settings.remove(MIGRATION_CURSOR_OPTION).await?;
        self.settings.remove(MIGRATION_ERRORS_OPTION).await?;
        info!("Migration state reset");
        Ok(())
    }

    pub async fn status(&self) -> Result<MigrationStatus, PersistenceError> {
        let cursor = self.cursor().await?;
        Ok(MigrationStatus {
            cursor,
            remaining: self.comments.count_after(cursor).await?,
            errors: self.errors().await?.len(),
        })
    }
}

/// Write converted rows, ignoring natural-key conflicts.
async fn insert_converted(
    conn: &mut SqliteConnection,
    converted: &Converted,
) -> Result<RecordOutcome, sqlx::Error> {
    let inserted = match converted {
        Converted::Course(course) => {
            sqlx::query(
                r#"
                INSERT INTO course_progress
                    (course_id, user_id, status, started_at, completed_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (user_id, course_id) DO NOTHING
                "#,
            )
            .bind(to_db(course.course_id))
            .bind(to_db(course.user_id))
            .bind(course.status.as_str())
            .bind(opt_to_db(course.started_at))
            .bind(opt_to_db(course.completed_at))
            .bind(to_db(course.created_at))
            .bind(to_db(course.updated_at))
            .execute(&mut *conn)
            .await?
            .rows_affected()
                > 0
        }
        Converted::Lesson(lesson) => {
            sqlx::query(
                r#"
                INSERT INTO lesson_progress
                    (lesson_id, user_id, status, started_at, completed_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (user_id, lesson_id) DO NOTHING
                "#,
            )
            .bind(to_db(lesson.lesson_id))
            .bind(to_db(lesson.user_id))
            .bind(lesson.status.as_str())
            .bind(opt_to_db(lesson.started_at))
            .bind(opt_to_db(lesson.completed_at))
            .bind(to_db(lesson.created_at))
            .bind(to_db(lesson.updated_at))
            .execute(&mut *conn)
            .await?
            .rows_affected()
                > 0
        }
        Converted::Submission { submission, grades } => {
            let row: Option<(i64,)> = sqlx::query_as(
                r#"
                INSERT INTO quiz_submissions (quiz_id, user_id, final_grade, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (user_id, quiz_id) DO NOTHING
                RETURNING id
                "#,
            )
            .bind(to_db(submission.quiz_id))
            .bind(to_db(submission.user_id))
            .bind(submission.final_grade)
            .bind(to_db(submission.created_at))
            .bind(to_db(submission.updated_at))
            .fetch_optional(&mut *conn)
            .await?;

            // An existing submission keeps whatever grades it already has.
            let Some((submission_id,)) = row else {
                return Ok(RecordOutcome::AlreadyMigrated);
            };
            for grade in grades {
                sqlx::query(
                    r#"
                    INSERT INTO quiz_grades
                        (submission_id, answer_id, question_id, points, feedback, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT (submission_id, question_id) DO NOTHING
                    "#,
                )
                .bind(submission_id)
                .bind(to_db(grade.answer_id))
                .bind(to_db(grade.question_id))
                .bind(i64::from(grade.points))
                .bind(grade.feedback.as_deref())
                .bind(to_db(grade.created_at))
                .bind(to_db(grade.updated_at))
                .execute(&mut *conn)
                .await?;
            }
            true
        }
    };

    Ok(if inserted {
        RecordOutcome::Inserted
    } else {
        RecordOutcome::AlreadyMigrated
    })
}
