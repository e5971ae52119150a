//! SQLite-backed repository for course progress.

use progress::CourseProgress;
use sqlx::SqlitePool;

use super::helpers::{
    decode_course_status, from_db, is_unique_violation, opt_from_db, opt_to_db, to_db,
};
use crate::persistence::traits::CourseProgressRepository;
use crate::persistence::PersistenceError;

const ENTITY: &str = "course progress";

/// Row type for course progress queries, mapped via `sqlx::FromRow`.
#[derive(sqlx::FromRow)]
struct CourseRow {
    id: i64,
    course_id: i64,
    user_id: i64,
    status: String,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl CourseRow {
    fn into_progress(self) -> Result<CourseProgress, PersistenceError> {
        Ok(CourseProgress {
            id: Some(from_db(self.id)),
            user_id: from_db(self.user_id),
            course_id: from_db(self.course_id),
            status: decode_course_status(&self.status)?,
            started_at: opt_from_db(self.started_at),
            completed_at: opt_from_db(self.completed_at),
            created_at: from_db(self.created_at),
            updated_at: from_db(self.updated_at),
        })
    }
}

/// SQLite implementation of [`CourseProgressRepository`].
pub struct SqliteCourseProgressRepository {
    pool: SqlitePool,
}

impl SqliteCourseProgressRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl CourseProgressRepository for SqliteCourseProgressRepository {
    async fn create_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<CourseProgress, PersistenceError> {
        let mut progress = CourseProgress::new(user_id, course_id);

        let inserted: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO course_progress
                (course_id, user_id, status, started_at, completed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(to_db(course_id))
        .bind(to_db(user_id))
        .bind(progress.status.as_str())
        .bind(opt_to_db(progress.started_at))
        .bind(opt_to_db(progress.completed_at))
        .bind(to_db(progress.created_at))
        .bind(to_db(progress.updated_at))
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok((id,)) => {
                progress.id = Some(from_db(id));
                Ok(progress)
            }
            Err(e) if is_unique_violation(&e) => {
                Err(PersistenceError::already_exists(ENTITY, user_id, course_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<Option<CourseProgress>, PersistenceError> {
        let row: Option<CourseRow> = sqlx::query_as(
            r#"
            SELECT id, course_id, user_id, status, started_at, completed_at,
                   created_at, updated_at
            FROM course_progress
            WHERE user_id = ? AND course_id = ?
            "#,
        )
        .bind(to_db(user_id))
        .bind(to_db(course_id))
        .fetch_optional(&self.pool)
        .await?;

        row.map(CourseRow::into_progress).transpose()
    }

    async fn get_or_create_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<CourseProgress, PersistenceError> {
        let fresh = CourseProgress::new(user_id, course_id);

        // A racing request may win the insert; the unique key turns our
        // insert into a no-op and the re-fetch below returns its row.
        sqlx::query(
            r#"
            INSERT INTO course_progress
                (course_id, user_id, status, started_at, completed_at, created_at, updated_at)
            VALUES (?, ?, ?, NULL, NULL, ?, ?)
            ON CONFLICT (user_id, course_id) DO NOTHING
            "#,
        )
        .bind(to_db(course_id))
        .bind(to_db(user_id))
        .bind(fresh.status.as_str())
        .bind(to_db(fresh.created_at))
        .bind(to_db(fresh.updated_at))
        .execute(&self.pool)
        .await?;

        self.get_course_progress(user_id, course_id)
            .await?
            .ok_or_else(|| PersistenceError::not_found(ENTITY, user_id, course_id))
    }

    async fn save_course_progress(&self, progress: &CourseProgress) -> Result<(), PersistenceError> {
        progress.validate()?;

        sqlx::query(
            r#"
            INSERT INTO course_progress
                (course_id, user_id, status, started_at, completed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, course_id) DO UPDATE SET
                status = excluded.status,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(to_db(progress.course_id))
        .bind(to_db(progress.user_id))
        .bind(progress.status.as_str())
        .bind(opt_to_db(progress.started_at))
        .bind(opt_to_db(progress.completed_at))
        .bind(to_db(progress.created_at))
        .bind(to_db(progress.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_course_progress(&self, user_id: u64, course_id: u64) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM course_progress WHERE user_id = ? AND course_id = ?")
            .bind(to_db(user_id))
            .bind(to_db(course_id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_course_progress_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM course_progress WHERE user_id = ?")
            .bind(to_db(user_id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
