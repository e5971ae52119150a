//! SQLite-backed repository for lesson progress.

use progress::LessonProgress;
use sqlx::SqlitePool;

use super::helpers::{
    decode_lesson_status, from_db, is_unique_violation, opt_from_db, opt_to_db, placeholders,
    to_db,
};
use crate::persistence::traits::LessonProgressRepository;
use crate::persistence::PersistenceError;

const ENTITY: &str = "lesson progress";

#[derive(sqlx::FromRow)]
struct LessonRow {
    id: i64,
    lesson_id: i64,
    user_id: i64,
    status: String,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl LessonRow {
    fn into_progress(self) -> Result<LessonProgress, PersistenceError> {
        Ok(LessonProgress {
            id: Some(from_db(self.id)),
            lesson_id: from_db(self.lesson_id),
            user_id: from_db(self.user_id),
            status: decode_lesson_status(&self.status)?,
            started_at: opt_from_db(self.started_at),
            completed_at: opt_from_db(self.completed_at),
            created_at: from_db(self.created_at),
            updated_at: from_db(self.updated_at),
        })
    }
}

/// SQLite implementation of [`LessonProgressRepository`].
pub struct SqliteLessonProgressRepository {
    pool: SqlitePool,
}

impl SqliteLessonProgressRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl LessonProgressRepository for SqliteLessonProgressRepository {
    async fn create_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
        started_at: Option<u64>,
    ) -> Result<LessonProgress, PersistenceError> {
        let mut progress = LessonProgress::new(user_id, lesson_id, started_at);

        let inserted: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO lesson_progress
                (lesson_id, user_id, status, started_at, completed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(to_db(lesson_id))
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
                Err(PersistenceError::already_exists(ENTITY, user_id, lesson_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
    ) -> Result<Option<LessonProgress>, PersistenceError> {
        let row: Option<LessonRow> = sqlx::query_as(
            r#"
            SELECT id, lesson_id, user_id, status, started_at, completed_at,
                   created_at, updated_at
            FROM lesson_progress
            WHERE user_id = ? AND lesson_id = ?
            "#,
        )
        .bind(to_db(user_id))
        .bind(to_db(lesson_id))
        .fetch_optional(&self.pool)
        .await?;

        row.map(LessonRow::into_progress).transpose()
    }

    async fn get_or_create_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
    ) -> Result<LessonProgress, PersistenceError> {
        let fresh = LessonProgress::new(user_id, lesson_id, None);

        sqlx::query(
            r#"
            INSERT INTO lesson_progress
                (lesson_id, user_id, status, started_at, completed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, NULL, ?, ?)
            ON CONFLICT (user_id, lesson_id) DO NOTHING
            "#,
        )
        .bind(to_db(lesson_id))
        .bind(to_db(user_id))
        .bind(fresh.status.as_str())
        .bind(opt_to_db(fresh.started_at))
        .bind(to_db(fresh.created_at))
        .bind(to_db(fresh.updated_at))
        .execute(&self.pool)
        .await?;

        self.get_lesson_progress(user_id, lesson_id)
            .await?
            .ok_or_else(|| PersistenceError::not_found(ENTITY, user_id, lesson_id))
    }

    async fn save_lesson_progress(&self, progress: &LessonProgress) -> Result<(), PersistenceError> {
        progress.validate()?;

        sqlx::query(
            r#"
            INSERT INTO lesson_progress
                (lesson_id, user_id, status, started_at, completed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, lesson_id) DO UPDATE SET
                status = excluded.status,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(to_db(progress.lesson_id))
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

    async fn delete_lesson_progress(&self, user_id: u64, lesson_id: u64) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM lesson_progress WHERE user_id = ? AND lesson_id = ?")
            .bind(to_db(user_id))
            .bind(to_db(lesson_id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_lesson_progress_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM lesson_progress WHERE user_id = ?")
            .bind(to_db(user_id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_completed_lessons(
        &self,
        user_id: u64,
        lesson_ids: &[u64],
    ) -> Result<u64, PersistenceError> {
        if lesson_ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "SELECT COUNT(*) FROM lesson_progress \
             WHERE user_id = ? AND status = 'complete' AND lesson_id IN ({})",
            placeholders(lesson_ids.len())
        );
        let mut query = sqlx::query_as::<_, (i64,)>(&sql).bind(to_db(user_id));
        for lesson_id in lesson_ids {
            query = query.bind(to_db(*lesson_id));
        }
        let row = query.fetch_one(&self.pool).await?;
        Ok(from_db(row.0))
    }
}
