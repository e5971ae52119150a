//! SQLite-backed repository for quiz submissions.

use progress::QuizSubmission;
use sqlx::SqlitePool;

use super::helpers::{from_db, is_unique_violation, to_db};
use crate::persistence::traits::QuizSubmissionRepository;
use crate::persistence::PersistenceError;

const ENTITY: &str = "quiz submission";

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: i64,
    quiz_id: i64,
    user_id: i64,
    final_grade: Option<f64>,
    created_at: i64,
    updated_at: i64,
}

impl From<SubmissionRow> for QuizSubmission {
    fn from(r: SubmissionRow) -> Self {
        Self {
            id: Some(from_db(r.id)),
            quiz_id: from_db(r.quiz_id),
            user_id: from_db(r.user_id),
            final_grade: r.final_grade,
            created_at: from_db(r.created_at),
            updated_at: from_db(r.updated_at),
        }
    }
}

/// Look up this backend's row id for a (user, quiz) submission.
pub(crate) async fn submission_row_id(
    pool: &SqlitePool,
    user_id: u64,
    quiz_id: u64,
) -> Result<Option<i64>, PersistenceError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM quiz_submissions WHERE user_id = ? AND quiz_id = ?")
            .bind(to_db(user_id))
            .bind(to_db(quiz_id))
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|r| r.0))
}

/// SQLite implementation of [`QuizSubmissionRepository`].
pub struct SqliteQuizSubmissionRepository {
    pool: SqlitePool,
}

impl SqliteQuizSubmissionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl QuizSubmissionRepository for SqliteQuizSubmissionRepository {
    async fn create_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<QuizSubmission, PersistenceError> {
        let mut submission = QuizSubmission::new(user_id, quiz_id);

        let inserted: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO quiz_submissions (quiz_id, user_id, final_grade, created_at, updated_at)
            VALUES (?, ?, NULL, ?, ?)
            RETURNING id
            "#,
        )
        .bind(to_db(quiz_id))
        .bind(to_db(user_id))
        .bind(to_db(submission.created_at))
        .bind(to_db(submission.updated_at))
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok((id,)) => {
                submission.id = Some(from_db(id));
                Ok(submission)
            }
            Err(e) if is_unique_violation(&e) => {
                Err(PersistenceError::already_exists(ENTITY, user_id, quiz_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<Option<QuizSubmission>, PersistenceError> {
        let row: Option<SubmissionRow> = sqlx::query_as(
            r#"
            SELECT id, quiz_id, user_id, final_grade, created_at, updated_at
            FROM quiz_submissions
            WHERE user_id = ? AND quiz_id = ?
            "#,
        )
        .bind(to_db(user_id))
        .bind(to_db(quiz_id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(QuizSubmission::from))
    }

    async fn get_or_create_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<QuizSubmission, PersistenceError> {
        let fresh = QuizSubmission::new(user_id, quiz_id);

        sqlx::query(
            r#"
            INSERT INTO quiz_submissions (quiz_id, user_id, final_grade, created_at, updated_at)
            VALUES (?, ?, NULL, ?, ?)
            ON CONFLICT (user_id, quiz_id) DO NOTHING
            "#,
        )
        .bind(to_db(quiz_id))
        .bind(to_db(user_id))
        .bind(to_db(fresh.created_at))
        .bind(to_db(fresh.updated_at))
        .execute(&self.pool)
        .await?;

        self.get_submission(user_id, quiz_id)
            .await?
            .ok_or_else(|| PersistenceError::not_found(ENTITY, user_id, quiz_id))
    }

    async fn save_submission(&self, submission: &QuizSubmission) -> Result<(), PersistenceError> {
        submission.validate()?;

        sqlx::query(
            r#"
            INSERT INTO quiz_submissions (quiz_id, user_id, final_grade, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (user_id, quiz_id) DO UPDATE SET
                final_grade = excluded.final_grade,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(to_db(submission.quiz_id))
        .bind(to_db(submission.user_id))
        .bind(submission.final_grade)
        .bind(to_db(submission.created_at))
        .bind(to_db(submission.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_submission(&self, user_id: u64, quiz_id: u64) -> Result<(), PersistenceError> {
        // Grades go with it via ON DELETE CASCADE.
        sqlx::query("DELETE FROM quiz_submissions WHERE user_id = ? AND quiz_id = ?")
            .bind(to_db(user_id))
            .bind(to_db(quiz_id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_submissions_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM quiz_submissions WHERE user_id = ?")
            .bind(to_db(user_id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::Database;

    async fn test_db() -> (Database, SqliteQuizSubmissionRepository) {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteQuizSubmissionRepository::new(db.pool().clone());
        (db, repo)
    }

    #[tokio::test]
    async fn test_create_get_and_grade() {
        let (_db, repo) = test_db().await;
        let mut submission = repo.create_submission(1, 500).await.unwrap();
        assert_eq!(submission.final_grade, None);

        submission.set_final_grade(Some(85.0)).unwrap();
        repo.save_submission(&submission).await.unwrap();

        let loaded = repo.get_submission(1, 500).await.unwrap().unwrap();
        assert_eq!(loaded.final_grade, Some(85.0));
        assert_eq!(loaded.id, submission.id);
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let (_db, repo) = test_db().await;
        let first = repo.get_or_create_submission(1, 500).await.unwrap();
        let second = repo.get_or_create_submission(1, 500).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_grades() {
        let (db, repo) = test_db().await;
        let submission = repo.create_submission(1, 500).await.unwrap();
        sqlx::query(
            "INSERT INTO quiz_grades (submission_id, answer_id, question_id, points, created_at, updated_at) \
             VALUES (?, 1, 1, 3, 0, 0)",
        )
        .bind(to_db(submission.id.unwrap()))
        .execute(db.pool())
        .await
        .unwrap();

        repo.delete_submission(1, 500).await.unwrap();

        let grades: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM quiz_grades")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(grades.0, 0);
        assert_eq!(repo.get_submission(1, 500).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_submission_row_id_lookup() {
        let (db, repo) = test_db().await;
        let submission = repo.create_submission(7, 70).await.unwrap();
        let id = submission_row_id(db.pool(), 7, 70).await.unwrap();
        assert_eq!(id.map(from_db), submission.id);
        assert_eq!(submission_row_id(db.pool(), 7, 71).await.unwrap(), None);
    }
}
