//! SQLite-backed repository for per-question quiz grades.

use progress::{Grade, QuizSubmission};
use sqlx::{SqliteConnection, SqlitePool};

use super::helpers::{from_db, is_unique_violation, to_db};
use super::submission_repo::submission_row_id;
use crate::persistence::traits::GradeRepository;
use crate::persistence::PersistenceError;

const ENTITY: &str = "quiz grade";
const SUBMISSION: &str = "quiz submission";

#[derive(sqlx::FromRow)]
struct GradeRow {
    id: i64,
    answer_id: i64,
    question_id: i64,
    points: i64,
    feedback: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl GradeRow {
    fn into_grade(self) -> Result<Grade, PersistenceError> {
        let points = u32::try_from(self.points).map_err(|_| PersistenceError::Corrupt {
            entity: ENTITY,
            id: from_db(self.id),
            reason: format!("points out of range: {}", self.points),
        })?;
        Ok(Grade {
            id: Some(from_db(self.id)),
            answer_id: from_db(self.answer_id),
            question_id: from_db(self.question_id),
            points,
            feedback: self.feedback,
            created_at: from_db(self.created_at),
            updated_at: from_db(self.updated_at),
        })
    }
}

/// Insert or replace the grade for one question of a submission.
async fn upsert_grade(
    conn: &mut SqliteConnection,
    submission_id: i64,
    grade: &Grade,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO quiz_grades
            (submission_id, answer_id, question_id, points, feedback, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (submission_id, question_id) DO UPDATE SET
            answer_id = excluded.answer_id,
            points = excluded.points,
            feedback = excluded.feedback,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(submission_id)
    .bind(to_db(grade.answer_id))
    .bind(to_db(grade.question_id))
    .bind(i64::from(grade.points))
    .bind(grade.feedback.as_deref())
    .bind(to_db(grade.created_at))
    .bind(to_db(grade.updated_at))
    .execute(conn)
    .await?;
    Ok(())
}

/// SQLite implementation of [`GradeRepository`].
pub struct SqliteGradeRepository {
    pool: SqlitePool,
}

impl SqliteGradeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn require_submission(&self, submission: &QuizSubmission) -> Result<i64, PersistenceError> {
        submission_row_id(&self.pool, submission.user_id, submission.quiz_id)
            .await?
            .ok_or_else(|| {
                PersistenceError::not_found(SUBMISSION, submission.user_id, submission.quiz_id)
            })
    }
}

impl GradeRepository for SqliteGradeRepository {
    async fn create_grade(
        &self,
        submission: &QuizSubmission,
        answer_id: u64,
        question_id: u64,
        points: u32,
        feedback: Option<String>,
    ) -> Result<Grade, PersistenceError> {
        let submission_id = self.require_submission(submission).await?;
        let mut grade = Grade::new(answer_id, question_id, points, feedback);

        let inserted: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO quiz_grades
                (submission_id, answer_id, question_id, points, feedback, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(submission_id)
        .bind(to_db(answer_id))
        .bind(to_db(question_id))
        .bind(i64::from(points))
        .bind(grade.feedback.as_deref())
        .bind(to_db(grade.created_at))
        .bind(to_db(grade.updated_at))
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok((id,)) => {
                grade.id = Some(from_db(id));
                Ok(grade)
            }
            Err(e) if is_unique_violation(&e) => Err(PersistenceError::AlreadyExists {
                entity: ENTITY,
                key: format!("submission {submission_id}, question {question_id}"),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_grade(
        &self,
        submission: &QuizSubmission,
        question_id: u64,
    ) -> Result<Option<Grade>, PersistenceError> {
        let row: Option<GradeRow> = sqlx::query_as(
            r#"
            SELECT g.id, g.answer_id, g.question_id, g.points, g.feedback,
                   g.created_at, g.updated_at
            FROM quiz_grades g
            JOIN quiz_submissions s ON s.id = g.submission_id
            WHERE s.user_id = ? AND s.quiz_id = ? AND g.question_id = ?
            "#,
        )
        .bind(to_db(submission.user_id))
        .bind(to_db(submission.quiz_id))
        .bind(to_db(question_id))
        .fetch_optional(&self.pool)
        .await?;

        row.map(GradeRow::into_grade).transpose()
    }

    async fn get_all_grades(
        &self,
        submission: &QuizSubmission,
    ) -> Result<Vec<Grade>, PersistenceError> {
        let rows: Vec<GradeRow> = sqlx::query_as(
            r#"
            SELECT g.id, g.answer_id, g.question_id, g.points, g.feedback,
                   g.created_at, g.updated_at
            FROM quiz_grades g
            JOIN quiz_submissions s ON s.id = g.submission_id
            WHERE s.user_id = ? AND s.quiz_id = ?
            ORDER BY g.question_id
            "#,
        )
        .bind(to_db(submission.user_id))
        .bind(to_db(submission.quiz_id))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GradeRow::into_grade).collect()
    }

    async fn save_grade(&self, submission: &QuizSubmission, grade: &Grade) -> Result<(), PersistenceError> {
        let submission_id = self.require_submission(submission).await?;
        let mut conn = self.pool.acquire().await?;
        upsert_grade(&mut conn, submission_id, grade).await?;
        Ok(())
    }

    async fn save_grades(
        &self,
        submission: &QuizSubmission,
        grades: &[Grade],
    ) -> Result<(), PersistenceError> {
        let submission_id = self.require_submission(submission).await?;

        let mut tx = self.pool.begin().await?;
        for grade in grades {
            upsert_grade(&mut tx, submission_id, grade).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn delete_all_grades(&self, submission: &QuizSubmission) -> Result<(), PersistenceError> {
        let submission_id = self.require_submission(submission).await?;
        sqlx::query("DELETE FROM quiz_grades WHERE submission_id = ?")
            .bind(submission_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn replace_grades(
        &self,
        submission: &QuizSubmission,
        grades: &[Grade],
    ) -> Result<(), PersistenceError> {
        let submission_id = self.require_submission(submission).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM quiz_grades WHERE submission_id = ?")
            .bind(submission_id)
            .execute(&mut *tx)
            .await?;
        for grade in grades {
            upsert_grade(&mut tx, submission_id, grade).await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::{Database, SqliteQuizSubmissionRepository};
    use crate::persistence::traits::QuizSubmissionRepository;

    async fn test_db() -> (Database, SqliteQuizSubmissionRepository, SqliteGradeRepository) {
        let db = Database::new_in_memory().await.unwrap();
        let submissions = SqliteQuizSubmissionRepository::new(db.pool().clone());
        let grades = SqliteGradeRepository::new(db.pool().clone());
        (db, submissions, grades)
    }

    #[tokio::test]
    async fn test_create_and_get_grade() {
        let (_db, submissions, grades) = test_db().await;
        let submission = submissions.create_submission(1, 500).await.unwrap();

        let created = grades
            .create_grade(&submission, 11, 1, 4, Some("Nice".into()))
            .await
            .unwrap();
        assert!(created.id.is_some());

        let loaded = grades.get_grade(&submission, 1).await.unwrap();
        assert_eq!(loaded, Some(created));
        assert_eq!(grades.get_grade(&submission, 2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_duplicate_question_is_rejected() {
        let (_db, submissions, grades) = test_db().await;
        let submission = submissions.create_submission(1, 500).await.unwrap();
        grades.create_grade(&submission, 11, 1, 4, None).await.unwrap();
        let err = grades.create_grade(&submission, 12, 1, 2, None).await.unwrap_err();
        assert!(matches!(err, PersistenceError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_writes_without_submission_fail() {
        let (_db, _submissions, grades) = test_db().await;
        let orphan = QuizSubmission::new(1, 999);

        let err = grades.create_grade(&orphan, 1, 1, 1, None).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
        assert!(grades.get_all_grades(&orphan).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_grades_upserts_by_question() {
        let (_db, submissions, grades) = test_db().await;
        let submission = submissions.create_submission(1, 500).await.unwrap();

        let batch = vec![Grade::new(11, 1, 3, None), Grade::new(12, 2, 0, None)];
        grades.save_grades(&submission, &batch).await.unwrap();

        let mut regraded = batch[1].clone();
        regraded.set_points(5);
        regraded.set_feedback(Some("Regraded by hand".into()));
        grades.save_grade(&submission, &regraded).await.unwrap();

        let all = grades.get_all_grades(&submission).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].points, 3);
        assert_eq!(all[1].points, 5);
        assert_eq!(all[1].feedback.as_deref(), Some("Regraded by hand"));
    }

    #[tokio::test]
    async fn test_grades_are_addressed_by_natural_key() {
        let (_db, submissions, grades) = test_db().await;
        submissions.create_submission(1, 500).await.unwrap();

        // A submission read from another backend carries a foreign id.
        let mut foreign = QuizSubmission::new(1, 500);
        foreign.id = Some(9_999);
        grades.save_grade(&foreign, &Grade::new(11, 1, 2, None)).await.unwrap();

        let stored = submissions.get_submission(1, 500).await.unwrap().unwrap();
        assert_eq!(grades.get_all_grades(&stored).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_all_grades() {
        let (_db, submissions, grades) = test_db().await;
        let submission = submissions.create_submission(1, 500).await.unwrap();
        grades
            .save_grades(&submission, &[Grade::new(11, 1, 3, None), Grade::new(12, 2, 1, None)])
            .await
            .unwrap();

        grades.delete_all_grades(&submission).await.unwrap();
        assert!(grades.get_all_grades(&submission).await.unwrap().is_empty());
        assert!(submissions.get_submission(1, 500).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_grades_drops_unlisted_questions() {
        let (_db, submissions, grades) = test_db().await;
        let submission = submissions.create_submission(1, 500).await.unwrap();
        grades
            .save_grades(&submission, &[Grade::new(11, 1, 3, None), Grade::new(12, 2, 1, None)])
            .await
            .unwrap();

        grades
            .replace_grades(&submission, &[Grade::new(21, 1, 2, None)])
            .await
            .unwrap();

        let all = grades.get_all_grades(&submission).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!((all[0].answer_id, all[0].points), (21, 2));
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_grades() {
        let (db, submissions, grades) = test_db().await;
        let submission = submissions.create_submission(1, 500).await.unwrap();
        grades
            .save_grades(&submission, &[Grade::new(11, 1, 3, None), Grade::new(12, 2, 1, None)])
            .await
            .unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_question_99 BEFORE INSERT ON quiz_grades
             WHEN NEW.question_id = 99 BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let result = grades
            .replace_grades(&submission, &[Grade::new(21, 1, 2, None), Grade::new(29, 99, 1, None)])
            .await;
        assert!(result.is_err());

        let all = grades.get_all_grades(&submission).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].points, 3);
    }
}
