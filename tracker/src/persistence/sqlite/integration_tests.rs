use progress::{CourseStatus, Grade};

use super::{Database, TableRepositories};
use crate::persistence::comments::CommentRepositories;
use crate::persistence::traits::{
    CourseProgressRepository, GradeRepository, LessonProgressRepository, QuizSubmissionRepository,
};

async fn file_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("progress.db")).await.unwrap();
    (dir, db)
}

#[tokio::test]
async fn test_learner_lifecycle_tables() {
    let db = Database::new_in_memory().await.unwrap();
    let repos = TableRepositories::new(db.pool());

    let mut course = repos.courses.get_or_create_course_progress(1, 10).await.unwrap();
    course.start(Some(1_000));
    repos.courses.save_course_progress(&course).await.unwrap();

    let mut lesson = repos.lessons.create_lesson_progress(1, 100, Some(1_000)).await.unwrap();
    lesson.complete(Some(1_100)).unwrap();
    repos.lessons.save_lesson_progress(&lesson).await.unwrap();

    let mut submission = repos.submissions.get_or_create_submission(1, 500).await.unwrap();
    repos
        .grades
        .save_grades(&submission, &[Grade::new(1, 1, 2, None), Grade::new(2, 2, 3, None)])
        .await
        .unwrap();
    submission.set_final_grade(Some(100.0)).unwrap();
    repos.submissions.save_submission(&submission).await.unwrap();

    course.complete(Some(1_200)).unwrap();
    repos.courses.save_course_progress(&course).await.unwrap();

    let loaded = repos.courses.get_course_progress(1, 10).await.unwrap().unwrap();
    assert_eq!(loaded.status, CourseStatus::Complete);
    assert_eq!(loaded.started_at, Some(1_000));
    assert_eq!(loaded.completed_at, Some(1_200));
    assert_eq!(repos.lessons.count_completed_lessons(1, &[100]).await.unwrap(), 1);
    assert_eq!(repos.grades.get_all_grades(&submission).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_removing_a_user_clears_every_family() {
    let db = Database::new_in_memory().await.unwrap();
    let repos = TableRepositories::new(db.pool());

    for user_id in [1, 2] {
        repos.courses.create_course_progress(user_id, 10).await.unwrap();
        repos.lessons.create_lesson_progress(user_id, 100, None).await.unwrap();
        let submission = repos.submissions.create_submission(user_id, 500).await.unwrap();
        repos.grades.create_grade(&submission, 1, 1, 1, None).await.unwrap();
    }

    repos.courses.delete_course_progress_for_user(1).await.unwrap();
    repos.lessons.delete_lesson_progress_for_user(1).await.unwrap();
    repos.submissions.delete_submissions_for_user(1).await.unwrap();

    let grades: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM quiz_grades")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(grades.0, 1);
    assert!(repos.courses.get_course_progress(1, 10).await.unwrap().is_none());
    assert!(repos.courses.get_course_progress(2, 10).await.unwrap().is_some());
    assert!(repos.submissions.get_submission(2, 500).await.unwrap().is_some());
}

#[tokio::test]
async fn test_concurrent_get_or_create_yields_one_row() {
    let (_dir, db) = file_db().await;

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let pool = db.pool().clone();
        tasks.push(tokio::spawn(async move {
            let repos = TableRepositories::new(&pool);
            let course = repos.courses.get_or_create_course_progress(7, 70).await.unwrap();
            let lesson = repos.lessons.get_or_create_lesson_progress(7, 700).await.unwrap();
            let submission = repos.submissions.get_or_create_submission(7, 7_000).await.unwrap();
            (course.id, lesson.id, submission.id)
        }));
    }

    let mut seen = Vec::new();
    for task in tasks {
        seen.push(task.await.unwrap());
    }
    assert!(seen.windows(2).all(|pair| pair[0] == pair[1]));

    for table in ["course_progress", "lesson_progress", "quiz_submissions"] {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1, "{table} should hold exactly one row");
    }
}

#[tokio::test]
async fn test_concurrent_get_or_create_yields_one_comment_record() {
    let (_dir, db) = file_db().await;

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let pool = db.pool().clone();
        tasks.push(tokio::spawn(async move {
            let repos = CommentRepositories::new(&pool);
            let course = repos.courses.get_or_create_course_progress(7, 70).await.unwrap();
            let lesson = repos.lessons.get_or_create_lesson_progress(7, 700).await.unwrap();
            let submission = repos.submissions.get_or_create_submission(7, 7_000).await.unwrap();
            (course.id, lesson.id, submission.id)
        }));
    }

    let mut seen = Vec::new();
    for task in tasks {
        seen.push(task.await.unwrap());
    }
    assert!(seen.windows(2).all(|pair| pair[0] == pair[1]));

    for comment_type in ["course_status", "lesson_status", "quiz_submission"] {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM comments WHERE comment_type = ?")
            .bind(comment_type)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1, "{comment_type} should have exactly one record");
    }
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.db");

    {
        let db = Database::open(&path).await.unwrap();
        let repos = TableRepositories::new(db.pool());
        let mut course = repos.courses.create_course_progress(3, 30).await.unwrap();
        course.start(Some(42));
        repos.courses.save_course_progress(&course).await.unwrap();
        db.pool().close().await;
    }

    let db = Database::open(&path).await.unwrap();
    let repos = TableRepositories::new(db.pool());
    let course = repos.courses.get_course_progress(3, 30).await.unwrap().unwrap();
    assert_eq!(course.started_at, Some(42));
}
