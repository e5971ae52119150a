//! Async repository trait definitions for the persistence layer.
//!
//! Each trait abstracts over one entity family, allowing the comment-backed,
//! table-backed and guest-session stores to be used interchangeably via
//! static dispatch.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so that
//! the futures are guaranteed `Send` and can be driven from `tokio::spawn`.
//!
//! Shared contract for every family:
//! - `create` inserts and fails with `AlreadyExists` when the natural key is
//!   taken.
//! - `get_or_create` never produces a second row for a natural key, even
//!   under racing callers: it inserts ignoring key conflicts and re-fetches.
//! - `save` upserts on the natural key.

use progress::{CourseProgress, Grade, LessonProgress, QuizSubmission};
use std::future::Future;

use super::PersistenceError;

/// Repository for course progress, keyed by (user, course).
pub trait CourseProgressRepository: Send + Sync {
    fn create_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> impl Future<Output = Result<CourseProgress, PersistenceError>> + Send;
    fn get_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> impl Future<Output = Result<Option<CourseProgress>, PersistenceError>> + Send;
    fn get_or_create_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> impl Future<Output = Result<CourseProgress, PersistenceError>> + Send;
    fn save_course_progress(
        &self,
        progress: &CourseProgress,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn delete_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn delete_course_progress_for_user(
        &self,
        user_id: u64,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// Repository for lesson progress, keyed by (user, lesson).
pub trait LessonProgressRepository: Send + Sync {
    fn create_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
        started_at: Option<u64>,
    ) -> impl Future<Output = Result<LessonProgress, PersistenceError>> + Send;
    fn get_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
    ) -> impl Future<Output = Result<Option<LessonProgress>, PersistenceError>> + Send;
    fn get_or_create_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
    ) -> impl Future<Output = Result<LessonProgress, PersistenceError>> + Send;
    fn save_lesson_progress(
        &self,
        progress: &LessonProgress,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn delete_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn delete_lesson_progress_for_user(
        &self,
        user_id: u64,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    /// Number of `lesson_ids` the user has completed.
    fn count_completed_lessons(
        &self,
        user_id: u64,
        lesson_ids: &[u64],
    ) -> impl Future<Output = Result<u64, PersistenceError>> + Send;
}

/// Repository for quiz submissions, keyed by (user, quiz).
///
/// Deleting a submission deletes its grades.
pub trait QuizSubmissionRepository: Send + Sync {
    fn create_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> impl Future<Output = Result<QuizSubmission, PersistenceError>> + Send;
    fn get_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> impl Future<Output = Result<Option<QuizSubmission>, PersistenceError>> + Send;
    fn get_or_create_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> impl Future<Output = Result<QuizSubmission, PersistenceError>> + Send;
    fn save_submission(
        &self,
        submission: &QuizSubmission,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn delete_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn delete_submissions_for_user(
        &self,
        user_id: u64,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// Repository for the grades of one submission, keyed by question.
///
/// Every method is scoped by a submission. Backends resolve their own copy
/// of that submission through its (user, quiz) key, so a submission read
/// from one backend can address its grades in the other. Operations on a
/// submission the backend does not hold fail with `NotFound`, except reads,
/// which return nothing.
pub trait GradeRepository: Send + Sync {
    fn create_grade(
        &self,
        submission: &QuizSubmission,
        answer_id: u64,
        question_id: u64,
        points: u32,
        feedback: Option<String>,
    ) -> impl Future<Output = Result<Grade, PersistenceError>> + Send;
    fn get_grade(
        &self,
        submission: &QuizSubmission,
        question_id: u64,
    ) -> impl Future<Output = Result<Option<Grade>, PersistenceError>> + Send;
    fn get_all_grades(
        &self,
        submission: &QuizSubmission,
    ) -> impl Future<Output = Result<Vec<Grade>, PersistenceError>> + Send;
    fn save_grade(
        &self,
        submission: &QuizSubmission,
        grade: &Grade,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn save_grades(
        &self,
        submission: &QuizSubmission,
        grades: &[Grade],
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn delete_all_grades(
        &self,
        submission: &QuizSubmission,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    /// Make `grades` the submission's only grades, all or nothing.
    fn replace_grades(
        &self,
        submission: &QuizSubmission,
        grades: &[Grade],
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}
