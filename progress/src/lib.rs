//! Learner progress domain model.
//!
//! In-memory value types for course progress, lesson progress, quiz
//! submissions and grades, together with the pure grading rules that turn
//! answers into points and points into a final grade. Nothing in this crate
//! knows how the values are stored.

pub mod course;
pub mod error;
pub mod grading;
pub mod lesson;
pub mod quiz;
pub mod status;

pub use course::CourseProgress;
pub use error::ProgressError;
pub use grading::{
    auto_grade, final_grade, Answer, AnswerKey, GradeOutcome, GradingPolicy, Question,
    QuestionKind, Response,
};
pub use lesson::LessonProgress;
pub use quiz::{Grade, QuizSubmission};
pub use status::{CourseStatus, LessonStatus};

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current unix timestamp in seconds.
pub fn now_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Reject a completion that happens before the recorded start.
pub(crate) fn check_order(started_at: Option<u64>, completed_at: u64) -> Result<(), ProgressError> {
    match started_at {
        Some(started_at) if completed_at < started_at => Err(ProgressError::CompletedBeforeStart {
            started_at,
            completed_at,
        }),
        _ => Ok(()),
    }
}
