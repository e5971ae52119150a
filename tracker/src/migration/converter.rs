//! Legacy comment record → structured row conversion.

use progress::{CourseProgress, Grade, LessonProgress, QuizSubmission};

use crate::persistence::comments::{
    course_from_record, grades_from_record, lesson_from_record, submission_from_record,
    CommentRecord, CommentType,
};
use crate::persistence::PersistenceError;

/// The structured row(s) one comment record becomes.
#[derive(Debug, Clone, PartialEq)]
pub enum Converted {
    Course(CourseProgress),
    Lesson(LessonProgress),
    /// A submission commits together with its grades.
    Submission {
        submission: QuizSubmission,
        grades: Vec<Grade>,
    },
}

impl Converted {
    pub fn kind(&self) -> &'static str {
        match self {
            Converted::Course(_) => "course",
            Converted::Lesson(_) => "lesson",
            Converted::Submission { .. } => "submission",
        }
    }
}

/// Decode and validate one record. Backend-local ids are dropped; the
/// structured tables assign their own.
pub fn convert(record: &CommentRecord) -> Result<Converted, PersistenceError> {
    match record.comment_type {
        CommentType::CourseStatus => {
            let mut course = course_from_record(record)?;
            course.validate()?;
            course.id = None;
            Ok(Converted::Course(course))
        }
        CommentType::LessonStatus => {
            let mut lesson = lesson_from_record(record)?;
            lesson.validate()?;
            lesson.id = None;
            Ok(Converted::Lesson(lesson))
        }
        CommentType::QuizSubmission => {
            let mut submission = submission_from_record(record)?;
            submission.validate()?;
            submission.id = None;
            let grades = grades_from_record(record)?;
            Ok(Converted::Submission { submission, grades })
        }
    }
}
