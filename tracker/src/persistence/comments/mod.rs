//! Legacy comment-backed repositories.
//!
//! Progress is stored as generic event records in `comments`, one per
//! (post, user, type), with status in `comment_approved`, the last update
//! time in `comment_date`, and everything else in `commentmeta` rows read
//! through [`MetaMap`].
//!
//! | Type | Trait | Record type |
//! |------|-------|-------------|
//! | [`CommentCourseProgressRepository`] | `CourseProgressRepository` | `course_status` |
//! | [`CommentLessonProgressRepository`] | `LessonProgressRepository` | `lesson_status` |
//! | [`CommentQuizSubmissionRepository`] | `QuizSubmissionRepository` | `quiz_submission` |
//! | [`CommentGradeRepository`] | `GradeRepository` | `quiz_submission` maps |

mod course_repo;
mod lesson_repo;
pub mod meta;
pub mod store;
mod submission_repo;

pub use course_repo::CommentCourseProgressRepository;
pub use lesson_repo::CommentLessonProgressRepository;
pub use meta::{MetaKey, MetaMap};
pub use store::{CommentRecord, CommentStore, CommentType};
pub use submission_repo::{CommentGradeRepository, CommentQuizSubmissionRepository};

pub(crate) use course_repo::course_from_record;
pub(crate) use lesson_repo::lesson_from_record;
pub(crate) use submission_repo::{grades_from_record, submission_from_record};

use sqlx::SqlitePool;

/// The four comment-backed repositories sharing one store.
pub struct CommentRepositories {
    pub courses: CommentCourseProgressRepository,
    pub lessons: CommentLessonProgressRepository,
    pub submissions: CommentQuizSubmissionRepository,
    pub grades: CommentGradeRepository,
}

impl CommentRepositories {
    pub fn new(pool: &SqlitePool) -> Self {
        let store = CommentStore::new(pool.clone());
        Self {
            courses: CommentCourseProgressRepository::new(store.clone()),
            lessons: CommentLessonProgressRepository::new(store.clone()),
            submissions: CommentQuizSubmissionRepository::new(store.clone()),
            grades: CommentGradeRepository::new(store),
        }
    }
}
