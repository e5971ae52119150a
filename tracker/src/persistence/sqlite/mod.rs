//! Table-backed repository implementations.
//!
//! ## Database setup
//!
//! [`Database`] wraps a `sqlx::SqlitePool` configured with:
//! - **WAL mode** and a busy timeout, so concurrent request handlers queue
//!   on the single writer instead of failing.
//! - **Foreign keys enabled**: deleting a submission cascades to its grades.
//! - **Embedded migrations**: `sqlx::migrate!` applies `migrations/` on open.
//!
//! The legacy comment tables live in the same file; see
//! [`crate::persistence::comments`].
//!
//! ## Repository types
//!
//! | Type | Trait |
//! |------|-------|
//! | [`SqliteCourseProgressRepository`] | `CourseProgressRepository` |
//! | [`SqliteLessonProgressRepository`] | `LessonProgressRepository` |
//! | [`SqliteQuizSubmissionRepository`] | `QuizSubmissionRepository` |
//! | [`SqliteGradeRepository`] | `GradeRepository` |
//!
//! Every table carries a UNIQUE natural key. `get_or_create` relies on it:
//! the insert is `ON CONFLICT DO NOTHING` followed by a re-fetch, so racing
//! callers converge on one row.

mod course_repo;
mod database;
mod grade_repo;
pub(crate) mod helpers;
#[cfg(test)]
mod integration_tests;
mod lesson_repo;
mod submission_repo;

pub use course_repo::SqliteCourseProgressRepository;
pub use database::Database;
pub use grade_repo::SqliteGradeRepository;
pub use lesson_repo::SqliteLessonProgressRepository;
pub use submission_repo::SqliteQuizSubmissionRepository;

use sqlx::SqlitePool;

/// The four table-backed repositories sharing one pool.
pub struct TableRepositories {
    pub courses: SqliteCourseProgressRepository,
    pub lessons: SqliteLessonProgressRepository,
    pub submissions: SqliteQuizSubmissionRepository,
    pub grades: SqliteGradeRepository,
}

impl TableRepositories {
    pub fn new(pool: &SqlitePool) -> Self {
        Self {
            courses: SqliteCourseProgressRepository::new(pool.clone()),
            lessons: SqliteLessonProgressRepository::new(pool.clone()),
            submissions: SqliteQuizSubmissionRepository::new(pool.clone()),
            grades: SqliteGradeRepository::new(pool.clone()),
        }
    }
}
