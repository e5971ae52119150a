//! Per-request repository selection.
//!
//! [`RepositoryFactory::storage`] reads the storage settings fresh on every
//! call and hands back a [`ProgressStorage`]: the guest session's in-memory
//! repositories when the request carries one, otherwise
//! [`RoutedRepositories`] over both durable backends.
//!
//! Routing rules for durable storage:
//! - reads go to the selected backend;
//! - with synchronization off, writes go to the selected backend only;
//! - with synchronization on, writes go to the tables, then the comments.
//!   A table failure is returned at once and the comments are left alone.
//!   A comment failure is logged and dropped; the migration job reconciles
//!   it later.

use progress::{CourseProgress, Grade, GradingPolicy, LessonProgress, QuizSubmission};
use sqlx::SqlitePool;
use std::future::Future;
use tracing::warn;

use super::comments::CommentRepositories;
use super::guest::GuestSession;
use super::settings::Settings;
use super::sqlite::TableRepositories;
use super::traits::{
    CourseProgressRepository, GradeRepository, LessonProgressRepository, QuizSubmissionRepository,
};
use super::PersistenceError;
use crate::config::{StorageBackend, StorageSettings};

/// Who a request acts for.
#[derive(Clone)]
pub struct RequestContext {
    pub user_id: u64,
    pub guest: Option<GuestSession>,
}

impl RequestContext {
    pub fn user(user_id: u64) -> Self {
        Self { user_id, guest: None }
    }

    pub fn guest(user_id: u64, session: GuestSession) -> Self {
        Self {
            user_id,
            guest: Some(session),
        }
    }
}

/// Builds storage for each request.
#[derive(Clone)]
pub struct RepositoryFactory {
    pool: SqlitePool,
    settings: Settings,
}

impl RepositoryFactory {
    pub fn new(pool: SqlitePool, settings: Settings) -> Self {
        Self { pool, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Storage for one request.
    pub async fn storage(&self, ctx: &RequestContext) -> Result<ProgressStorage, PersistenceError> {
        match &ctx.guest {
            Some(session) => Ok(ProgressStorage::Guest(session.clone())),
            None => Ok(ProgressStorage::Durable(self.durable().await?)),
        }
    }

    /// Durable repositories routed by the current settings.
    pub async fn durable(&self) -> Result<RoutedRepositories, PersistenceError> {
        let settings = self.settings.storage_settings().await?;
        Ok(RoutedRepositories::new(&self.pool, settings))
    }
}

/// Both durable backends plus the settings snapshot that routes between
/// them.
pub struct RoutedRepositories {
    settings: StorageSettings,
    tables: TableRepositories,
    comments: CommentRepositories,
}

impl RoutedRepositories {
    pub fn new(pool: &SqlitePool, settings: StorageSettings) -> Self {
        Self {
            settings,
            tables: TableRepositories::new(pool),
            comments: CommentRepositories::new(pool),
        }
    }

    pub fn settings(&self) -> StorageSettings {
        self.settings
    }

    /// Run a write against the backends the settings call for. Futures are
    /// lazy, so the one not needed is dropped without running.
    ///
    /// With synchronization on the tables are written first and a failure
    /// there is returned before the comments are touched. A comment failure
    /// after a successful table write is only logged.
    async fn write<T>(
        &self,
        op: &'static str,
        tables: impl Future<Output = Result<T, PersistenceError>>,
        comments: impl Future<Output = Result<T, PersistenceError>>,
    ) -> Result<T, PersistenceError> {
        let StorageSettings { backend, sync_enabled } = self.settings;
        if !sync_enabled {
            return match backend {
                StorageBackend::Tables => tables.await,
                StorageBackend::Comments => comments.await,
            };
        }

        let written = tables.await?;
        if let Err(e) = comments.await {
            warn!(
                op,
                backend = %StorageBackend::Comments,
                error = %e,
                "Mirrored write failed, leaving it to the migration job"
            );
        }
        Ok(written)
    }
}

impl CourseProgressRepository for RoutedRepositories {
    async fn create_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<CourseProgress, PersistenceError> {
        self.write(
            "create_course_progress",
            self.tables.courses.create_course_progress(user_id, course_id),
            self.comments.courses.create_course_progress(user_id, course_id),
        )
        .await
    }

    async fn get_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<Option<CourseProgress>, PersistenceError> {
        match self.settings.backend {
            StorageBackend::Tables => self.tables.courses.get_course_progress(user_id, course_id).await,
            StorageBackend::Comments => self.comments.courses.get_course_progress(user_id, course_id).await,
        }
    }

    async fn get_or_create_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<CourseProgress, PersistenceError> {
        self.write(
            "get_or_create_course_progress",
            self.tables.courses.get_or_create_course_progress(user_id, course_id),
            self.comments.courses.get_or_create_course_progress(user_id, course_id),
        )
        .await
    }

    async fn save_course_progress(&self, progress: &CourseProgress) -> Result<(), PersistenceError> {
        self.write(
            "save_course_progress",
            self.tables.courses.save_course_progress(progress),
            self.comments.courses.save_course_progress(progress),
        )
        .await
    }

    async fn delete_course_progress(&self, user_id: u64, course_id: u64) -> Result<(), PersistenceError> {
        self.write(
            "delete_course_progress",
            self.tables.courses.delete_course_progress(user_id, course_id),
            self.comments.courses.delete_course_progress(user_id, course_id),
        )
        .await
    }

    async fn delete_course_progress_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        self.write(
            "delete_course_progress_for_user",
            self.tables.courses.delete_course_progress_for_user(user_id),
            self.comments.courses.delete_course_progress_for_user(user_id),
        )
        .await
    }
}

impl LessonProgressRepository for RoutedRepositories {
    async fn create_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
        started_at: Option<u64>,
    ) -> Result<LessonProgress, PersistenceError> {
        self.write(
            "create_lesson_progress",
            self.tables.lessons.create_lesson_progress(user_id, lesson_id, started_at),
            self.comments.lessons.create_lesson_progress(user_id, lesson_id, started_at),
        )
        .await
    }

    async fn get_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
    ) -> Result<Option<LessonProgress>, PersistenceError> {
        match self.settings.backend {
            StorageBackend::Tables => self.tables.lessons.get_lesson_progress(user_id, lesson_id).await,
            StorageBackend::Comments => self.comments.lessons.get_lesson_progress(user_id, lesson_id).await,
        }
    }

    async fn get_or_create_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
    ) -> Result<LessonProgress, PersistenceError> {
        self.write(
            "get_or_create_lesson_progress",
            self.tables.lessons.get_or_create_lesson_progress(user_id, lesson_id),
            self.comments.lessons.get_or_create_lesson_progress(user_id, lesson_id),
        )
        .await
    }

    async fn save_lesson_progress(&self, progress: &LessonProgress) -> Result<(), PersistenceError> {
        self.write(
            "save_lesson_progress",
            self.tables.lessons.save_lesson_progress(progress),
            self.comments.lessons.save_lesson_progress(progress),
        )
        .await
    }

    async fn delete_lesson_progress(&self, user_id: u64, lesson_id: u64) -> Result<(), PersistenceError> {
        self.write(
            "delete_lesson_progress",
            self.tables.lessons.delete_lesson_progress(user_id, lesson_id),
            self.comments.lessons.delete_lesson_progress(user_id, lesson_id),
        )
        .await
    }

    async fn delete_lesson_progress_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        self.write(
            "delete_lesson_progress_for_user",
            self.tables.lessons.delete_lesson_progress_for_user(user_id),
            self.comments.lessons.delete_lesson_progress_for_user(user_id),
        )
        .await
    }

    async fn count_completed_lessons(
        &self,
        user_id: u64,
        lesson_ids: &[u64],
    ) -> Result<u64, PersistenceError> {
        match self.settings.backend {
            StorageBackend::Tables => self.tables.lessons.count_completed_lessons(user_id, lesson_ids).await,
            StorageBackend::Comments => {
                self.comments.lessons.count_completed_lessons(user_id, lesson_ids).await
            }
        }
    }
}

impl QuizSubmissionRepository for RoutedRepositories {
    async fn create_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<QuizSubmission, PersistenceError> {
        self.write(
            "create_submission",
            self.tables.submissions.create_submission(user_id, quiz_id),
            self.comments.submissions.create_submission(user_id, quiz_id),
        )
        .await
    }

    async fn get_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<Option<QuizSubmission>, PersistenceError> {
        match self.settings.backend {
            StorageBackend::Tables => self.tables.submissions.get_submission(user_id, quiz_id).await,
            StorageBackend::Comments => self.comments.submissions.get_submission(user_id, quiz_id).await,
        }
    }

    async fn get_or_create_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<QuizSubmission, PersistenceError> {
        self.write(
            "get_or_create_submission",
            self.tables.submissions.get_or_create_submission(user_id, quiz_id),
            self.comments.submissions.get_or_create_submission(user_id, quiz_id),
        )
        .await
    }

    async fn save_submission(&self, submission: &QuizSubmission) -> Result<(), PersistenceError> {
        self.write(
            "save_submission",
            self.tables.submissions.save_submission(submission),
            self.comments.submissions.save_submission(submission),
        )
        .await
    }

    async fn delete_submission(&self, user_id: u64, quiz_id: u64) -> Result<(), PersistenceError> {
        self.write(
            "delete_submission",
            self.tables.submissions.delete_submission(user_id, quiz_id),
            self.comments.submissions.delete_submission(user_id, quiz_id),
        )
        .await
    }

    async fn delete_submissions_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        self.write(
            "delete_submissions_for_user",
            self.tables.submissions.delete_submissions_for_user(user_id),
            self.comments.submissions.delete_submissions_for_user(user_id),
        )
        .await
    }
}

impl GradeRepository for RoutedRepositories {
    async fn create_grade(
        &self,
        submission: &QuizSubmission,
        answer_id: u64,
        question_id: u64,
        points: u32,
        feedback: Option<String>,
    ) -> Result<Grade, PersistenceError> {
        self.write(
            "create_grade",
            self.tables
                .grades
                .create_grade(submission, answer_id, question_id, points, feedback.clone()),
            self.comments
                .grades
                .create_grade(submission, answer_id, question_id, points, feedback),
        )
        .await
    }

    async fn get_grade(
        &self,
        submission: &QuizSubmission,
        question_id: u64,
    ) -> Result<Option<Grade>, PersistenceError> {
        match self.settings.backend {
            StorageBackend::Tables => self.tables.grades.get_grade(submission, question_id).await,
            StorageBackend::Comments => self.comments.grades.get_grade(submission, question_id).await,
        }
    }

    async fn get_all_grades(&self, submission: &QuizSubmission) -> Result<Vec<Grade>, PersistenceError> {
        match self.settings.backend {
            StorageBackend::Tables => self.tables.grades.get_all_grades(submission).await,
            StorageBackend::Comments => self.comments.grades.get_all_grades(submission).await,
        }
    }

    async fn save_grade(&self, submission: &QuizSubmission, grade: &Grade) -> Result<(), PersistenceError> {
        self.write(
            "save_grade",
            self.tables.grades.save_grade(submission, grade),
            self.comments.grades.save_grade(submission, grade),
        )
        .await
    }

    async fn save_grades(&self, submission: &QuizSubmission, grades: &[Grade]) -> Result<(), PersistenceError> {
        self.write(
            "save_grades",
            self.tables.grades.save_grades(submission, grades),
            self.comments.grades.save_grades(submission, grades),
        )
        .await
    }

    async fn delete_all_grades(&self, submission: &QuizSubmission) -> Result<(), PersistenceError> {
        self.write(
            "delete_all_grades",
            self.tables.grades.delete_all_grades(submission),
            self.comments.grades.delete_all_grades(submission),
        )
        .await
    }

    async fn replace_grades(&self, submission: &QuizSubmission, grades: &[Grade]) -> Result<(), PersistenceError> {
        self.write(
            "replace_grades",
            self.tables.grades.replace_grades(submission, grades),
            self.comments.grades.replace_grades(submission, grades),
        )
        .await
    }
}

/// Repositories for one request.
pub enum ProgressStorage {
    Durable(RoutedRepositories),
    Guest(GuestSession),
}

impl ProgressStorage {
    pub fn grading_policy(&self) -> GradingPolicy {
        match self {
            ProgressStorage::Durable(_) => GradingPolicy::Standard,
            ProgressStorage::Guest(session) => session.grading_policy(),
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, ProgressStorage::Guest(_))
    }
}

macro_rules! dispatch {
    ($self:ident . $method:ident ( $($arg:expr),* )) => {
        match $self {
            ProgressStorage::Durable(repos) => repos.$method($($arg),*).await,
            ProgressStorage::Guest(session) => session.$method($($arg),*).await,
        }
    };
}

impl CourseProgressRepository for ProgressStorage {
    async fn create_course_progress(&self, user_id: u64, course_id: u64) -> Result<CourseProgress, PersistenceError> {
        dispatch!(self.create_course_progress(user_id, course_id))
    }

    async fn get_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<Option<CourseProgress>, PersistenceError> {
        dispatch!(self.get_course_progress(user_id, course_id))
    }

    async fn get_or_create_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<CourseProgress, PersistenceError> {
        dispatch!(self.get_or_create_course_progress(user_id, course_id))
    }

    async fn save_course_progress(&self, progress: &CourseProgress) -> Result<(), PersistenceError> {
        dispatch!(self.save_course_progress(progress))
    }

    async fn delete_course_progress(&self, user_id: u64, course_id: u64) -> Result<(), PersistenceError> {
        dispatch!(self.delete_course_progress(user_id, course_id))
    }

    async fn delete_course_progress_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        dispatch!(self.delete_course_progress_for_user(user_id))
    }
}

impl LessonProgressRepository for ProgressStorage {
    async fn create_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
        started_at: Option<u64>,
    ) -> Result<LessonProgress, PersistenceError> {
        dispatch!(self.create_lesson_progress(user_id, lesson_id, started_at))
    }

    async fn get_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
    ) -> Result<Option<LessonProgress>, PersistenceError> {
        dispatch!(self.get_lesson_progress(user_id, lesson_id))
    }

    async fn get_or_create_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
    ) -> Result<LessonProgress, PersistenceError> {
        dispatch!(self.get_or_create_lesson_progress(user_id, lesson_id))
    }

    async fn save_lesson_progress(&self, progress: &LessonProgress) -> Result<(), PersistenceError> {
        dispatch!(self.save_lesson_progress(progress))
    }

    async fn delete_lesson_progress(&self, user_id: u64, lesson_id: u64) -> Result<(), PersistenceError> {
        dispatch!(self.delete_lesson_progress(user_id, lesson_id))
    }

    async fn delete_lesson_progress_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        dispatch!(self.delete_lesson_progress_for_user(user_id))
    }

    async fn count_completed_lessons(&self, user_id: u64, lesson_ids: &[u64]) -> Result<u64, PersistenceError> {
        dispatch!(self.count_completed_lessons(user_id, lesson_ids))
    }
}

impl QuizSubmissionRepository for ProgressStorage {
    async fn create_submission(&self, user_id: u64, quiz_id: u64) -> Result<QuizSubmission, PersistenceError> {
        dispatch!(self.create_submission(user_id, quiz_id))
    }

    async fn get_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<Option<QuizSubmission>, PersistenceError> {
        dispatch!(self.get_submission(user_id, quiz_id))
    }

    async fn get_or_create_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<QuizSubmission, PersistenceError> {
        dispatch!(self.get_or_create_submission(user_id, quiz_id))
    }

    async fn save_submission(&self, submission: &QuizSubmission) -> Result<(), PersistenceError> {
        dispatch!(self.save_submission(submission))
    }

    async fn delete_submission(&self, user_id: u64, quiz_id: u64) -> Result<(), PersistenceError> {
        dispatch!(self.delete_submission(user_id, quiz_id))
    }

    async fn delete_submissions_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        dispatch!(self.delete_submissions_for_user(user_id))
    }
}

impl GradeRepository for ProgressStorage {
    async fn create_grade(
        &self,
        submission: &QuizSubmission,
        answer_id: u64,
        question_id: u64,
        points: u32,
        feedback: Option<String>,
    ) -> Result<Grade, PersistenceError> {
        dispatch!(self.create_grade(submission, answer_id, question_id, points, feedback))
    }

    async fn get_grade(
        &self,
        submission: &QuizSubmission,
        question_id: u64,
    ) -> Result<Option<Grade>, PersistenceError> {
        dispatch!(self.get_grade(submission, question_id))
    }

    async fn get_all_grades(&self, submission: &QuizSubmission) -> Result<Vec<Grade>, PersistenceError> {
        dispatch!(self.get_all_grades(submission))
    }

    async fn save_grade(&self, submission: &QuizSubmission, grade: &Grade) -> Result<(), PersistenceError> {
        dispatch!(self.save_grade(submission, grade))
    }

    async fn save_grades(&self, submission: &QuizSubmission, grades: &[Grade]) -> Result<(), PersistenceError> {
        dispatch!(self.save_grades(submission, grades))
    }

    async fn delete_all_grades(&self, submission: &QuizSubmission) -> Result<(), PersistenceError> {
        dispatch!(self.delete_all_grades(submission))
    }

    async fn replace_grades(&self, submission: &QuizSubmission, grades: &[Grade]) -> Result<(), PersistenceError> {
        dispatch!(self.replace_grades(submission, grades))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::Database;

    struct Fixture {
        db: Database,
        factory: RepositoryFactory,
    }

    async fn fixture(backend: StorageBackend, sync: bool) -> Fixture {
        let db = Database::new_in_memory().await.unwrap();
        let settings = Settings::new(db.pool().clone());
        settings.set_storage_backend(backend).await.unwrap();
        settings.set_sync_enabled(sync).await.unwrap();
        let factory = RepositoryFactory::new(db.pool().clone(), settings);
        Fixture { db, factory }
    }

    async fn count(db: &Database, sql: &str) -> i64 {
        let row: (i64,) = sqlx::query_as(sql).fetch_one(db.pool()).await.unwrap();
        row.0
    }

    #[tokio::test]
    async fn test_without_sync_writes_only_the_selected_backend() {
        let f = fixture(StorageBackend::Tables, false).await;
        let repos = f.factory.durable().await.unwrap();
        repos.create_course_progress(1, 10).await.unwrap();

        assert_eq!(count(&f.db, "SELECT COUNT(*) FROM course_progress").await, 1);
        assert_eq!(count(&f.db, "SELECT COUNT(*) FROM comments").await, 0);
    }

    #[tokio::test]
    async fn test_sync_mirrors_writes_to_both_backends() {
        let f = fixture(StorageBackend::Comments, true).await;
        let repos = f.factory.durable().await.unwrap();

        let mut lesson = repos.get_or_create_lesson_progress(1, 100).await.unwrap();
        let started = lesson.started_at.unwrap();
        lesson.complete(Some(started + 30)).unwrap();
        repos.save_lesson_progress(&lesson).await.unwrap();

        let submission = repos.create_submission(1, 500).await.unwrap();
        repos.save_grades(&submission, &[Grade::new(1, 1, 2, None)]).await.unwrap();

        let tables = TableRepositories::new(f.db.pool());
        let comments = CommentRepositories::new(f.db.pool());
        let in_tables = tables.lessons.get_lesson_progress(1, 100).await.unwrap().unwrap();
        let in_comments = comments.lessons.get_lesson_progress(1, 100).await.unwrap().unwrap();
        assert!(in_tables.is_complete() && in_comments.is_complete());
        assert_eq!(in_tables.completed_at, in_comments.completed_at);

        assert_eq!(tables.grades.get_all_grades(&submission).await.unwrap().len(), 1);
        assert_eq!(comments.grades.get_all_grades(&submission).await.unwrap().len(), 1);

        repos
            .replace_grades(&submission, &[Grade::new(2, 2, 1, None), Grade::new(3, 3, 1, None)])
            .await
            .unwrap();
        for grades in [
            tables.grades.get_all_grades(&submission).await.unwrap(),
            comments.grades.get_all_grades(&submission).await.unwrap(),
        ] {
            let questions: Vec<u64> = grades.iter().map(|g| g.question_id).collect();
            assert_eq!(questions, vec![2, 3]);
        }
    }

    #[tokio::test]
    async fn test_sync_swallows_comment_failure() {
        let f = fixture(StorageBackend::Tables, true).await;
        // A row only the comments hold makes the mirrored create fail there.
        CommentRepositories::new(f.db.pool())
            .courses
            .create_course_progress(1, 10)
            .await
            .unwrap();

        let repos = f.factory.durable().await.unwrap();
        let created = repos.create_course_progress(1, 10).await.unwrap();
        assert!(created.id.is_some());
        assert_eq!(count(&f.db, "SELECT COUNT(*) FROM course_progress").await, 1);
    }

    #[tokio::test]
    async fn test_sync_comment_failure_is_swallowed_with_comments_selected() {
        let f = fixture(StorageBackend::Comments, true).await;
        CommentRepositories::new(f.db.pool())
            .courses
            .create_course_progress(1, 10)
            .await
            .unwrap();

        let repos = f.factory.durable().await.unwrap();
        let created = repos.create_course_progress(1, 10).await.unwrap();
        assert!(created.id.is_some());
        assert_eq!(count(&f.db, "SELECT COUNT(*) FROM course_progress").await, 1);
        assert_eq!(count(&f.db, "SELECT COUNT(*) FROM comments").await, 1);
    }

    #[tokio::test]
    async fn test_sync_table_failure_stops_before_comments() {
        let f = fixture(StorageBackend::Tables, true).await;
        TableRepositories::new(f.db.pool())
            .courses
            .create_course_progress(1, 10)
            .await
            .unwrap();

        let repos = f.factory.durable().await.unwrap();
        let err = repos.create_course_progress(1, 10).await.unwrap_err();
        assert!(matches!(err, PersistenceError::AlreadyExists { .. }));
        assert_eq!(count(&f.db, "SELECT COUNT(*) FROM comments").await, 0);
    }

    #[tokio::test]
    async fn test_sync_table_failure_surfaces_with_comments_selected() {
        let f = fixture(StorageBackend::Comments, true).await;
        // The submission exists only in the comment store.
        let comments = CommentRepositories::new(f.db.pool());
        let submission = comments.submissions.create_submission(1, 500).await.unwrap();

        let repos = f.factory.durable().await.unwrap();
        let err = repos
            .save_grade(&submission, &Grade::new(1, 1, 3, None))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
        assert_eq!(count(&f.db, "SELECT COUNT(*) FROM quiz_grades").await, 0);
        assert!(comments.grades.get_all_grades(&submission).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads_follow_the_selector_without_copying() {
        let f = fixture(StorageBackend::Comments, false).await;
        let repos = f.factory.durable().await.unwrap();
        repos.create_course_progress(1, 10).await.unwrap();

        f.factory
            .settings()
            .set_storage_backend(StorageBackend::Tables)
            .await
            .unwrap();
        let repos = f.factory.durable().await.unwrap();
        assert_eq!(repos.settings().backend, StorageBackend::Tables);
        assert_eq!(repos.get_course_progress(1, 10).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_guest_context_never_touches_the_database() {
        let f = fixture(StorageBackend::Tables, true).await;
        let session = GuestSession::new();
        let storage = f
            .factory
            .storage(&RequestContext::guest(1, session.clone()))
            .await
            .unwrap();
        assert!(storage.is_guest());
        assert_eq!(storage.grading_policy(), GradingPolicy::AutoPass);

        storage.get_or_create_course_progress(1, 10).await.unwrap();
        let submission = storage.create_submission(1, 500).await.unwrap();
        storage.create_grade(&submission, 1, 1, 5, None).await.unwrap();

        for table in ["course_progress", "quiz_submissions", "quiz_grades", "comments", "commentmeta"] {
            assert_eq!(count(&f.db, &format!("SELECT COUNT(*) FROM {table}")).await, 0);
        }

        session.end().await;
        assert_eq!(storage.get_course_progress(1, 10).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_user_context_is_durable() {
        let f = fixture(StorageBackend::Comments, false).await;
        let storage = f.factory.storage(&RequestContext::user(1)).await.unwrap();
        assert!(!storage.is_guest());
        assert_eq!(storage.grading_policy(), GradingPolicy::Standard);
    }
}
