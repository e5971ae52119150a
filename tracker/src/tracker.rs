//! Progress bookkeeping in response to learner events.

use progress::{CourseProgress, CourseStatus, LessonProgress};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::persistence::{
    CourseProgressRepository, GradeRepository, LessonProgressRepository, PersistenceError,
    QuizSubmissionRepository,
};

/// Which lessons and quizzes make up a course.
pub trait CourseStructure: Send + Sync {
    fn lesson_ids(&self, course_id: u64) -> Vec<u64>;
    fn quiz_ids(&self, course_id: u64) -> Vec<u64>;
}

/// Course layout held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticCourseStructure {
    courses: HashMap<u64, (Vec<u64>, Vec<u64>)>,
}

impl StaticCourseStructure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_course(mut self, course_id: u64, lesson_ids: Vec<u64>, quiz_ids: Vec<u64>) -> Self {
        self.courses.insert(course_id, (lesson_ids, quiz_ids));
        self
    }
}

impl CourseStructure for StaticCourseStructure {
    fn lesson_ids(&self, course_id: u64) -> Vec<u64> {
        self.courses
            .get(&course_id)
            .map(|(lessons, _)| lessons.clone())
            .unwrap_or_default()
    }

    fn quiz_ids(&self, course_id: u64) -> Vec<u64> {
        self.courses
            .get(&course_id)
            .map(|(_, quizzes)| quizzes.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LessonCompletion {
    pub lesson: LessonProgress,
    /// Set when this lesson finished the course.
    pub course: Option<CourseProgress>,
}

pub struct ProgressTracker<S, C> {
    storage: S,
    structure: C,
}

impl<S, C> ProgressTracker<S, C>
where
    S: CourseProgressRepository
        + LessonProgressRepository
        + QuizSubmissionRepository
        + GradeRepository,
    C: CourseStructure,
{
    pub fn new(storage: S, structure: C) -> Self {
        Self { storage, structure }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Enrol the user: the course is started if it was not already.
    pub async fn course_signup(&self, user_id: u64, course_id: u64) -> Result<CourseProgress, PersistenceError> {
        let mut course = self.storage.get_or_create_course_progress(user_id, course_id).await?;
        if course.status == CourseStatus::NotStarted {
            course.start(None);
            self.storage.save_course_progress(&course).await?;
            info!(user_id, course_id, "Course started");
        }
        Ok(course)
    }

    pub async fn lesson_viewed(&self, user_id: u64, lesson_id: u64) -> Result<LessonProgress, PersistenceError> {
        let lesson = self.storage.get_or_create_lesson_progress(user_id, lesson_id).await?;
        debug!(user_id, lesson_id, status = %lesson.status.as_str(), "Lesson viewed");
        Ok(lesson)
    }

    /// Complete a lesson, and the course too once every one of its lessons
    /// is complete.
    pub async fn complete_lesson(
        &self,
        user_id: u64,
        course_id: u64,
        lesson_id: u64,
    ) -> Result<LessonCompletion, PersistenceError> {
        let mut lesson = self.storage.get_or_create_lesson_progress(user_id, lesson_id).await?;
        if !lesson.is_complete() {
            lesson.complete(None)?;
            self.storage.save_lesson_progress(&lesson).await?;
            info!(user_id, lesson_id, "Lesson completed");
        }

        let lesson_ids = self.course_lessons(course_id);
        if lesson_ids.is_empty() {
            return Ok(LessonCompletion { lesson, course: None });
        }
        let completed = self.storage.count_completed_lessons(user_id, &lesson_ids).await?;
        if completed < lesson_ids.len() as u64 {
            debug!(user_id, course_id, completed, total = lesson_ids.len(), "Course still in progress");
            return Ok(LessonCompletion { lesson, course: None });
        }

        let mut course = self.storage.get_or_create_course_progress(user_id, course_id).await?;
        if course.is_complete() {
            return Ok(LessonCompletion { lesson, course: None });
        }
        if course.status == CourseStatus::NotStarted {
            course.start(lesson.started_at);
        }
        course.complete(None)?;
        self.storage.save_course_progress(&course).await?;
        info!(user_id, course_id, "Course completed");
        Ok(LessonCompletion {
            lesson,
            course: Some(course),
        })
    }

    /// Forget the user's progress in a course: course and lesson progress
    /// and the submissions (with grades) of its quizzes.
    pub async fn reset_course(&self, user_id: u64, course_id: u64) -> Result<(), PersistenceError> {
        self.storage.delete_course_progress(user_id, course_id).await?;
        let lesson_ids = self.course_lessons(course_id);
        for lesson_id in &lesson_ids {
            self.storage.delete_lesson_progress(user_id, *lesson_id).await?;
        }
        let quiz_ids = self.structure.quiz_ids(course_id);
        for quiz_id in &quiz_ids {
            self.storage.delete_submission(user_id, *quiz_id).await?;
        }
        info!(
            user_id,
            course_id,
            lessons = lesson_ids.len(),
            quizzes = quiz_ids.len(),
            "Course progress reset"
        );
        Ok(())
    }

    /// Distinct lesson ids of a course. Completion counts each lesson once.
    fn course_lessons(&self, course_id: u64) -> Vec<u64> {
        let mut lesson_ids = self.structure.lesson_ids(course_id);
        lesson_ids.sort_unstable();
        lesson_ids.dedup();
        lesson_ids
    }

    /// Drop every progress row of a deleted user.
    pub async fn remove_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        self.storage.delete_course_progress_for_user(user_id).await?;
        self.storage.delete_lesson_progress_for_user(user_id).await?;
        self.storage.delete_submissions_for_user(user_id).await?;
        info!(user_id, "User progress removed");
        Ok(())
    }
}
