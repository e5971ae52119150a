//! Session-bound storage for guest previews.
//!
//! A [`GuestSession`] implements every repository trait over in-memory maps.
//! Nothing reaches the database, ids are local to the session, and
//! [`GuestSession::end`] throws the lot away. Clones share state, so a
//! session can be handed to each request of the same visitor.

use progress::{CourseProgress, Grade, GradingPolicy, LessonProgress, QuizSubmission};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::{
    CourseProgressRepository, GradeRepository, LessonProgressRepository, QuizSubmissionRepository,
};
use super::PersistenceError;

/// (user, object) natural key.
type Key = (u64, u64);

#[derive(Default)]
struct GuestState {
    next_id: u64,
    courses: HashMap<Key, CourseProgress>,
    lessons: HashMap<Key, LessonProgress>,
    submissions: HashMap<Key, QuizSubmission>,
    /// Grades per (user, quiz), keyed by question.
    grades: HashMap<Key, BTreeMap<u64, Grade>>,
}

impl GuestState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory progress for one guest visit.
#[derive(Clone)]
pub struct GuestSession {
    id: Uuid,
    state: Arc<RwLock<GuestState>>,
}

impl Default for GuestSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestSession {
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(session = %id, "Guest session started");
        Self {
            id,
            state: Arc::new(RwLock::new(GuestState::default())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Guests never wait on an instructor.
    pub fn grading_policy(&self) -> GradingPolicy {
        GradingPolicy::AutoPass
    }

    /// Discard everything recorded in this session.
    pub async fn end(&self) {
        let mut state = self.state.write().await;
        *state = GuestState::default();
        tracing::debug!(session = %self.id, "Guest session ended");
    }

    /// Whether the session currently holds any progress.
    pub async fn is_empty(&self) -> bool {
        let state = self.state.read().await;
        state.courses.is_empty()
            && state.lessons.is_empty()
            && state.submissions.is_empty()
            && state.grades.is_empty()
    }
}

impl CourseProgressRepository for GuestSession {
    async fn create_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<CourseProgress, PersistenceError> {
        let mut state = self.state.write().await;
        if state.courses.contains_key(&(user_id, course_id)) {
            return Err(PersistenceError::already_exists("course progress", user_id, course_id));
        }
        let mut progress = CourseProgress::new(user_id, course_id);
        progress.id = Some(state.next_id());
        state.courses.insert((user_id, course_id), progress.clone());
        Ok(progress)
    }

    async fn get_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<Option<CourseProgress>, PersistenceError> {
        Ok(self.state.read().await.courses.get(&(user_id, course_id)).cloned())
    }

    async fn get_or_create_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<CourseProgress, PersistenceError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.courses.get(&(user_id, course_id)) {
            return Ok(existing.clone());
        }
        let mut progress = CourseProgress::new(user_id, course_id);
        progress.id = Some(state.next_id());
        state.courses.insert((user_id, course_id), progress.clone());
        Ok(progress)
    }

    async fn save_course_progress(&self, progress: &CourseProgress) -> Result<(), PersistenceError> {
        progress.validate()?;
        let mut state = self.state.write().await;
        let mut stored = progress.clone();
        if stored.id.is_none() {
            stored.id = Some(state.next_id());
        }
        state.courses.insert((progress.user_id, progress.course_id), stored);
        Ok(())
    }

    async fn delete_course_progress(&self, user_id: u64, course_id: u64) -> Result<(), PersistenceError> {
        self.state.write().await.courses.remove(&(user_id, course_id));
        Ok(())
    }

    async fn delete_course_progress_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        self.state.write().await.courses.retain(|(user, _), _| *user != user_id);
        Ok(())
    }
}

impl LessonProgressRepository for GuestSession {
    async fn create_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
        started_at: Option<u64>,
    ) -> Result<LessonProgress, PersistenceError> {
        let mut state = self.state.write().await;
        if state.lessons.contains_key(&(user_id, lesson_id)) {
            return Err(PersistenceError::already_exists("lesson progress", user_id, lesson_id));
        }
        let mut progress = LessonProgress::new(user_id, lesson_id, started_at);
        progress.id = Some(state.next_id());
        state.lessons.insert((user_id, lesson_id), progress.clone());
        Ok(progress)
    }

    async fn get_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
    ) -> Result<Option<LessonProgress>, PersistenceError> {
        Ok(self.state.read().await.lessons.get(&(user_id, lesson_id)).cloned())
    }

    async fn get_or_create_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
    ) -> Result<LessonProgress, PersistenceError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.lessons.get(&(user_id, lesson_id)) {
            return Ok(existing.clone());
        }
        let mut progress = LessonProgress::new(user_id, lesson_id, None);
        progress.id = Some(state.next_id());
        state.lessons.insert((user_id, lesson_id), progress.clone());
        Ok(progress)
    }

    async fn save_lesson_progress(&self, progress: &LessonProgress) -> Result<(), PersistenceError> {
        progress.validate()?;
        let mut state = self.state.write().await;
        let mut stored = progress.clone();
        if stored.id.is_none() {
            stored.id = Some(state.next_id());
        }
        state.lessons.insert((progress.user_id, progress.lesson_id), stored);
        Ok(())
    }

    async fn delete_lesson_progress(&self, user_id: u64, lesson_id: u64) -> Result<(), PersistenceError> {
        self.state.write().await.lessons.remove(&(user_id, lesson_id));
        Ok(())
    }

    async fn delete_lesson_progress_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        self.state.write().await.lessons.retain(|(user, _), _| *user != user_id);
        Ok(())
    }

    async fn count_completed_lessons(
        &self,
        user_id: u64,
        lesson_ids: &[u64],
    ) -> Result<u64, PersistenceError> {
        let state = self.state.read().await;
        let count = lesson_ids
            .iter()
            .filter(|lesson_id| {
                state
                    .lessons
                    .get(&(user_id, **lesson_id))
                    .is_some_and(LessonProgress::is_complete)
            })
            .count();
        Ok(count as u64)
    }
}

impl QuizSubmissionRepository for GuestSession {
    async fn create_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<QuizSubmission, PersistenceError> {
        let mut state = self.state.write().await;
        if state.submissions.contains_key(&(user_id, quiz_id)) {
            return Err(PersistenceError::already_exists("quiz submission", user_id, quiz_id));
        }
        let mut submission = QuizSubmission::new(user_id, quiz_id);
        submission.id = Some(state.next_id());
        state.submissions.insert((user_id, quiz_id), submission.clone());
        Ok(submission)
    }

    async fn get_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<Option<QuizSubmission>, PersistenceError> {
        Ok(self.state.read().await.submissions.get(&(user_id, quiz_id)).cloned())
    }

    async fn get_or_create_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<QuizSubmission, PersistenceError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.submissions.get(&(user_id, quiz_id)) {
            return Ok(existing.clone());
        }
        let mut submission = QuizSubmission::new(user_id, quiz_id);
        submission.id = Some(state.next_id());
        state.submissions.insert((user_id, quiz_id), submission.clone());
        Ok(submission)
    }

    async fn save_submission(&self, submission: &QuizSubmission) -> Result<(), PersistenceError> {
        submission.validate()?;
        let mut state = self.state.write().await;
        let mut stored = submission.clone();
        if stored.id.is_none() {
            stored.id = Some(state.next_id());
        }
        state.submissions.insert((submission.user_id, submission.quiz_id), stored);
        Ok(())
    }

    async fn delete_submission(&self, user_id: u64, quiz_id: u64) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        state.submissions.remove(&(user_id, quiz_id));
        state.grades.remove(&(user_id, quiz_id));
        Ok(())
    }

    async fn delete_submissions_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        state.submissions.retain(|(user, _), _| *user != user_id);
        state.grades.retain(|(user, _), _| *user != user_id);
        Ok(())
    }
}

fn missing_submission(submission: &QuizSubmission) -> PersistenceError {
    PersistenceError::not_found("quiz submission", submission.user_id, submission.quiz_id)
}

impl GradeRepository for GuestSession {
    async fn create_grade(
        &self,
        submission: &QuizSubmission,
        answer_id: u64,
        question_id: u64,
        points: u32,
        feedback: Option<String>,
    ) -> Result<Grade, PersistenceError> {
        let key = (submission.user_id, submission.quiz_id);
        let mut state = self.state.write().await;
        if !state.submissions.contains_key(&key) {
            return Err(missing_submission(submission));
        }
        if state.grades.get(&key).is_some_and(|g| g.contains_key(&question_id)) {
            return Err(PersistenceError::AlreadyExists {
                entity: "quiz grade",
                key: format!("user {}, quiz {}, question {question_id}", key.0, key.1),
            });
        }

        let mut grade = Grade::new(answer_id, question_id, points, feedback);
        grade.id = Some(state.next_id());
        state.grades.entry(key).or_default().insert(question_id, grade.clone());
        Ok(grade)
    }

    async fn get_grade(
        &self,
        submission: &QuizSubmission,
        question_id: u64,
    ) -> Result<Option<Grade>, PersistenceError> {
        let state = self.state.read().await;
        Ok(state
            .grades
            .get(&(submission.user_id, submission.quiz_id))
            .and_then(|grades| grades.get(&question_id))
            .cloned())
    }

    async fn get_all_grades(&self, submission: &QuizSubmission) -> Result<Vec<Grade>, PersistenceError> {
        let state = self.state.read().await;
        Ok(state
            .grades
            .get(&(submission.user_id, submission.quiz_id))
            .map(|grades| grades.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_grade(&self, submission: &QuizSubmission, grade: &Grade) -> Result<(), PersistenceError> {
        self.save_grades(submission, std::slice::from_ref(grade)).await
    }

    async fn save_grades(&self, submission: &QuizSubmission, grades: &[Grade]) -> Result<(), PersistenceError> {
        let key = (submission.user_id, submission.quiz_id);
        let mut state = self.state.write().await;
        if !state.submissions.contains_key(&key) {
            return Err(missing_submission(submission));
        }

        let mut stored = Vec::with_capacity(grades.len());
        for grade in grades {
            let mut grade = grade.clone();
            if grade.id.is_none() {
                grade.id = Some(state.next_id());
            }
            stored.push(grade);
        }
        let entry = state.grades.entry(key).or_default();
        for grade in stored {
            entry.insert(grade.question_id, grade);
        }
        Ok(())
    }

    async fn delete_all_grades(&self, submission: &QuizSubmission) -> Result<(), PersistenceError> {
        let key = (submission.user_id, submission.quiz_id);
        let mut state = self.state.write().await;
        if !state.submissions.contains_key(&key) {
            return Err(missing_submission(submission));
        }
        state.grades.remove(&key);
        Ok(())
    }

    async fn replace_grades(&self, submission: &QuizSubmission, grades: &[Grade]) -> Result<(), PersistenceError> {
        let key = (submission.user_id, submission.quiz_id);
        let mut state = self.state.write().await;
        if !state.submissions.contains_key(&key) {
            return Err(missing_submission(submission));
        }

        let mut replaced = BTreeMap::new();
        for grade in grades {
            let mut grade = grade.clone();
            if grade.id.is_none() {
                grade.id = Some(state.next_id());
            }
            replaced.insert(grade.question_id, grade);
        }
        state.grades.insert(key, replaced);
        Ok(())
    }
}
