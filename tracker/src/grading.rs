//! Quiz grading over injected repositories.
//!
//! Auto-gradable answers are scored on submission; free-text answers wait
//! for [`GradingService::grade_manually`]. The submission's final grade is
//! stamped once every question of the quiz has a grade.

use progress::{
    final_grade, Answer, Grade, GradeOutcome, GradingPolicy, ProgressError, Question,
    QuizSubmission,
};
use tracing::{debug, info};

use crate::persistence::{GradeRepository, PersistenceError, ProgressStorage, QuizSubmissionRepository};

#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    #[error("no submission for user {user_id} on quiz {quiz_id}")]
    SubmissionNotFound { user_id: u64, quiz_id: u64 },
    #[error(transparent)]
    Invalid(#[from] ProgressError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// A quiz as the grader sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Quiz {
    pub id: u64,
    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn new(id: u64, questions: Vec<Question>) -> Self {
        Self { id, questions }
    }

    fn question(&self, question_id: u64) -> Result<&Question, ProgressError> {
        self.questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or(ProgressError::UnknownQuestion(question_id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradedSubmission {
    pub submission: QuizSubmission,
    pub grades: Vec<Grade>,
    /// Questions still without a grade.
    pub pending: Vec<u64>,
}

impl GradedSubmission {
    fn new(submission: QuizSubmission, quiz: &Quiz, grades: Vec<Grade>) -> Self {
        let pending = quiz
            .questions
            .iter()
            .map(|q| q.id)
            .filter(|id| !grades.iter().any(|g| g.question_id == *id))
            .collect();
        Self {
            submission,
            grades,
            pending,
        }
    }

    pub fn is_fully_graded(&self) -> bool {
        self.submission.is_graded()
    }
}

pub struct GradingService<S> {
    storage: S,
    policy: GradingPolicy,
}

impl GradingService<ProgressStorage> {
    /// Grade with the policy the storage implies (auto-pass for guests).
    pub fn for_storage(storage: ProgressStorage) -> Self {
        let policy = storage.grading_policy();
        Self::new(storage, policy)
    }
}

impl<S> GradingService<S>
where
    S: QuizSubmissionRepository + GradeRepository,
{
    pub fn new(storage: S, policy: GradingPolicy) -> Self {
        Self { storage, policy }
    }

    pub fn policy(&self) -> GradingPolicy {
        self.policy
    }

    /// Record a learner's answers. A resubmission replaces earlier grades
    /// and clears the final grade until it is complete again.
    pub async fn submit(
        &self,
        user_id: u64,
        quiz: &Quiz,
        answers: &[Answer],
    ) -> Result<GradedSubmission, GradingError> {
        let mut grades = Vec::with_capacity(answers.len());
        for answer in answers {
            let question = quiz.question(answer.question_id)?;
            match self.policy.grade(question, &answer.response) {
                GradeOutcome::Scored(points) => {
                    grades.push(Grade::new(answer.id, question.id, points, None));
                }
                GradeOutcome::NeedsManualGrading => {
                    debug!(user_id, question_id = question.id, "Answer needs manual grading");
                }
            }
        }

        let mut submission = self.storage.get_or_create_submission(user_id, quiz.id).await?;
        if submission.is_graded() {
            submission.set_final_grade(None)?;
            self.storage.save_submission(&submission).await?;
        }
        self.storage.replace_grades(&submission, &grades).await?;

        debug!(user_id, quiz_id = quiz.id, scored = grades.len(), "Quiz submitted");

        let submission = self.refresh_final_grade(submission, quiz, &grades).await?;
        Ok(GradedSubmission::new(submission, quiz, grades))
    }

    /// Set an instructor's points for one question. `feedback` replaces the
    /// stored feedback only when given. A question that was never answered
    /// gets a grade with answer id 0.
    pub async fn grade_manually(
        &self,
        user_id: u64,
        quiz: &Quiz,
        question_id: u64,
        points: u32,
        feedback: Option<String>,
    ) -> Result<GradedSubmission, GradingError> {
        let question = quiz.question(question_id)?;
        if points > question.max_points {
            return Err(ProgressError::PointsExceedMaximum {
                points,
                max_points: question.max_points,
            }
            .into());
        }

        let submission = self
            .storage
            .get_submission(user_id, quiz.id)
            .await?
            .ok_or(GradingError::SubmissionNotFound {
                user_id,
                quiz_id: quiz.id,
            })?;

        let grade = match self.storage.get_grade(&submission, question_id).await? {
            Some(mut grade) => {
                grade.set_points(points);
                if feedback.is_some() {
                    grade.set_feedback(feedback);
                }
                grade
            }
            None => Grade::new(0, question_id, points, feedback),
        };
        self.storage.save_grade(&submission, &grade).await?;
        info!(user_id, quiz_id = quiz.id, question_id, points, "Question graded manually");

        let grades = self.storage.get_all_grades(&submission).await?;
        let submission = self.refresh_final_grade(submission, quiz, &grades).await?;
        Ok(GradedSubmission::new(submission, quiz, grades))
    }

    /// Stamp the final grade once every question is graded.
    async fn refresh_final_grade(
        &self,
        mut submission: QuizSubmission,
        quiz: &Quiz,
        grades: &[Grade],
    ) -> Result<QuizSubmission, GradingError> {
        let Some(grade) = final_grade(&quiz.questions, grades) else {
            return Ok(submission);
        };
        if submission.final_grade != Some(grade) {
            submission.set_final_grade(Some(grade))?;
            self.storage.save_submission(&submission).await?;
            info!(
                user_id = submission.user_id,
                quiz_id = submission.quiz_id,
                final_grade = grade,
                "Final grade recorded"
            );
        }
        Ok(submission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StorageBackend, StorageSettings};
    use crate::persistence::sqlite::{Database, TableRepositories};
    use crate::persistence::{
        GuestSession, RepositoryFactory, RequestContext, RoutedRepositories, Settings,
    };
    use progress::{AnswerKey, Response};

    fn quiz() -> Quiz {
        Quiz::new(
            30,
            vec![
                Question { id: 1, max_points: 2, key: AnswerKey::SingleChoice("b".into()) },
                Question { id: 2, max_points: 1, key: AnswerKey::Boolean(true) },
                Question { id: 3, max_points: 5, key: AnswerKey::FreeText },
            ],
        )
    }

    fn answers() -> Vec<Answer> {
        vec![
            Answer { id: 11, question_id: 1, response: Response::Choice("b".into()) },
            Answer { id: 12, question_id: 2, response: Response::Boolean(false) },
            Answer { id: 13, question_id: 3, response: Response::Text("an essay".into()) },
        ]
    }

    async fn storage(db: &Database, ctx: &RequestContext) -> ProgressStorage {
        let factory = RepositoryFactory::new(db.pool().clone(), Settings::new(db.pool().clone()));
        factory.storage(ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_free_text_defers_final_grade() {
        let db = Database::new_in_memory().await.unwrap();
        let service = GradingService::for_storage(storage(&db, &RequestContext::user(1)).await);

        let result = service.submit(1, &quiz(), &answers()).await.unwrap();
        assert_eq!(result.grades.len(), 2);
        assert_eq!(result.pending, vec![3]);
        assert_eq!(result.submission.final_grade, None);
        assert!(!result.is_fully_graded());

        let result = service
            .grade_manually(1, &quiz(), 3, 4, Some("good structure".into()))
            .await
            .unwrap();
        assert!(result.pending.is_empty());
        // (2 + 0 + 4) / 8
        assert_eq!(result.submission.final_grade, Some(75.0));
        let essay = result.grades.iter().find(|g| g.question_id == 3).unwrap();
        assert_eq!(essay.feedback.as_deref(), Some("good structure"));
    }

    #[tokio::test]
    async fn test_manual_grade_over_maximum_is_rejected() {
        let db = Database::new_in_memory().await.unwrap();
        let service = GradingService::for_storage(storage(&db, &RequestContext::user(1)).await);
        service.submit(1, &quiz(), &answers()).await.unwrap();

        let err = service.grade_manually(1, &quiz(), 3, 6, None).await.unwrap_err();
        assert!(matches!(
            err,
            GradingError::Invalid(ProgressError::PointsExceedMaximum { points: 6, max_points: 5 })
        ));
    }

    #[tokio::test]
    async fn test_manual_grade_without_submission() {
        let db = Database::new_in_memory().await.unwrap();
        let service = GradingService::for_storage(storage(&db, &RequestContext::user(1)).await);
        let err = service.grade_manually(1, &quiz(), 3, 1, None).await.unwrap_err();
        assert!(matches!(err, GradingError::SubmissionNotFound { user_id: 1, quiz_id: 30 }));
    }

    #[tokio::test]
    async fn test_unknown_question_is_rejected() {
        let db = Database::new_in_memory().await.unwrap();
        let service = GradingService::for_storage(storage(&db, &RequestContext::user(1)).await);
        let stray = vec![Answer { id: 19, question_id: 9, response: Response::Boolean(true) }];
        let err = service.submit(1, &quiz(), &stray).await.unwrap_err();
        assert!(matches!(err, GradingError::Invalid(ProgressError::UnknownQuestion(9))));
    }

    #[tokio::test]
    async fn test_guest_auto_passes_free_text() {
        let db = Database::new_in_memory().await.unwrap();
        let ctx = RequestContext::guest(1, GuestSession::new());
        let service = GradingService::for_storage(storage(&db, &ctx).await);
        assert_eq!(service.policy(), GradingPolicy::AutoPass);

        let result = service.submit(1, &quiz(), &answers()).await.unwrap();
        assert!(result.pending.is_empty());
        // (2 + 0 + 5) / 8
        assert_eq!(result.submission.final_grade, Some(87.5));

        let tables = TableRepositories::new(db.pool());
        assert!(tables.submissions.get_submission(1, 30).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resubmission_replaces_grades() {
        let db = Database::new_in_memory().await.unwrap();
        let settings = StorageSettings {
            backend: StorageBackend::Tables,
            sync_enabled: false,
        };
        let service = GradingService::new(
            RoutedRepositories::new(db.pool(), settings),
            GradingPolicy::AutoPass,
        );

        let first = service.submit(1, &quiz(), &answers()).await.unwrap();
        assert_eq!(first.submission.final_grade, Some(87.5));

        let mut better = answers();
        better[1].response = Response::Boolean(true);
        let second = service.submit(1, &quiz(), &better).await.unwrap();
        assert_eq!(second.submission.final_grade, Some(100.0));
        assert_eq!(second.grades.len(), 3);
    }

    #[tokio::test]
    async fn test_resubmission_drops_grades_of_unanswered_questions() {
        let db = Database::new_in_memory().await.unwrap();
        let service = GradingService::for_storage(storage(&db, &RequestContext::user(1)).await);

        service.submit(1, &quiz(), &answers()).await.unwrap();
        let graded = service.grade_manually(1, &quiz(), 3, 5, None).await.unwrap();
        assert_eq!(graded.submission.final_grade, Some(87.5));

        // Only the first question answered this time.
        let second = service.submit(1, &quiz(), &answers()[..1]).await.unwrap();
        assert_eq!(second.submission.final_grade, None);
        assert_eq!(second.pending, vec![2, 3]);

        let stored = service.storage.get_submission(1, 30).await.unwrap().unwrap();
        assert_eq!(stored.final_grade, None);
        let grades = service.storage.get_all_grades(&stored).await.unwrap();
        assert_eq!(grades.len(), 1);
        assert_eq!(grades[0].question_id, 1);
    }
}
