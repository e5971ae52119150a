//! Comment-backed quiz submissions and their grades.
//!
//! A submission is one `quiz_submission` record per (quiz, user). The final
//! grade sits under the `grade` key; per-question grades live in three JSON
//! maps keyed by question id: `quiz_answers` (answer id), `quiz_grades`
//! (points) and `answers_feedback` (text). Grades therefore have no ids of
//! their own and share the submission's timestamps.

use progress::{now_timestamp, Grade, QuizSubmission};
use std::collections::BTreeMap;

use super::meta::{MetaError, MetaKey, MetaMap};
use super::store::{CommentRecord, CommentStore, CommentType};
use crate::persistence::traits::{GradeRepository, QuizSubmissionRepository};
use crate::persistence::PersistenceError;

const ENTITY: &str = "quiz submission";
const GRADE_ENTITY: &str = "quiz grade";

const SUBMITTED: &str = "submitted";
const GRADED: &str = "graded";

/// Metadata keys holding per-question grades.
const GRADE_KEYS: [MetaKey; 3] = [MetaKey::QuizAnswers, MetaKey::QuizGrades, MetaKey::AnswersFeedback];
/// Metadata keys holding the submission itself.
const SUBMISSION_KEYS: [MetaKey; 2] = [MetaKey::Created, MetaKey::Grade];

fn submission_to_record(submission: &QuizSubmission) -> CommentRecord {
    let status = if submission.is_graded() { GRADED } else { SUBMITTED };
    let mut record = CommentRecord::new(
        CommentType::QuizSubmission,
        submission.quiz_id,
        submission.user_id,
        status,
        submission.updated_at,
    );
    record.comment_id = submission.id;
    record.meta.set_timestamp(MetaKey::Created, Some(submission.created_at));
    record.meta.set_number(MetaKey::Grade, submission.final_grade);
    record
}

/// Decode a `quiz_submission` record. Not validated.
pub(crate) fn submission_from_record(record: &CommentRecord) -> Result<QuizSubmission, PersistenceError> {
    let id = record.comment_id.unwrap_or_default();
    let corrupt = |e: MetaError| e.into_corrupt(ENTITY, id);

    let created_at = record
        .meta
        .timestamp(MetaKey::Created)
        .map_err(corrupt)?
        .unwrap_or(record.date);
    let final_grade = record.meta.number(MetaKey::Grade).map_err(corrupt)?;

    Ok(QuizSubmission {
        id: record.comment_id,
        quiz_id: record.post_id,
        user_id: record.user_id,
        final_grade,
        created_at,
        updated_at: record.date,
    })
}

/// The three grade maps of a submission record.
#[derive(Debug, Default)]
struct GradeMaps {
    answers: BTreeMap<u64, u64>,
    points: BTreeMap<u64, u32>,
    feedback: BTreeMap<u64, String>,
}

impl GradeMaps {
    fn decode(record: &CommentRecord) -> Result<Self, PersistenceError> {
        let id = record.comment_id.unwrap_or_default();
        let corrupt = |e: MetaError| e.into_corrupt(ENTITY, id);
        Ok(Self {
            answers: record.meta.json(MetaKey::QuizAnswers).map_err(corrupt)?,
            points: record.meta.json(MetaKey::QuizGrades).map_err(corrupt)?,
            feedback: record.meta.json(MetaKey::AnswersFeedback).map_err(corrupt)?,
        })
    }

    fn insert(&mut self, grade: &Grade) {
        self.answers.insert(grade.question_id, grade.answer_id);
        self.points.insert(grade.question_id, grade.points);
        match &grade.feedback {
            Some(text) => self.feedback.insert(grade.question_id, text.clone()),
            None => self.feedback.remove(&grade.question_id),
        };
    }

    fn grade(&self, question_id: u64, created_at: u64, updated_at: u64) -> Option<Grade> {
        let points = *self.points.get(&question_id)?;
        Some(Grade {
            id: None,
            answer_id: self.answers.get(&question_id).copied().unwrap_or_default(),
            question_id,
            points,
            feedback: self.feedback.get(&question_id).cloned(),
            created_at,
            updated_at,
        })
    }

    fn grades(&self, created_at: u64, updated_at: u64) -> Vec<Grade> {
        self.points
            .keys()
            .filter_map(|question_id| self.grade(*question_id, created_at, updated_at))
            .collect()
    }

    fn to_meta(&self) -> Result<MetaMap, PersistenceError> {
        let mut meta = MetaMap::new();
        if !self.points.is_empty() {
            meta.set_json(MetaKey::QuizAnswers, &self.answers)?;
            meta.set_json(MetaKey::QuizGrades, &self.points)?;
            meta.set_json(MetaKey::AnswersFeedback, &self.feedback)?;
        }
        Ok(meta)
    }
}

/// Decode the grades stored on a `quiz_submission` record, ordered by
/// question id.
pub(crate) fn grades_from_record(record: &CommentRecord) -> Result<Vec<Grade>, PersistenceError> {
    let submission = submission_from_record(record)?;
    let maps = GradeMaps::decode(record)?;
    Ok(maps.grades(submission.created_at, submission.updated_at))
}

/// Comment-backed implementation of [`QuizSubmissionRepository`].
pub struct CommentQuizSubmissionRepository {
    store: CommentStore,
}

impl CommentQuizSubmissionRepository {
    pub fn new(store: CommentStore) -> Self {
        Self { store }
    }
}

impl QuizSubmissionRepository for CommentQuizSubmissionRepository {
    async fn create_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<QuizSubmission, PersistenceError> {
        let mut submission = QuizSubmission::new(user_id, quiz_id);
        match self.store.insert(&submission_to_record(&submission)).await? {
            Some(id) => {
                submission.id = Some(id);
                Ok(submission)
            }
            None => Err(PersistenceError::already_exists(ENTITY, user_id, quiz_id)),
        }
    }

    async fn get_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<Option<QuizSubmission>, PersistenceError> {
        self.store
            .find(CommentType::QuizSubmission, quiz_id, user_id)
            .await?
            .as_ref()
            .map(submission_from_record)
            .transpose()
    }

    async fn get_or_create_submission(
        &self,
        user_id: u64,
        quiz_id: u64,
    ) -> Result<QuizSubmission, PersistenceError> {
        let fresh = QuizSubmission::new(user_id, quiz_id);
        self.store.insert(&submission_to_record(&fresh)).await?;
        self.get_submission(user_id, quiz_id)
            .await?
            .ok_or_else(|| PersistenceError::not_found(ENTITY, user_id, quiz_id))
    }

    async fn save_submission(&self, submission: &QuizSubmission) -> Result<(), PersistenceError> {
        submission.validate()?;
        // Grade maps are left untouched.
        self.store
            .upsert(&submission_to_record(submission), &SUBMISSION_KEYS)
            .await?;
        Ok(())
    }

    async fn delete_submission(&self, user_id: u64, quiz_id: u64) -> Result<(), PersistenceError> {
        self.store
            .delete(CommentType::QuizSubmission, quiz_id, user_id)
            .await?;
        Ok(())
    }

    async fn delete_submissions_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        self.store
            .delete_for_user(CommentType::QuizSubmission, user_id)
            .await?;
        Ok(())
    }
}

/// Comment-backed implementation of [`GradeRepository`].
pub struct CommentGradeRepository {
    store: CommentStore,
}

impl CommentGradeRepository {
    pub fn new(store: CommentStore) -> Self {
        Self { store }
    }

    async fn find_record(&self, submission: &QuizSubmission) -> Result<Option<CommentRecord>, PersistenceError> {
        self.store
            .find(CommentType::QuizSubmission, submission.quiz_id, submission.user_id)
            .await
    }

    async fn load_maps(&self, submission: &QuizSubmission) -> Result<GradeMaps, PersistenceError> {
        let record = self.find_record(submission).await?.ok_or_else(|| {
            PersistenceError::not_found(ENTITY, submission.user_id, submission.quiz_id)
        })?;
        GradeMaps::decode(&record)
    }

    async fn store_maps(&self, submission: &QuizSubmission, maps: &GradeMaps) -> Result<(), PersistenceError> {
        let updated = self
            .store
            .update_meta(
                CommentType::QuizSubmission,
                submission.quiz_id,
                submission.user_id,
                now_timestamp(),
                &maps.to_meta()?,
                &GRADE_KEYS,
            )
            .await?;
        if !updated {
            return Err(PersistenceError::not_found(ENTITY, submission.user_id, submission.quiz_id));
        }
        Ok(())
    }
}

impl GradeRepository for CommentGradeRepository {
    async fn create_grade(
        &self,
        submission: &QuizSubmission,
        answer_id: u64,
        question_id: u64,
        points: u32,
        feedback: Option<String>,
    ) -> Result<Grade, PersistenceError> {
        let mut maps = self.load_maps(submission).await?;
        if maps.points.contains_key(&question_id) {
            return Err(PersistenceError::AlreadyExists {
                entity: GRADE_ENTITY,
                key: format!(
                    "user {}, quiz {}, question {question_id}",
                    submission.user_id, submission.quiz_id
                ),
            });
        }

        let grade = Grade::new(answer_id, question_id, points, feedback);
        maps.insert(&grade);
        self.store_maps(submission, &maps).await?;
        Ok(grade)
    }

    async fn get_grade(
        &self,
        submission: &QuizSubmission,
        question_id: u64,
    ) -> Result<Option<Grade>, PersistenceError> {
        let Some(record) = self.find_record(submission).await? else {
            return Ok(None);
        };
        let owner = submission_from_record(&record)?;
        Ok(GradeMaps::decode(&record)?.grade(question_id, owner.created_at, owner.updated_at))
    }

    async fn get_all_grades(&self, submission: &QuizSubmission) -> Result<Vec<Grade>, PersistenceError> {
        match self.find_record(submission).await? {
            Some(record) => grades_from_record(&record),
            None => Ok(Vec::new()),
        }
    }

    async fn save_grade(&self, submission: &QuizSubmission, grade: &Grade) -> Result<(), PersistenceError> {
        self.save_grades(submission, std::slice::from_ref(grade)).await
    }

    async fn save_grades(&self, submission: &QuizSubmission, grades: &[Grade]) -> Result<(), PersistenceError> {
        let mut maps = self.load_maps(submission).await?;
        for grade in grades {
            maps.insert(grade);
        }
        self.store_maps(submission, &maps).await
    }

    async fn delete_all_grades(&self, submission: &QuizSubmission) -> Result<(), PersistenceError> {
        self.store_maps(submission, &GradeMaps::default()).await
    }

    /// One meta update overwrites all three maps.
    async fn replace_grades(&self, submission: &QuizSubmission, grades: &[Grade]) -> Result<(), PersistenceError> {
        let mut maps = GradeMaps::default();
        for grade in grades {
            maps.insert(grade);
        }
        self.store_maps(submission, &maps).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::Database;

    struct Repos {
        _db: Database,
        store: CommentStore,
        submissions: CommentQuizSubmissionRepository,
        grades: CommentGradeRepository,
    }

    async fn repos() -> Repos {
        let db = Database::new_in_memory().await.unwrap();
        let store = CommentStore::new(db.pool().clone());
        Repos {
            submissions: CommentQuizSubmissionRepository::new(store.clone()),
            grades: CommentGradeRepository::new(store.clone()),
            store,
            _db: db,
        }
    }

    #[tokio::test]
    async fn test_submission_roundtrip() {
        let r = repos().await;
        let mut submission = r.submissions.create_submission(1, 500).await.unwrap();
        assert_eq!(r.submissions.get_submission(1, 500).await.unwrap(), Some(submission.clone()));

        submission.set_final_grade(Some(66.67)).unwrap();
        r.submissions.save_submission(&submission).await.unwrap();

        let loaded = r.submissions.get_submission(1, 500).await.unwrap().unwrap();
        assert_eq!(loaded.final_grade, Some(66.67));
        let record = r.store.find(CommentType::QuizSubmission, 500, 1).await.unwrap().unwrap();
        assert_eq!(record.approved, GRADED);
    }

    #[tokio::test]
    async fn test_grades_live_in_json_maps() {
        let r = repos().await;
        let submission = r.submissions.create_submission(1, 500).await.unwrap();
        r.grades
            .save_grades(
                &submission,
                &[Grade::new(31, 3, 2, None), Grade::new(41, 4, 0, Some("Reread chapter 2".into()))],
            )
            .await
            .unwrap();

        let record = r.store.find(CommentType::QuizSubmission, 500, 1).await.unwrap().unwrap();
        assert_eq!(record.meta.raw(MetaKey::QuizGrades), Some(r#"{"3":2,"4":0}"#));
        assert_eq!(record.meta.raw(MetaKey::QuizAnswers), Some(r#"{"3":31,"4":41}"#));
        assert_eq!(record.meta.raw(MetaKey::AnswersFeedback), Some(r#"{"4":"Reread chapter 2"}"#));

        let grade = r.grades.get_grade(&submission, 4).await.unwrap().unwrap();
        assert_eq!(grade.id, None);
        assert_eq!(grade.answer_id, 41);
        assert_eq!(grade.feedback.as_deref(), Some("Reread chapter 2"));
    }

    #[tokio::test]
    async fn test_saving_submission_keeps_grades() {
        let r = repos().await;
        let mut submission = r.submissions.create_submission(1, 500).await.unwrap();
        r.grades.create_grade(&submission, 31, 3, 2, None).await.unwrap();

        submission.set_final_grade(Some(100.0)).unwrap();
        r.submissions.save_submission(&submission).await.unwrap();

        assert_eq!(r.grades.get_all_grades(&submission).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_grade_twice_is_rejected() {
        let r = repos().await;
        let submission = r.submissions.create_submission(1, 500).await.unwrap();
        r.grades.create_grade(&submission, 31, 3, 2, None).await.unwrap();
        let err = r.grades.create_grade(&submission, 32, 3, 1, None).await.unwrap_err();
        assert!(matches!(err, PersistenceError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_grade_writes_need_a_submission() {
        let r = repos().await;
        let orphan = QuizSubmission::new(1, 999);
        let err = r.grades.save_grade(&orphan, &Grade::new(1, 1, 1, None)).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
        assert!(r.grades.get_all_grades(&orphan).await.unwrap().is_empty());
        assert_eq!(r.grades.get_grade(&orphan, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_all_grades_clears_maps() {
        let r = repos().await;
        let submission = r.submissions.create_submission(1, 500).await.unwrap();
        r.grades.create_grade(&submission, 31, 3, 2, Some("ok".into())).await.unwrap();
        r.grades.delete_all_grades(&submission).await.unwrap();

        assert!(r.grades.get_all_grades(&submission).await.unwrap().is_empty());
        let record = r.store.find(CommentType::QuizSubmission, 500, 1).await.unwrap().unwrap();
        assert_eq!(record.meta.raw(MetaKey::QuizGrades), None);
    }

    #[tokio::test]
    async fn test_replace_grades_overwrites_every_map() {
        let r = repos().await;
        let submission = r.submissions.create_submission(1, 500).await.unwrap();
        r.grades
            .save_grades(
                &submission,
                &[Grade::new(31, 3, 2, Some("ok".into())), Grade::new(32, 4, 1, None)],
            )
            .await
            .unwrap();

        r.grades
            .replace_grades(&submission, &[Grade::new(41, 4, 0, None)])
            .await
            .unwrap();

        let all = r.grades.get_all_grades(&submission).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!((all[0].question_id, all[0].answer_id, all[0].points), (4, 41, 0));
        assert_eq!(r.grades.get_grade(&submission, 3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_grade_map_is_corrupt() {
        let r = repos().await;
        let mut record = CommentRecord::new(CommentType::QuizSubmission, 500, 1, SUBMITTED, 10);
        record.meta.set_raw(MetaKey::QuizGrades, "[1, 2");
        let id = r.store.insert(&record).await.unwrap().unwrap();

        let submission = r.submissions.get_submission(1, 500).await.unwrap().unwrap();
        let err = r.grades.get_all_grades(&submission).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { id: found, .. } if found == id));
    }
}
