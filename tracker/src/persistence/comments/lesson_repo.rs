//! Comment-backed lesson progress.
//!
//! Older installs wrote quiz outcomes into the lesson status. Those labels
//! are still read: `ungraded` and `failed` mean in progress, `graded` and
//! `passed` mean complete. Writes only ever use the current labels.

use progress::{LessonProgress, LessonStatus};

use super::meta::{MetaError, MetaKey};
use super::store::{CommentRecord, CommentStore, CommentType};
use crate::persistence::traits::LessonProgressRepository;
use crate::persistence::PersistenceError;

const ENTITY: &str = "lesson progress";

/// Status labels that count as a completed lesson.
const COMPLETE_LABELS: [&str; 3] = ["complete", "graded", "passed"];

fn decode_status(label: &str) -> Option<LessonStatus> {
    match label {
        "in-progress" | "ungraded" | "failed" => Some(LessonStatus::InProgress),
        "complete" | "graded" | "passed" => Some(LessonStatus::Complete),
        _ => None,
    }
}

fn lesson_to_record(progress: &LessonProgress) -> CommentRecord {
    let mut record = CommentRecord::new(
        CommentType::LessonStatus,
        progress.lesson_id,
        progress.user_id,
        progress.status.as_str(),
        progress.updated_at,
    );
    record.comment_id = progress.id;
    record.meta.set_timestamp(MetaKey::Start, progress.started_at);
    record.meta.set_timestamp(MetaKey::Complete, progress.completed_at);
    record.meta.set_timestamp(MetaKey::Created, Some(progress.created_at));
    record
}

/// Decode a `lesson_status` record, mapping legacy labels. Not validated.
pub(crate) fn lesson_from_record(record: &CommentRecord) -> Result<LessonProgress, PersistenceError> {
    let id = record.comment_id.unwrap_or_default();
    let corrupt = |e: MetaError| e.into_corrupt(ENTITY, id);

    let status = decode_status(&record.approved).ok_or_else(|| PersistenceError::Corrupt {
        entity: ENTITY,
        id,
        reason: format!("unknown lesson status '{}'", record.approved),
    })?;
    let started_at = record.meta.timestamp(MetaKey::Start).map_err(corrupt)?;
    let mut completed_at = record.meta.timestamp(MetaKey::Complete).map_err(corrupt)?;
    match status {
        LessonStatus::Complete if completed_at.is_none() => completed_at = Some(record.date),
        LessonStatus::InProgress => completed_at = None,
        LessonStatus::Complete => {}
    }
    let created_at = record
        .meta
        .timestamp(MetaKey::Created)
        .map_err(corrupt)?
        .unwrap_or(record.date);

    Ok(LessonProgress {
        id: record.comment_id,
        lesson_id: record.post_id,
        user_id: record.user_id,
        status,
        started_at,
        completed_at,
        created_at,
        updated_at: record.date,
    })
}

/// Comment-backed implementation of [`LessonProgressRepository`].
pub struct CommentLessonProgressRepository {
    store: CommentStore,
}

impl CommentLessonProgressRepository {
    pub fn new(store: CommentStore) -> Self {
        Self { store }
    }
}

impl LessonProgressRepository for CommentLessonProgressRepository {
    async fn create_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
        started_at: Option<u64>,
    ) -> Result<LessonProgress, PersistenceError> {
        let mut progress = LessonProgress::new(user_id, lesson_id, started_at);
        match self.store.insert(&lesson_to_record(&progress)).await? {
            Some(id) => {
                progress.id = Some(id);
                Ok(progress)
            }
            None => Err(PersistenceError::already_exists(ENTITY, user_id, lesson_id)),
        }
    }

    async fn get_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
    ) -> Result<Option<LessonProgress>, PersistenceError> {
        self.store
            .find(CommentType::LessonStatus, lesson_id, user_id)
            .await?
            .as_ref()
            .map(lesson_from_record)
            .transpose()
    }

    async fn get_or_create_lesson_progress(
        &self,
        user_id: u64,
        lesson_id: u64,
    ) -> Result<LessonProgress, PersistenceError> {
        let fresh = LessonProgress::new(user_id, lesson_id, None);
        self.store.insert(&lesson_to_record(&fresh)).await?;
        self.get_lesson_progress(user_id, lesson_id)
            .await?
            .ok_or_else(|| PersistenceError::not_found(ENTITY, user_id, lesson_id))
    }

    async fn save_lesson_progress(&self, progress: &LessonProgress) -> Result<(), PersistenceError> {
        progress.validate()?;
        self.store
            .upsert(&lesson_to_record(progress), CommentType::LessonStatus.meta_keys())
            .await?;
        Ok(())
    }

    async fn delete_lesson_progress(&self, user_id: u64, lesson_id: u64) -> Result<(), PersistenceError> {
        self.store
            .delete(CommentType::LessonStatus, lesson_id, user_id)
            .await?;
        Ok(())
    }

    async fn delete_lesson_progress_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        self.store
            .delete_for_user(CommentType::LessonStatus, user_id)
            .await?;
        Ok(())
    }

    async fn count_completed_lessons(
        &self,
        user_id: u64,
        lesson_ids: &[u64],
    ) -> Result<u64, PersistenceError> {
        self.store
            .count_with_status(CommentType::LessonStatus, user_id, lesson_ids, &COMPLETE_LABELS)
            .await
    }
}
