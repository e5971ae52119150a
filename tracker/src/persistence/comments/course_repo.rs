//! Comment-backed course progress: one `course_status` record per
//! (course, user) with the status label in `comment_approved`.

use progress::{CourseProgress, CourseStatus};

use super::meta::MetaKey;
use super::store::{CommentRecord, CommentStore, CommentType};
use crate::persistence::traits::CourseProgressRepository;
use crate::persistence::PersistenceError;

const ENTITY: &str = "course progress";

fn course_to_record(progress: &CourseProgress) -> CommentRecord {
    let mut record = CommentRecord::new(
        CommentType::CourseStatus,
        progress.course_id,
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

/// Decode a `course_status` record. The result is not validated; callers
/// that need the temporal invariants call `validate()`.
pub(crate) fn course_from_record(record: &CommentRecord) -> Result<CourseProgress, PersistenceError> {
    let id = record.comment_id.unwrap_or_default();
    let corrupt = |e: super::meta::MetaError| e.into_corrupt(ENTITY, id);

    let status = record
        .approved
        .parse::<CourseStatus>()
        .map_err(|e| PersistenceError::Corrupt {
            entity: ENTITY,
            id,
            reason: e.to_string(),
        })?;
    let started_at = record.meta.timestamp(MetaKey::Start).map_err(corrupt)?;
    let mut completed_at = record.meta.timestamp(MetaKey::Complete).map_err(corrupt)?;
    if status == CourseStatus::Complete && completed_at.is_none() {
        completed_at = Some(record.date);
    }
    let created_at = record
        .meta
        .timestamp(MetaKey::Created)
        .map_err(corrupt)?
        .unwrap_or(record.date);

    Ok(CourseProgress {
        id: record.comment_id,
        user_id: record.user_id,
        course_id: record.post_id,
        status,
        started_at,
        completed_at,
        created_at,
        updated_at: record.date,
    })
}

/// Comment-backed implementation of [`CourseProgressRepository`].
pub struct CommentCourseProgressRepository {
    store: CommentStore,
}

impl CommentCourseProgressRepository {
    pub fn new(store: CommentStore) -> Self {
        Self { store }
    }
}

impl CourseProgressRepository for CommentCourseProgressRepository {
    async fn create_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<CourseProgress, PersistenceError> {
        let mut progress = CourseProgress::new(user_id, course_id);
        match self.store.insert(&course_to_record(&progress)).await? {
            Some(id) => {
                progress.id = Some(id);
                Ok(progress)
            }
            None => Err(PersistenceError::already_exists(ENTITY, user_id, course_id)),
        }
    }

    async fn get_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<Option<CourseProgress>, PersistenceError> {
        self.store
            .find(CommentType::CourseStatus, course_id, user_id)
            .await?
            .as_ref()
            .map(course_from_record)
            .transpose()
    }

    async fn get_or_create_course_progress(
        &self,
        user_id: u64,
        course_id: u64,
    ) -> Result<CourseProgress, PersistenceError> {
        let fresh = CourseProgress::new(user_id, course_id);
        self.store.insert(&course_to_record(&fresh)).await?;
        self.get_course_progress(user_id, course_id)
            .await?
            .ok_or_else(|| PersistenceError::not_found(ENTITY, user_id, course_id))
    }

    async fn save_course_progress(&self, progress: &CourseProgress) -> Result<(), PersistenceError> {
        progress.validate()?;
        let record = course_to_record(progress);
        self.store
            .upsert(&record, CommentType::CourseStatus.meta_keys())
            .await?;
        Ok(())
    }

    async fn delete_course_progress(&self, user_id: u64, course_id: u64) -> Result<(), PersistenceError> {
        self.store
            .delete(CommentType::CourseStatus, course_id, user_id)
            .await?;
        Ok(())
    }

    async fn delete_course_progress_for_user(&self, user_id: u64) -> Result<(), PersistenceError> {
        self.store
            .delete_for_user(CommentType::CourseStatus, user_id)
            .await?;
        Ok(())
    }
}
