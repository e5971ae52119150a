use serde::{Deserialize, Serialize};

use crate::{check_order, now_timestamp, LessonStatus, ProgressError};

/// A learner's progress through one lesson.
///
/// Unlike course progress, `start` and `complete` overwrite whatever state
/// the lesson is in; callers may invoke them repeatedly (retaking a lesson
/// restarts it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonProgress {
    /// Backend-local row id, `None` until stored.
    pub id: Option<u64>,
    pub lesson_id: u64,
    pub user_id: u64,
    pub status: LessonStatus,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl LessonProgress {
    /// A new in-progress row, started at `started_at` (default now).
    pub fn new(user_id: u64, lesson_id: u64, started_at: Option<u64>) -> Self {
        let now = now_timestamp();
        Self {
            id: None,
            lesson_id,
            user_id,
            status: LessonStatus::InProgress,
            started_at: Some(started_at.unwrap_or(now)),
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn start(&mut self, started_at: Option<u64>) {
        let now = now_timestamp();
        self.status = LessonStatus::InProgress;
        self.started_at = Some(started_at.unwrap_or(now));
        self.completed_at = None;
        self.updated_at = now;
    }

    pub fn complete(&mut self, completed_at: Option<u64>) -> Result<(), ProgressError> {
        let now = now_timestamp();
        let completed_at = completed_at.unwrap_or(now);
        check_order(self.started_at, completed_at)?;

        self.status = LessonStatus::Complete;
        self.started_at.get_or_insert(completed_at);
        self.completed_at = Some(completed_at);
        self.updated_at = now;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.status == LessonStatus::Complete
    }

    pub fn validate(&self) -> Result<(), ProgressError> {
        if let Some(completed_at) = self.completed_at {
            check_order(self.started_at, completed_at)?;
        }
        if self.status == LessonStatus::Complete && self.completed_at.is_none() {
            return Err(ProgressError::MissingCompletion {
                status: self.status.as_str(),
            });
        }
        Ok(())
    }
}
