use serde::{Deserialize, Serialize};

use crate::{check_order, now_timestamp, CourseStatus, ProgressError};

/// A learner's progress through one course.
///
/// Transitions only move forward: `start` never pulls a completed course back
/// to in-progress, while `complete` always re-stamps the completion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseProgress {
    /// Backend-local row id, `None` until stored.
    pub id: Option<u64>,
    pub user_id: u64,
    pub course_id: u64,
    pub status: CourseStatus,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl CourseProgress {
    /// A fresh, not-started progress row.
    pub fn new(user_id: u64, course_id: u64) -> Self {
        let now = now_timestamp();
        Self {
            id: None,
            user_id,
            course_id,
            status: CourseStatus::NotStarted,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move a not-started course to in-progress. No-op once started.
    pub fn start(&mut self, started_at: Option<u64>) {
        if self.status != CourseStatus::NotStarted {
            return;
        }
        let now = now_timestamp();
        self.status = CourseStatus::InProgress;
        self.started_at = Some(started_at.unwrap_or(now));
        self.updated_at = now;
    }

    /// Mark the course complete at `completed_at` (default now).
    pub fn complete(&mut self, completed_at: Option<u64>) -> Result<(), ProgressError> {
        let now = now_timestamp();
        let completed_at = completed_at.unwrap_or(now);
        check_order(self.started_at, completed_at)?;

        self.status = CourseStatus::Complete;
        self.started_at.get_or_insert(completed_at);
        self.completed_at = Some(completed_at);
        self.updated_at = now;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.status == CourseStatus::Complete
    }

    /// Check the temporal and status invariants of a hydrated row.
    pub fn validate(&self) -> Result<(), ProgressError> {
        if let Some(completed_at) = self.completed_at {
            check_order(self.started_at, completed_at)?;
        }
        if self.status == CourseStatus::Complete && self.completed_at.is_none() {
            return Err(ProgressError::MissingCompletion {
                status: self.status.as_str(),
            });
        }
        Ok(())
    }
}
