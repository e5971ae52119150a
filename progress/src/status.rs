//! Progress status enums and their storage labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ProgressError;

/// Where a learner stands in a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CourseStatus {
    NotStarted,
    InProgress,
    Complete,
}

impl CourseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseStatus::NotStarted => "not-started",
            CourseStatus::InProgress => "in-progress",
            CourseStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseStatus {
    type Err = ProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-started" => Ok(CourseStatus::NotStarted),
            "in-progress" => Ok(CourseStatus::InProgress),
            "complete" => Ok(CourseStatus::Complete),
            other => Err(ProgressError::UnknownStatus(other.to_string())),
        }
    }
}

/// Where a learner stands in a lesson. Lessons have no not-started row:
/// the row is created when the lesson is first viewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LessonStatus {
    InProgress,
    Complete,
}

impl LessonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonStatus::InProgress => "in-progress",
            LessonStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LessonStatus {
    type Err = ProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-progress" => Ok(LessonStatus::InProgress),
            "complete" => Ok(LessonStatus::Complete),
            other => Err(ProgressError::UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_status_labels() {
        for status in [
            CourseStatus::NotStarted,
            CourseStatus::InProgress,
            CourseStatus::Complete,
        ] {
            assert_eq!(status.as_str().parse::<CourseStatus>().unwrap(), status);
        }
    }

    #[test]
    fn lesson_status_rejects_not_started() {
        let err = "not-started".parse::<LessonStatus>().unwrap_err();
        assert_eq!(err, ProgressError::UnknownStatus("not-started".into()));
    }

    #[test]
    fn course_status_orders_forward() {
        assert!(CourseStatus::NotStarted < CourseStatus::InProgress);
        assert!(CourseStatus::InProgress < CourseStatus::Complete);
    }

    #[test]
    fn serde_uses_kebab_labels() {
        let json = serde_json::to_string(&CourseStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
    }
}
