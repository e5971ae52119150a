//! Shared encode/decode helpers for SQLite ↔ domain type conversions.
//!
//! SQLite stores integers as signed 64-bit values while the domain uses
//! unsigned ids and timestamps; status enums are stored as the `TEXT` labels
//! the schema's CHECK constraints allow.

use progress::{CourseStatus, LessonStatus};

use crate::persistence::PersistenceError;

/// Encode an id or timestamp for an INTEGER column.
pub fn to_db(value: u64) -> i64 {
    value as i64
}

/// Decode an INTEGER column into an id or timestamp.
pub fn from_db(value: i64) -> u64 {
    value.max(0) as u64
}

pub fn opt_to_db(value: Option<u64>) -> Option<i64> {
    value.map(to_db)
}

pub fn opt_from_db(value: Option<i64>) -> Option<u64> {
    value.map(from_db)
}

pub fn decode_course_status(status: &str) -> Result<CourseStatus, PersistenceError> {
    Ok(status.parse::<CourseStatus>()?)
}

pub fn decode_lesson_status(status: &str) -> Result<LessonStatus, PersistenceError> {
    Ok(status.parse::<LessonStatus>()?)
}

/// Whether `err` is a UNIQUE (natural key) constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Build a `?, ?, ?` placeholder list for an `IN (...)` clause.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
