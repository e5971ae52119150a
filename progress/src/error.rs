use thiserror::Error;

/// Validation failures raised by the progress entities before anything
/// reaches storage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgressError {
    #[error("completion time {completed_at} is earlier than start time {started_at}")]
    CompletedBeforeStart { started_at: u64, completed_at: u64 },

    #[error("status {status} requires a completion time")]
    MissingCompletion { status: &'static str },

    #[error("final grade {0} is outside 0..=100")]
    GradeOutOfRange(f64),

    #[error("{points} points exceeds the question maximum of {max_points}")]
    PointsExceedMaximum { points: u32, max_points: u32 },

    #[error("unknown status label: {0}")]
    UnknownStatus(String),

    #[error("question {0} is not part of this quiz")]
    UnknownQuestion(u64),
}
