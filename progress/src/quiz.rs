use serde::{Deserialize, Serialize};

use crate::{now_timestamp, ProgressError};

/// One learner's attempt at a quiz. Owns its grades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSubmission {
    /// Backend-local row id, `None` until stored.
    pub id: Option<u64>,
    pub quiz_id: u64,
    pub user_id: u64,
    /// Percentage in `0..=100`; `None` until every question is graded.
    pub final_grade: Option<f64>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl QuizSubmission {
    pub fn new(user_id: u64, quiz_id: u64) -> Self {
        let now = now_timestamp();
        Self {
            id: None,
            quiz_id,
            user_id,
            final_grade: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_final_grade(&mut self, final_grade: Option<f64>) -> Result<(), ProgressError> {
        if let Some(grade) = final_grade {
            check_grade(grade)?;
        }
        self.final_grade = final_grade;
        self.updated_at = now_timestamp();
        Ok(())
    }

    pub fn is_graded(&self) -> bool {
        self.final_grade.is_some()
    }

    pub fn validate(&self) -> Result<(), ProgressError> {
        match self.final_grade {
            Some(grade) => check_grade(grade),
            None => Ok(()),
        }
    }
}

fn check_grade(grade: f64) -> Result<(), ProgressError> {
    if grade.is_nan() || !(0.0..=100.0).contains(&grade) {
        return Err(ProgressError::GradeOutOfRange(grade));
    }
    Ok(())
}

/// Points awarded for one answered question of a submission.
///
/// The owning submission is implicit: repositories scope grades by the
/// submission they are asked about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    /// Backend-local row id; the comment store never assigns one.
    pub id: Option<u64>,
    pub answer_id: u64,
    pub question_id: u64,
    pub points: u32,
    pub feedback: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Grade {
    pub fn new(answer_id: u64, question_id: u64, points: u32, feedback: Option<String>) -> Self {
        let now = now_timestamp();
        Self {
            id: None,
            answer_id,
            question_id,
            points,
            feedback,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_points(&mut self, points: u32) {
        self.points = points;
        self.updated_at = now_timestamp();
    }

    pub fn set_feedback(&mut self, feedback: Option<String>) {
        self.feedback = feedback;
        self.updated_at = now_timestamp();
    }
}
