//! Grading rules: scoring answers against an answer key and aggregating the
//! per-question points of a submission into its final grade.
//!
//! Final grades are percentages rounded half-up to two decimals. The
//! arithmetic runs on integer basis points so that, for example, 17 of 20
//! points is exactly `85.00` rather than a float that merely prints as one.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::Grade;

/// The correct answer for a question, which also fixes its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum AnswerKey {
    SingleChoice(String),
    /// Every listed option, and only those, must be selected.
    MultipleChoice(BTreeSet<String>),
    Boolean(bool),
    /// Accepted spellings for a gap; compared trimmed and case-insensitively.
    GapFill(Vec<String>),
    /// No key: an instructor grades the answer.
    FreeText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    SingleChoice,
    MultipleChoice,
    Boolean,
    GapFill,
    FreeText,
}

impl QuestionKind {
    /// Whether the kind can be scored without an instructor.
    pub fn is_auto_gradable(&self) -> bool {
        !matches!(self, QuestionKind::FreeText)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: u64,
    pub max_points: u32,
    pub key: AnswerKey,
}

impl Question {
    pub fn kind(&self) -> QuestionKind {
        match self.key {
            AnswerKey::SingleChoice(_) => QuestionKind::SingleChoice,
            AnswerKey::MultipleChoice(_) => QuestionKind::MultipleChoice,
            AnswerKey::Boolean(_) => QuestionKind::Boolean,
            AnswerKey::GapFill(_) => QuestionKind::GapFill,
            AnswerKey::FreeText => QuestionKind::FreeText,
        }
    }
}

/// What the learner submitted for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Response {
    Choice(String),
    Choices(BTreeSet<String>),
    Boolean(bool),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: u64,
    pub question_id: u64,
    pub response: Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeOutcome {
    Scored(u32),
    /// Deferred until an instructor supplies points.
    NeedsManualGrading,
}

/// How questions that cannot be auto-graded are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradingPolicy {
    #[default]
    Standard,
    /// Award full marks instead of waiting on an instructor (guest previews).
    AutoPass,
}

impl GradingPolicy {
    pub fn grade(&self, question: &Question, response: &Response) -> GradeOutcome {
        match (self, auto_grade(question, response)) {
            (GradingPolicy::AutoPass, GradeOutcome::NeedsManualGrading) => {
                GradeOutcome::Scored(question.max_points)
            }
            (_, outcome) => outcome,
        }
    }
}

/// Score a response against the question's key. Correct answers earn the
/// full `max_points`, anything else (including a response of the wrong shape)
/// earns nothing.
pub fn auto_grade(question: &Question, response: &Response) -> GradeOutcome {
    let correct = match (&question.key, response) {
        (AnswerKey::FreeText, _) => return GradeOutcome::NeedsManualGrading,
        (AnswerKey::SingleChoice(key), Response::Choice(given)) => key == given,
        (AnswerKey::MultipleChoice(key), Response::Choices(given)) => key == given,
        (AnswerKey::Boolean(key), Response::Boolean(given)) => key == given,
        (AnswerKey::GapFill(accepted), Response::Text(given)) => {
            let given = given.trim().to_lowercase();
            accepted.iter().any(|a| a.trim().to_lowercase() == given)
        }
        _ => false,
    };

    GradeOutcome::Scored(if correct { question.max_points } else { 0 })
}

/// Aggregate a submission's grades into a percentage.
///
/// Returns `None` while any question lacks a grade. Grades for questions that
/// are not part of `questions` are ignored, and awarded points are capped at
/// the question maximum. A quiz worth zero points in total grades to `0.0`.
pub fn final_grade(questions: &[Question], grades: &[Grade]) -> Option<f64> {
    let by_question: HashMap<u64, u32> = grades.iter().map(|g| (g.question_id, g.points)).collect();

    let mut awarded: u64 = 0;
    let mut available: u64 = 0;
    for question in questions {
        let points = *by_question.get(&question.id)?;
        awarded += u64::from(points.min(question.max_points));
        available += u64::from(question.max_points);
    }

    if available == 0 {
        return Some(0.0);
    }

    // Basis points, rounded half-up: floor((2 * a * 10000 + t) / (2 * t)).
    let basis_points = (2 * awarded * 10_000 + available) / (2 * available);
    Some(basis_points as f64 / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: u64, max_points: u32, key: AnswerKey) -> Question {
        Question { id, max_points, key }
    }

    fn grade(question_id: u64, points: u32) -> Grade {
        Grade::new(question_id * 100, question_id, points, None)
    }

    #[test]
    fn single_choice_exact_match() {
        let q = question(1, 5, AnswerKey::SingleChoice("b".into()));
        assert_eq!(auto_grade(&q, &Response::Choice("b".into())), GradeOutcome::Scored(5));
        assert_eq!(auto_grade(&q, &Response::Choice("c".into())), GradeOutcome::Scored(0));
    }

    #[test]
    fn multiple_choice_needs_exact_set() {
        let key: BTreeSet<String> = ["a", "c"].iter().map(|s| s.to_string()).collect();
        let q = question(1, 4, AnswerKey::MultipleChoice(key.clone()));
        assert_eq!(auto_grade(&q, &Response::Choices(key)), GradeOutcome::Scored(4));

        let partial: BTreeSet<String> = ["a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(auto_grade(&q, &Response::Choices(partial)), GradeOutcome::Scored(0));
    }

    #[test]
    fn gap_fill_ignores_case_and_padding() {
        let q = question(1, 2, AnswerKey::GapFill(vec!["Paris".into()]));
        assert_eq!(auto_grade(&q, &Response::Text("  paris ".into())), GradeOutcome::Scored(2));
    }

    #[test]
    fn wrong_shape_scores_zero() {
        let q = question(1, 3, AnswerKey::Boolean(true));
        assert_eq!(auto_grade(&q, &Response::Text("true".into())), GradeOutcome::Scored(0));
    }

    #[test]
    fn free_text_is_deferred() {
        let q = question(1, 10, AnswerKey::FreeText);
        assert_eq!(
            auto_grade(&q, &Response::Text("essay".into())),
            GradeOutcome::NeedsManualGrading
        );
        assert!(!q.kind().is_auto_gradable());
    }

    #[test]
    fn auto_pass_awards_full_marks_for_free_text() {
        let q = question(1, 10, AnswerKey::FreeText);
        let outcome = GradingPolicy::AutoPass.grade(&q, &Response::Text("essay".into()));
        assert_eq!(outcome, GradeOutcome::Scored(10));
    }

    #[test]
    fn auto_pass_does_not_rescue_wrong_answers() {
        let q = question(1, 10, AnswerKey::Boolean(false));
        let outcome = GradingPolicy::AutoPass.grade(&q, &Response::Boolean(true));
        assert_eq!(outcome, GradeOutcome::Scored(0));
    }

    #[test]
    fn final_grade_waits_for_every_question() {
        let questions = vec![
            question(1, 10, AnswerKey::Boolean(true)),
            question(2, 10, AnswerKey::FreeText),
        ];
        assert_eq!(final_grade(&questions, &[grade(1, 7)]), None);
    }

    #[test]
    fn final_grade_is_percentage_of_max() {
        let questions = vec![
            question(1, 10, AnswerKey::Boolean(true)),
            question(2, 10, AnswerKey::FreeText),
        ];
        let grades = vec![grade(1, 7), grade(2, 10)];
        assert_eq!(final_grade(&questions, &grades), Some(85.0));
    }

    #[test]
    fn final_grade_rounds_half_up() {
        // 1/3 -> 33.333.. -> 33.33
        let third = vec![question(1, 3, AnswerKey::FreeText)];
        assert_eq!(final_grade(&third, &[grade(1, 1)]), Some(33.33));

        // 2/3 -> 66.666.. -> 66.67
        assert_eq!(final_grade(&third, &[grade(1, 2)]), Some(66.67));

        // 1/8 -> 12.5 exactly, 1/16 -> 6.25, 1/32 -> 3.125 -> 3.13
        let thirty_two = vec![question(1, 32, AnswerKey::FreeText)];
        assert_eq!(final_grade(&thirty_two, &[grade(1, 1)]), Some(3.13));
    }

    #[test]
    fn final_grade_caps_points_at_max() {
        let questions = vec![question(1, 5, AnswerKey::FreeText)];
        assert_eq!(final_grade(&questions, &[grade(1, 9)]), Some(100.0));
    }

    #[test]
    fn final_grade_of_zero_point_quiz() {
        let questions = vec![question(1, 0, AnswerKey::FreeText)];
        assert_eq!(final_grade(&questions, &[grade(1, 0)]), Some(0.0));
        assert_eq!(final_grade(&[], &[]), Some(0.0));
    }

    #[test]
    fn grades_for_foreign_questions_are_ignored() {
        let questions = vec![question(1, 4, AnswerKey::FreeText)];
        let grades = vec![grade(1, 2), grade(99, 50)];
        assert_eq!(final_grade(&questions, &grades), Some(50.0));
    }
}
