use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::answer::AnswerSelection;
use crate::model::ids::{OptionId, QuestionId};

/// Fewest options a question may offer.
pub const MIN_OPTIONS: usize = 2;
/// Most options a question may offer.
pub const MAX_OPTIONS: usize = 6;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("question needs at least 2 options, got {0}")]
    TooFewOptions(usize),

    #[error("question allows at most 6 options, got {0}")]
    TooManyOptions(usize),

    #[error("option {0} has no text")]
    EmptyOptionText(usize),

    #[error("mark at least one correct option")]
    NoCorrectOption,

    #[error("single-select question has {0} correct options")]
    AmbiguousSingleSelect(usize),

    #[error("marks must be at least 1")]
    InvalidMarks,
}

//
// ─── TYPES ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleSelect,
    MultiSelect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: OptionId,
    pub text: String,
    pub is_correct: bool,
}

impl AnswerOption {
    #[must_use]
    pub fn new(id: OptionId, text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            id,
            text: text.into(),
            is_correct,
        }
    }
}

/// Unvalidated question as authored in the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub text: String,
    pub kind: QuestionKind,
    pub options: Vec<AnswerOption>,
    pub marks: u32,
    pub explanation: Option<String>,
}

impl QuestionDraft {
    /// Validate the draft into an immutable `Question`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if text, options, correct flags or marks are invalid.
    pub fn validate(self) -> Result<Question, QuestionError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if self.options.len() < MIN_OPTIONS {
            return Err(QuestionError::TooFewOptions(self.options.len()));
        }
        if self.options.len() > MAX_OPTIONS {
            return Err(QuestionError::TooManyOptions(self.options.len()));
        }
        if let Some(idx) = self.options.iter().position(|o| o.text.trim().is_empty()) {
            return Err(QuestionError::EmptyOptionText(idx));
        }

        let correct = self.options.iter().filter(|o| o.is_correct).count();
        if correct == 0 {
            return Err(QuestionError::NoCorrectOption);
        }
        if self.kind == QuestionKind::SingleSelect && correct > 1 {
            return Err(QuestionError::AmbiguousSingleSelect(correct));
        }
        if self.marks == 0 {
            return Err(QuestionError::InvalidMarks);
        }

        Ok(Question {
            id: self.id,
            text: text.to_owned(),
            kind: self.kind,
            options: self.options,
            marks: self.marks,
            explanation: self
                .explanation
                .map(|e| e.trim().to_owned())
                .filter(|e| !e.is_empty()),
        })
    }
}

/// A validated multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    kind: QuestionKind,
    options: Vec<AnswerOption>,
    marks: u32,
    explanation: Option<String>,
}

impl Question {
    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    #[must_use]
    pub fn marks(&self) -> u32 {
        self.marks
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    /// Indices of the options flagged correct, in ascending order.
    pub fn correct_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.options
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_correct)
            .map(|(i, _)| i)
    }

    /// Grades a selection against the option flags.
    ///
    /// Single-select compares the chosen index with the one correct option;
    /// multi-select requires the selected set to equal the correct set.
    #[must_use]
    pub fn is_correct(&self, selection: &AnswerSelection) -> bool {
        match (self.kind, selection) {
            (QuestionKind::SingleSelect, AnswerSelection::Single(index)) => self
                .options
                .get(*index)
                .is_some_and(|option| option.is_correct),
            (QuestionKind::MultiSelect, AnswerSelection::Multiple(selected)) => {
                selected.iter().copied().eq(self.correct_indices())
            }
            _ => false,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn options(correct: &[usize], count: usize) -> Vec<AnswerOption> {
        (0..count)
            .map(|i| AnswerOption::new(OptionId::new(i as u64), format!("o{i}"), correct.contains(&i)))
            .collect()
    }

    fn draft(kind: QuestionKind, correct: &[usize]) -> QuestionDraft {
        QuestionDraft {
            id: QuestionId::new(1),
            text: "  What is 2 + 2?  ".into(),
            kind,
            options: options(correct, 4),
            marks: 2,
            explanation: Some("   ".into()),
        }
    }

    #[test]
    fn validate_trims_text_and_drops_blank_explanation() {
        let q = draft(QuestionKind::SingleSelect, &[1]).validate().unwrap();
        assert_eq!(q.text(), "What is 2 + 2?");
        assert_eq!(q.explanation(), None);
        assert_eq!(q.marks(), 2);
    }

    #[test]
    fn option_count_is_bounded() {
        let mut d = draft(QuestionKind::SingleSelect, &[0]);
        d.options = options(&[0], 1);
        assert_eq!(d.clone().validate(), Err(QuestionError::TooFewOptions(1)));

        d.options = options(&[0], 7);
        assert_eq!(d.validate(), Err(QuestionError::TooManyOptions(7)));
    }

    #[test]
    fn correct_flags_are_checked() {
        assert_eq!(
            draft(QuestionKind::MultiSelect, &[]).validate(),
            Err(QuestionError::NoCorrectOption)
        );
        assert_eq!(
            draft(QuestionKind::SingleSelect, &[0, 2]).validate(),
            Err(QuestionError::AmbiguousSingleSelect(2))
        );
    }

    #[test]
    fn blank_option_and_zero_marks_are_rejected() {
        let mut d = draft(QuestionKind::SingleSelect, &[0]);
        d.options[2].text = " ".into();
        assert_eq!(d.validate(), Err(QuestionError::EmptyOptionText(2)));

        let mut d = draft(QuestionKind::SingleSelect, &[0]);
        d.marks = 0;
        assert_eq!(d.validate(), Err(QuestionError::InvalidMarks));
    }

    #[test]
    fn single_select_grading_uses_flag() {
        let q = draft(QuestionKind::SingleSelect, &[1]).validate().unwrap();
        assert!(q.is_correct(&AnswerSelection::Single(1)));
        assert!(!q.is_correct(&AnswerSelection::Single(0)));
        assert!(!q.is_correct(&AnswerSelection::Single(9)));
    }

    #[test]
    fn multi_select_grading_requires_exact_set() {
        let q = draft(QuestionKind::MultiSelect, &[0, 3]).validate().unwrap();
        assert!(q.is_correct(&AnswerSelection::multiple([3, 0])));
        assert!(!q.is_correct(&AnswerSelection::multiple([0])));
        assert!(!q.is_correct(&AnswerSelection::multiple([0, 1, 3])));
        assert!(!q.is_correct(&AnswerSelection::Single(0)));
    }
}
