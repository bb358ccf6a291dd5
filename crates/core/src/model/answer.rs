use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::question::{Question, QuestionKind};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors raised when a selection does not fit the question it answers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("option index {index} is out of range (question has {options} options)")]
    OptionOutOfRange { index: usize, options: usize },

    #[error("a single-select question needs exactly one option")]
    ExpectedSingle,

    #[error("a multi-select question needs a set of options")]
    ExpectedMultiple,

    #[error("selection must include at least one option")]
    EmptySelection,
}

//
// ─── SELECTION ────────────────────────────────────────────────────────────────
//

/// Options chosen by the candidate for one question, by option index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "options")]
pub enum AnswerSelection {
    Single(usize),
    Multiple(BTreeSet<usize>),
}

impl AnswerSelection {
    /// Builds a multi-select answer from any iterator of option indices.
    #[must_use]
    pub fn multiple(indices: impl IntoIterator<Item = usize>) -> Self {
        Self::Multiple(indices.into_iter().collect())
    }

    /// Checks that this selection is well-formed for `question`.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` if the selection shape does not match the question
    /// kind, is empty, or references an option that does not exist.
    pub fn validate_for(&self, question: &Question) -> Result<(), AnswerError> {
        let options = question.options().len();
        let check = |index: usize| {
            if index < options {
                Ok(())
            } else {
                Err(AnswerError::OptionOutOfRange { index, options })
            }
        };

        match (question.kind(), self) {
            (QuestionKind::SingleSelect, AnswerSelection::Single(index)) => check(*index),
            (QuestionKind::SingleSelect, AnswerSelection::Multiple(_)) => {
                Err(AnswerError::ExpectedSingle)
            }
            (QuestionKind::MultiSelect, AnswerSelection::Single(_)) => {
                Err(AnswerError::ExpectedMultiple)
            }
            (QuestionKind::MultiSelect, AnswerSelection::Multiple(set)) => {
                if set.is_empty() {
                    return Err(AnswerError::EmptySelection);
                }
                set.iter().try_for_each(|index| check(*index))
            }
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::question::{AnswerOption, QuestionDraft};
    use crate::model::{OptionId, QuestionId};

    fn question(kind: QuestionKind, correct: &[usize]) -> Question {
        let options = (0..3)
            .map(|i| {
                AnswerOption::new(OptionId::new(i as u64), format!("opt {i}"), correct.contains(&i))
            })
            .collect();
        QuestionDraft {
            id: QuestionId::new(1),
            text: "Pick".into(),
            kind,
            options,
            marks: 1,
            explanation: None,
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn single_selection_must_be_in_range() {
        let q = question(QuestionKind::SingleSelect, &[0]);
        assert!(AnswerSelection::Single(2).validate_for(&q).is_ok());
        assert_eq!(
            AnswerSelection::Single(3).validate_for(&q).unwrap_err(),
            AnswerError::OptionOutOfRange {
                index: 3,
                options: 3
            }
        );
    }

    #[test]
    fn selection_shape_must_match_kind() {
        let single = question(QuestionKind::SingleSelect, &[0]);
        let multi = question(QuestionKind::MultiSelect, &[0, 1]);

        assert_eq!(
            AnswerSelection::multiple([0]).validate_for(&single),
            Err(AnswerError::ExpectedSingle)
        );
        assert_eq!(
            AnswerSelection::Single(0).validate_for(&multi),
            Err(AnswerError::ExpectedMultiple)
        );
        assert_eq!(
            AnswerSelection::multiple([]).validate_for(&multi),
            Err(AnswerError::EmptySelection)
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_string(&AnswerSelection::multiple([2, 0])).unwrap();
        assert_eq!(json, r#"{"kind":"multiple","options":[0,2]}"#);
    }
}
