//! Grading of recorded answers against a test definition.

use std::collections::BTreeMap;

use crate::model::{AnswerSelection, QuestionOutcome, TestDefinition};

/// Outcome of grading every question of a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grading {
    pub outcomes: Vec<QuestionOutcome>,
    pub correct_count: u32,
    pub total_questions: u32,
    pub marks_awarded: u32,
    pub total_marks: u32,
    pub score: u32,
}

/// Grades `answers` (keyed by question index) against `test`.
///
/// Unanswered questions count as incorrect. Answers keyed past the last
/// question are ignored.
#[must_use]
pub fn grade(test: &TestDefinition, answers: &BTreeMap<usize, AnswerSelection>) -> Grading {
    let mut outcomes = Vec::with_capacity(test.question_count());
    let mut correct_count = 0_u32;
    let mut marks_awarded = 0_u32;

    for (index, question) in test.questions().iter().enumerate() {
        let selection = answers.get(&index).cloned();
        let correct = selection
            .as_ref()
            .is_some_and(|selection| question.is_correct(selection));
        let marks = if correct { question.marks() } else { 0 };
        if correct {
            correct_count = correct_count.saturating_add(1);
            marks_awarded = marks_awarded.saturating_add(marks);
        }

        outcomes.push(QuestionOutcome {
            question_id: question.id(),
            index,
            selection,
            correct,
            marks_awarded: marks,
        });
    }

    let total_questions = u32::try_from(test.question_count()).unwrap_or(u32::MAX);

    Grading {
        outcomes,
        correct_count,
        total_questions,
        marks_awarded,
        total_marks: test.total_marks(),
        score: percent_score(correct_count, total_questions),
    }
}

/// `round(100 * correct / total)` with halves rounded up; zero when `total` is zero.
#[must_use]
pub fn percent_score(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let correct = u64::from(correct.min(total));
    let total = u64::from(total);
    let rounded = (200 * correct + total) / (2 * total);
    u32::try_from(rounded).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AnswerOption, OptionId, QuestionDraft, QuestionId, QuestionKind, TestId, TestStatus,
    };

    fn single(id: u64, correct: usize) -> crate::model::Question {
        QuestionDraft {
            id: QuestionId::new(id),
            text: format!("Q{id}"),
            kind: QuestionKind::SingleSelect,
            options: (0..3)
                .map(|i| AnswerOption::new(OptionId::new(i as u64), format!("o{i}"), i == correct))
                .collect(),
            marks: 1,
            explanation: None,
        }
        .validate()
        .unwrap()
    }

    fn two_question_test() -> TestDefinition {
        TestDefinition::new(
            TestId::new(1),
            "Pair",
            Some(60),
            TestStatus::Live,
            vec![single(1, 1), single(2, 0)],
        )
        .unwrap()
    }

    #[test]
    fn all_correct_scores_100() {
        let answers = BTreeMap::from([
            (0, AnswerSelection::Single(1)),
            (1, AnswerSelection::Single(0)),
        ]);
        let grading = grade(&two_question_test(), &answers);
        assert_eq!(grading.score, 100);
        assert_eq!(grading.correct_count, 2);
        assert_eq!(grading.marks_awarded, 2);
    }

    #[test]
    fn half_correct_scores_50() {
        let answers = BTreeMap::from([
            (0, AnswerSelection::Single(0)),
            (1, AnswerSelection::Single(0)),
        ]);
        let grading = grade(&two_question_test(), &answers);
        assert_eq!(grading.score, 50);
        assert!(!grading.outcomes[0].correct);
        assert!(grading.outcomes[1].correct);
    }

    #[test]
    fn unanswered_questions_are_incorrect() {
        let grading = grade(&two_question_test(), &BTreeMap::new());
        assert_eq!(grading.score, 0);
        assert!(grading.outcomes.iter().all(|o| o.selection.is_none()));
        assert_eq!(grading.total_questions, 2);
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(percent_score(1, 3), 33);
        assert_eq!(percent_score(2, 3), 67);
        assert_eq!(percent_score(1, 8), 13);
        assert_eq!(percent_score(0, 0), 0);
    }
}
