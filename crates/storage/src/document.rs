//! JSON document shape for tests, including the legacy answer-key layouts.
//!
//! Older documents carry options as plain strings and mark the key with a
//! `correctAnswer` index or an `answers` index list. Newer documents flag each
//! option with `isCorrect`. Both load into the same `TestDefinition`.

use proctor_core::model::{
    AnswerOption, OptionId, Question, QuestionDraft, QuestionError, QuestionId, QuestionKind,
    TestDefinition, TestError, TestId, TestStatus,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DocumentError {
    #[error("invalid test document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("question {index}: unknown question type {kind:?}")]
    UnknownQuestionType { index: usize, kind: String },

    #[error("question {question}: answer index {index} is out of range")]
    AnswerIndexOutOfRange { question: usize, index: usize },

    #[error("question {index}: {source}")]
    Question {
        index: usize,
        #[source]
        source: QuestionError,
    },

    #[error(transparent)]
    Test(#[from] TestError),
}

/// Identifier as written by the authoring tools: numeric, or a free-form string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    Number(u64),
    Text(String),
}

impl DocumentId {
    fn numeric(&self) -> Option<u64> {
        match self {
            DocumentId::Number(n) => Some(*n),
            DocumentId::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionDocument {
    Text(String),
    Record(OptionRecord),
}

impl OptionDocument {
    fn text(&self) -> &str {
        match self {
            OptionDocument::Text(text) => text,
            OptionDocument::Record(record) => &record.text,
        }
    }

    fn flag(&self) -> Option<bool> {
        match self {
            OptionDocument::Text(_) => None,
            OptionDocument::Record(record) => record.is_correct,
        }
    }

    fn id(&self) -> Option<u64> {
        match self {
            OptionDocument::Text(_) => None,
            OptionDocument::Record(record) => record.id.as_ref().and_then(DocumentId::numeric),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    #[serde(alias = "text")]
    pub question_text: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub options: Vec<OptionDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(alias = "title")]
    pub test_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuestionDocument>,
}

impl TestDocument {
    /// Parses a document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Json` if the text is not a test document.
    pub fn from_json(raw: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serializes the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Json` if serialization fails.
    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Canonical document for a definition: numeric ids, declared types and
    /// per-option `isCorrect` flags.
    #[must_use]
    pub fn from_definition(test: &TestDefinition) -> Self {
        Self {
            id: Some(test.id().value()),
            test_title: test.title().to_owned(),
            time_limit: test.time_limit_secs(),
            status: Some(test.status().as_str().to_owned()),
            questions: test.questions().iter().map(question_document).collect(),
        }
    }

    /// Converts the document into a validated definition with the given id.
    ///
    /// A missing status loads as `Draft`.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError` if the status, a question type, an answer key
    /// or any question fails validation.
    pub fn into_definition(self, id: TestId) -> Result<TestDefinition, DocumentError> {
        let status = match self.status.as_deref() {
            Some(raw) => raw.trim().to_ascii_lowercase().parse::<TestStatus>()?,
            None => TestStatus::default(),
        };

        let questions = self
            .questions
            .into_iter()
            .enumerate()
            .map(|(index, question)| migrate_question(index, question))
            .collect::<Result<Vec<_>, _>>()?;

        let time_limit = self.time_limit.filter(|secs| *secs > 0);
        Ok(TestDefinition::new(
            id,
            self.test_title,
            time_limit,
            status,
            questions,
        )?)
    }
}

fn question_document(question: &Question) -> QuestionDocument {
    let kind = match question.kind() {
        QuestionKind::SingleSelect => "single",
        QuestionKind::MultiSelect => "multiple",
    };
    QuestionDocument {
        id: Some(DocumentId::Number(question.id().value())),
        question_text: question.text().to_owned(),
        kind: Some(kind.to_owned()),
        options: question
            .options()
            .iter()
            .map(|option| {
                OptionDocument::Record(OptionRecord {
                    id: Some(DocumentId::Number(option.id.value())),
                    text: option.text.clone(),
                    is_correct: Some(option.is_correct),
                })
            })
            .collect(),
        correct_answer: None,
        answers: None,
        marks: Some(question.marks()),
        explanation: question.explanation().map(str::to_owned),
    }
}

fn position_id(index: usize) -> u64 {
    u64::try_from(index).map_or(u64::MAX, |i| i.saturating_add(1))
}

fn migrate_question(index: usize, doc: QuestionDocument) -> Result<Question, DocumentError> {
    let declared_multiple = match doc.kind.as_deref().map(str::trim) {
        None | Some("") | Some("single") => false,
        Some("multiple") => true,
        Some(other) => {
            return Err(DocumentError::UnknownQuestionType {
                index,
                kind: other.to_owned(),
            });
        }
    };

    let option_count = doc.options.len();
    let explicit_flags = doc.options.iter().any(|o| o.flag().is_some());
    let flags: Vec<bool> = if explicit_flags {
        doc.options.iter().map(|o| o.flag().unwrap_or(false)).collect()
    } else {
        let key: Vec<usize> = match (&doc.answers, doc.correct_answer) {
            (Some(answers), _) => answers.clone(),
            (None, Some(correct)) => vec![correct],
            (None, None) => Vec::new(),
        };
        if let Some(bad) = key.iter().copied().find(|i| *i >= option_count) {
            return Err(DocumentError::AnswerIndexOutOfRange {
                question: index,
                index: bad,
            });
        }
        if !key.is_empty() {
            tracing::debug!(question = index, "migrating legacy answer key");
        }
        (0..option_count).map(|i| key.contains(&i)).collect()
    };

    let correct_count = flags.iter().filter(|f| **f).count();
    let kind = if declared_multiple || correct_count > 1 {
        QuestionKind::MultiSelect
    } else {
        QuestionKind::SingleSelect
    };

    let options = doc
        .options
        .iter()
        .zip(flags)
        .enumerate()
        .map(|(i, (option, is_correct))| {
            let id = option.id().unwrap_or_else(|| position_id(i));
            AnswerOption::new(OptionId::new(id), option.text(), is_correct)
        })
        .collect();

    let id = doc
        .id
        .as_ref()
        .and_then(DocumentId::numeric)
        .unwrap_or_else(|| position_id(index));

    QuestionDraft {
        id: QuestionId::new(id),
        text: doc.question_text,
        kind,
        options,
        marks: doc.marks.unwrap_or(1),
        explanation: doc.explanation,
    }
    .validate()
    .map_err(|source| DocumentError::Question { index, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_shape_uses_option_flags() {
        let raw = r#"{
            "testTitle": "Rust basics",
            "timeLimit": 900,
            "status": "live",
            "questions": [{
                "questionText": "Pick the borrow checker's friends",
                "type": "multiple",
                "options": [
                    {"id": "opt1", "text": "&T", "isCorrect": true, "media": null},
                    {"id": "opt2", "text": "&mut T", "isCorrect": true},
                    {"id": "opt3", "text": "*const T", "isCorrect": false}
                ],
                "marks": 2
            }]
        }"#;

        let test = TestDocument::from_json(raw)
            .unwrap()
            .into_definition(TestId::new(4))
            .unwrap();
        assert_eq!(test.status(), TestStatus::Live);
        assert_eq!(test.time_limit_secs(), Some(900));
        let question = &test.questions()[0];
        assert_eq!(question.kind(), QuestionKind::MultiSelect);
        assert_eq!(question.correct_indices().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(question.marks(), 2);
        assert_eq!(question.options()[2].id, OptionId::new(3));
    }

    #[test]
    fn legacy_correct_answer_becomes_single_select() {
        let raw = r#"{
            "title": "Legacy",
            "questions": [{
                "text": "2 + 2?",
                "options": ["3", "4", "5"],
                "correctAnswer": 1
            }]
        }"#;

        let test = TestDocument::from_json(raw)
            .unwrap()
            .into_definition(TestId::new(1))
            .unwrap();
        assert_eq!(test.status(), TestStatus::Draft);
        assert_eq!(test.time_limit_secs(), None);
        let question = &test.questions()[0];
        assert_eq!(question.kind(), QuestionKind::SingleSelect);
        assert_eq!(question.correct_indices().collect::<Vec<_>>(), vec![1]);
        assert_eq!(question.marks(), 1);
        assert_eq!(question.id(), QuestionId::new(1));
    }

    #[test]
    fn legacy_answers_list_infers_multiple() {
        let raw = r#"{
            "testTitle": "Legacy multi",
            "questions": [{
                "questionText": "Primes",
                "options": ["2", "4", "5"],
                "answers": [0, 2]
            }]
        }"#;

        let test = TestDocument::from_json(raw)
            .unwrap()
            .into_definition(TestId::new(1))
            .unwrap();
        assert_eq!(test.questions()[0].kind(), QuestionKind::MultiSelect);
    }

    #[test]
    fn explicit_flags_win_over_legacy_key() {
        let raw = r#"{
            "testTitle": "Mixed",
            "questions": [{
                "questionText": "Q",
                "options": [
                    {"text": "a", "isCorrect": false},
                    {"text": "b", "isCorrect": true}
                ],
                "correctAnswer": 0
            }]
        }"#;

        let test = TestDocument::from_json(raw)
            .unwrap()
            .into_definition(TestId::new(1))
            .unwrap();
        assert_eq!(
            test.questions()[0].correct_indices().collect::<Vec<_>>(),
            vec![1]
        );
    }

    #[test]
    fn rejects_bad_keys_and_types() {
        let out_of_range = r#"{"testTitle": "T", "questions": [
            {"questionText": "Q", "options": ["a", "b"], "correctAnswer": 5}
        ]}"#;
        assert!(matches!(
            TestDocument::from_json(out_of_range)
                .unwrap()
                .into_definition(TestId::new(1)),
            Err(DocumentError::AnswerIndexOutOfRange { question: 0, index: 5 })
        ));

        let bad_type = r#"{"testTitle": "T", "questions": [
            {"questionText": "Q", "type": "code", "options": ["a", "b"], "correctAnswer": 0}
        ]}"#;
        assert!(matches!(
            TestDocument::from_json(bad_type)
                .unwrap()
                .into_definition(TestId::new(1)),
            Err(DocumentError::UnknownQuestionType { .. })
        ));

        let no_key = r#"{"testTitle": "T", "questions": [
            {"questionText": "Q", "options": ["a", "b"]}
        ]}"#;
        assert!(matches!(
            TestDocument::from_json(no_key)
                .unwrap()
                .into_definition(TestId::new(1)),
            Err(DocumentError::Question {
                index: 0,
                source: QuestionError::NoCorrectOption
            })
        ));
    }

    #[test]
    fn canonical_document_reloads_to_same_definition() {
        let raw = r#"{"testTitle": "T", "timeLimit": 60, "status": "published", "questions": [
            {"questionText": "Q", "options": ["a", "b"], "correctAnswer": 1, "explanation": "b"}
        ]}"#;
        let test = TestDocument::from_json(raw)
            .unwrap()
            .into_definition(TestId::new(9))
            .unwrap();

        let doc = TestDocument::from_definition(&test);
        let json = doc.to_json().unwrap();
        let reloaded = TestDocument::from_json(&json)
            .unwrap()
            .into_definition(TestId::new(9))
            .unwrap();
        assert_eq!(reloaded, test);
    }
}
