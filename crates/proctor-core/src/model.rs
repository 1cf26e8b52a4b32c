//! Core data model types for proctor.
//!
//! These are the types shared by the session engine and every gateway:
//! attempts, questions, and the answer values a student produces.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One student's instance of taking one exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Identifier assigned by the gateway when the attempt starts.
    pub id: String,
    /// The exam being taken.
    pub exam_id: String,
    /// The student taking it.
    pub student_id: String,
    /// When the gateway created the attempt.
    pub started_at: DateTime<Utc>,
    /// Remote lifecycle status.
    #[serde(default)]
    pub status: AttemptStatus,
    /// Question ids in presentation order.
    pub question_ids: Vec<String>,
    /// Optional time limit in seconds.
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
}

/// Remote lifecycle status of an attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    #[default]
    InProgress,
    Completed,
    Abandoned,
}

/// A single exam item. Immutable for the lifetime of an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub kind: QuestionKind,
    /// Ordinal position within the exam.
    pub position: u32,
    /// Marks awarded for a fully correct answer.
    #[serde(default)]
    pub marks: f64,
    /// Kind-specific rendering data (options, blanks, grid labels, ...).
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// The closed set of question kinds the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    Dropdown,
    ShortAnswer,
    Essay,
    FillInBlank,
    Cloze,
    Numeric,
    Formula,
    Code,
    Matching,
    Matrix,
    Ordering,
    DragAndDrop,
    Hotspot,
    Likert,
    FileUpload,
}

impl QuestionKind {
    /// Every kind, in declaration order.
    pub const ALL: [QuestionKind; 18] = [
        QuestionKind::SingleChoice,
        QuestionKind::MultipleChoice,
        QuestionKind::TrueFalse,
        QuestionKind::Dropdown,
        QuestionKind::ShortAnswer,
        QuestionKind::Essay,
        QuestionKind::FillInBlank,
        QuestionKind::Cloze,
        QuestionKind::Numeric,
        QuestionKind::Formula,
        QuestionKind::Code,
        QuestionKind::Matching,
        QuestionKind::Matrix,
        QuestionKind::Ordering,
        QuestionKind::DragAndDrop,
        QuestionKind::Hotspot,
        QuestionKind::Likert,
        QuestionKind::FileUpload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::SingleChoice => "single_choice",
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::TrueFalse => "true_false",
            QuestionKind::Dropdown => "dropdown",
            QuestionKind::ShortAnswer => "short_answer",
            QuestionKind::Essay => "essay",
            QuestionKind::FillInBlank => "fill_in_blank",
            QuestionKind::Cloze => "cloze",
            QuestionKind::Numeric => "numeric",
            QuestionKind::Formula => "formula",
            QuestionKind::Code => "code",
            QuestionKind::Matching => "matching",
            QuestionKind::Matrix => "matrix",
            QuestionKind::Ordering => "ordering",
            QuestionKind::DragAndDrop => "drag_and_drop",
            QuestionKind::Hotspot => "hotspot",
            QuestionKind::Likert => "likert",
            QuestionKind::FileUpload => "file_upload",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "mcq" | "single" => Ok(QuestionKind::SingleChoice),
            "multi" | "multiple" => Ok(QuestionKind::MultipleChoice),
            "boolean" | "tf" => Ok(QuestionKind::TrueFalse),
            "long_answer" => Ok(QuestionKind::Essay),
            other => QuestionKind::ALL
                .iter()
                .copied()
                .find(|k| k.as_str() == other)
                .ok_or_else(|| format!("unknown question kind: {s}")),
        }
    }
}

/// A student's response value. The valid variant depends on the question
/// kind; see [`crate::kinds`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    /// No answer given (or cleared).
    #[default]
    Empty,
    /// Free text.
    Text(String),
    /// One selected option id.
    Choice(String),
    /// Several selected option ids.
    Choices(Vec<String>),
    /// A numeric response.
    Number(f64),
    /// A true/false response.
    Boolean(bool),
    /// An ordered list of item ids.
    Sequence(Vec<String>),
    /// Key → value pairs (matching pairs, blanks, grid cells, drop zones).
    Mapping(BTreeMap<String, String>),
}

impl AnswerValue {
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Empty => true,
            AnswerValue::Text(s) | AnswerValue::Choice(s) => s.is_empty(),
            AnswerValue::Choices(v) | AnswerValue::Sequence(v) => v.is_empty(),
            AnswerValue::Mapping(m) => m.is_empty(),
            AnswerValue::Number(_) | AnswerValue::Boolean(_) => false,
        }
    }

    /// Short variant name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            AnswerValue::Empty => "empty",
            AnswerValue::Text(_) => "text",
            AnswerValue::Choice(_) => "choice",
            AnswerValue::Choices(_) => "choices",
            AnswerValue::Number(_) => "number",
            AnswerValue::Boolean(_) => "boolean",
            AnswerValue::Sequence(_) => "sequence",
            AnswerValue::Mapping(_) => "mapping",
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(s: &str) -> Self {
        AnswerValue::Text(s.to_string())
    }
}

/// The student's current response to one question, with sync bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub question_id: String,
    pub value: AnswerValue,
    /// Set by every local edit; cleared only after a confirmed remote write
    /// (or when drained for a write that is still in flight).
    pub dirty: bool,
    /// Edit counter value of the latest local edit.
    pub version: u64,
    /// Highest version the gateway has acknowledged.
    pub synced_version: u64,
}

impl Answer {
    pub fn empty(question_id: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            value: AnswerValue::Empty,
            dirty: false,
            version: 0,
            synced_version: 0,
        }
    }
}

/// An answer value the gateway already holds for an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedAnswer {
    pub question_id: String,
    pub value: AnswerValue,
    #[serde(default)]
    pub version: u64,
}
