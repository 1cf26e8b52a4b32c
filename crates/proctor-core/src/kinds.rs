//! Question-kind dispatch table.
//!
//! Each [`QuestionKind`] maps to exactly one [`KindSpec`]: the answer shape it
//! accepts and the normalizer applied before a value reaches the answer
//! store. All kind-specific handling goes through [`spec_for`].

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::{AnswerValue, QuestionKind};

/// The value shape a question kind accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerShape {
    Text,
    Choice,
    Choices,
    Boolean,
    Number,
    Sequence,
    Mapping,
}

impl AnswerShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerShape::Text => "text",
            AnswerShape::Choice => "choice",
            AnswerShape::Choices => "choices",
            AnswerShape::Boolean => "boolean",
            AnswerShape::Number => "number",
            AnswerShape::Sequence => "sequence",
            AnswerShape::Mapping => "mapping",
        }
    }
}

type Normalizer = fn(AnswerValue) -> Result<AnswerValue, String>;

/// Shape and normalizer for one question kind.
pub struct KindSpec {
    pub kind: QuestionKind,
    pub shape: AnswerShape,
    pub description: &'static str,
    normalize: Normalizer,
}

impl KindSpec {
    /// Validate `value` against this kind's shape and normalize it.
    ///
    /// `Empty` is accepted by every kind, and a value that normalizes to
    /// nothing becomes `Empty`.
    pub fn normalize(&self, value: AnswerValue) -> Result<AnswerValue, String> {
        if value == AnswerValue::Empty {
            return Ok(AnswerValue::Empty);
        }
        let normalized = (self.normalize)(value)?;
        if normalized.is_empty() {
            Ok(AnswerValue::Empty)
        } else {
            Ok(normalized)
        }
    }
}

/// One entry per kind, in `QuestionKind::ALL` order.
static KIND_TABLE: [KindSpec; 18] = [
    KindSpec {
        kind: QuestionKind::SingleChoice,
        shape: AnswerShape::Choice,
        description: "one option from a list",
        normalize: choice,
    },
    KindSpec {
        kind: QuestionKind::MultipleChoice,
        shape: AnswerShape::Choices,
        description: "any number of options from a list",
        normalize: choice_set,
    },
    KindSpec {
        kind: QuestionKind::TrueFalse,
        shape: AnswerShape::Boolean,
        description: "true or false",
        normalize: boolean,
    },
    KindSpec {
        kind: QuestionKind::Dropdown,
        shape: AnswerShape::Choice,
        description: "one option from a dropdown",
        normalize: choice,
    },
    KindSpec {
        kind: QuestionKind::ShortAnswer,
        shape: AnswerShape::Text,
        description: "a short free-text response",
        normalize: trimmed_text,
    },
    KindSpec {
        kind: QuestionKind::Essay,
        shape: AnswerShape::Text,
        description: "long-form free text",
        normalize: verbatim_text,
    },
    KindSpec {
        kind: QuestionKind::FillInBlank,
        shape: AnswerShape::Text,
        description: "a single missing word or phrase",
        normalize: trimmed_text,
    },
    KindSpec {
        kind: QuestionKind::Cloze,
        shape: AnswerShape::Mapping,
        description: "several blanks keyed by blank id",
        normalize: mapping,
    },
    KindSpec {
        kind: QuestionKind::Numeric,
        shape: AnswerShape::Number,
        description: "a finite number",
        normalize: number,
    },
    KindSpec {
        kind: QuestionKind::Formula,
        shape: AnswerShape::Text,
        description: "a mathematical expression",
        normalize: trimmed_text,
    },
    KindSpec {
        kind: QuestionKind::Code,
        shape: AnswerShape::Text,
        description: "source code, whitespace preserved",
        normalize: verbatim_text,
    },
    KindSpec {
        kind: QuestionKind::Matching,
        shape: AnswerShape::Mapping,
        description: "left item id to right item id",
        normalize: mapping,
    },
    KindSpec {
        kind: QuestionKind::Matrix,
        shape: AnswerShape::Mapping,
        description: "row id to selected column id",
        normalize: mapping,
    },
    KindSpec {
        kind: QuestionKind::Ordering,
        shape: AnswerShape::Sequence,
        description: "items arranged in order",
        normalize: sequence,
    },
    KindSpec {
        kind: QuestionKind::DragAndDrop,
        shape: AnswerShape::Mapping,
        description: "draggable item id to drop zone id",
        normalize: mapping,
    },
    KindSpec {
        kind: QuestionKind::Hotspot,
        shape: AnswerShape::Choices,
        description: "selected regions of an image",
        normalize: choice_set,
    },
    KindSpec {
        kind: QuestionKind::Likert,
        shape: AnswerShape::Choice,
        description: "one point on a rating scale",
        normalize: choice,
    },
    KindSpec {
        kind: QuestionKind::FileUpload,
        shape: AnswerShape::Text,
        description: "reference to an uploaded file",
        normalize: trimmed_text,
    },
];

/// Look up the spec for a question kind.
pub fn spec_for(kind: QuestionKind) -> &'static KindSpec {
    &KIND_TABLE[kind as usize]
}

/// All kind specs in declaration order.
pub fn all_specs() -> &'static [KindSpec] {
    &KIND_TABLE
}

/// Validate and normalize `value` for a question of `kind`.
pub fn normalize(kind: QuestionKind, value: AnswerValue) -> Result<AnswerValue, String> {
    spec_for(kind).normalize(value)
}

fn mismatch(expected: &str, got: &AnswerValue) -> String {
    format!("expected {expected}, got {}", got.type_name())
}

fn trimmed_text(value: AnswerValue) -> Result<AnswerValue, String> {
    match value {
        AnswerValue::Text(s) => Ok(AnswerValue::Text(s.trim().to_string())),
        other => Err(mismatch("text", &other)),
    }
}

fn verbatim_text(value: AnswerValue) -> Result<AnswerValue, String> {
    match value {
        AnswerValue::Text(s) if s.trim().is_empty() => Ok(AnswerValue::Empty),
        AnswerValue::Text(s) => Ok(AnswerValue::Text(s)),
        other => Err(mismatch("text", &other)),
    }
}

fn choice(value: AnswerValue) -> Result<AnswerValue, String> {
    match value {
        AnswerValue::Choice(s) | AnswerValue::Text(s) => Ok(AnswerValue::Choice(s.trim().to_string())),
        other => Err(mismatch("one choice", &other)),
    }
}

fn choice_set(value: AnswerValue) -> Result<AnswerValue, String> {
    let items = match value {
        AnswerValue::Choices(items) => items,
        AnswerValue::Choice(s) | AnswerValue::Text(s) => vec![s],
        other => return Err(mismatch("choices", &other)),
    };
    let set: BTreeSet<String> = items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    Ok(AnswerValue::Choices(set.into_iter().collect()))
}

fn boolean(value: AnswerValue) -> Result<AnswerValue, String> {
    match value {
        AnswerValue::Boolean(b) => Ok(AnswerValue::Boolean(b)),
        AnswerValue::Text(s) | AnswerValue::Choice(s) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "yes" => Ok(AnswerValue::Boolean(true)),
            "false" | "f" | "no" => Ok(AnswerValue::Boolean(false)),
            other => Err(format!("expected true or false, got '{other}'")),
        },
        other => Err(mismatch("boolean", &other)),
    }
}

fn number(value: AnswerValue) -> Result<AnswerValue, String> {
    let n = match value {
        AnswerValue::Number(n) => n,
        AnswerValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("expected a number, got '{}'", s.trim()))?,
        other => return Err(mismatch("number", &other)),
    };
    if n.is_finite() {
        Ok(AnswerValue::Number(n))
    } else {
        Err("number must be finite".to_string())
    }
}

fn sequence(value: AnswerValue) -> Result<AnswerValue, String> {
    match value {
        AnswerValue::Sequence(items) => {
            let mut seen = BTreeSet::new();
            for item in &items {
                if !seen.insert(item.as_str()) {
                    return Err(format!("item '{item}' appears more than once"));
                }
            }
            Ok(AnswerValue::Sequence(items))
        }
        other => Err(mismatch("sequence", &other)),
    }
}

fn mapping(value: AnswerValue) -> Result<AnswerValue, String> {
    match value {
        AnswerValue::Mapping(entries) => {
            let mut cleaned = BTreeMap::new();
            for (key, value) in entries {
                let (key, value) = (key.trim(), value.trim());
                if key.is_empty() || value.is_empty() {
                    continue;
                }
                if cleaned.insert(key.to_string(), value.to_string()).is_some() {
                    return Err(format!("key '{key}' appears more than once"));
                }
            }
            Ok(AnswerValue::Mapping(cleaned))
        }
        other => Err(mismatch("mapping", &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_kind() {
        for (i, kind) in QuestionKind::ALL.iter().enumerate() {
            assert_eq!(all_specs()[i].kind, *kind);
            assert_eq!(spec_for(*kind).kind, *kind);
        }
    }

    #[test]
    fn empty_accepted_everywhere() {
        for kind in QuestionKind::ALL {
            assert_eq!(normalize(kind, AnswerValue::Empty).unwrap(), AnswerValue::Empty);
        }
    }

    #[test]
    fn multiple_choice_dedupes_and_sorts() {
        let value = AnswerValue::Choices(vec!["c".into(), " a".into(), "c".into()]);
        assert_eq!(
            normalize(QuestionKind::MultipleChoice, value).unwrap(),
            AnswerValue::Choices(vec!["a".into(), "c".into()])
        );
    }

    #[test]
    fn text_coerces_into_choice_and_boolean() {
        assert_eq!(
            normalize(QuestionKind::SingleChoice, "b".into()).unwrap(),
            AnswerValue::Choice("b".into())
        );
        assert_eq!(
            normalize(QuestionKind::TrueFalse, "Yes".into()).unwrap(),
            AnswerValue::Boolean(true)
        );
        assert!(normalize(QuestionKind::TrueFalse, "maybe".into()).is_err());
    }

    #[test]
    fn numeric_parses_text_and_rejects_nan() {
        assert_eq!(
            normalize(QuestionKind::Numeric, " 3.5 ".into()).unwrap(),
            AnswerValue::Number(3.5)
        );
        assert!(normalize(QuestionKind::Numeric, AnswerValue::Number(f64::NAN)).is_err());
        assert!(normalize(QuestionKind::Numeric, AnswerValue::Boolean(true)).is_err());
    }

    #[test]
    fn code_keeps_whitespace_short_answer_trims() {
        let src = "fn main() {\n    println!();\n}\n";
        assert_eq!(
            normalize(QuestionKind::Code, src.into()).unwrap(),
            AnswerValue::Text(src.into())
        );
        assert_eq!(
            normalize(QuestionKind::ShortAnswer, "  Paris ".into()).unwrap(),
            AnswerValue::Text("Paris".into())
        );
        assert_eq!(
            normalize(QuestionKind::ShortAnswer, "   ".into()).unwrap(),
            AnswerValue::Empty
        );
    }

    #[test]
    fn ordering_rejects_duplicates() {
        let value = AnswerValue::Sequence(vec!["x".into(), "y".into(), "x".into()]);
        let err = normalize(QuestionKind::Ordering, value).unwrap_err();
        assert!(err.contains("more than once"));
    }

    #[test]
    fn mapping_drops_blank_entries() {
        let mut entries = BTreeMap::new();
        entries.insert("blank1".to_string(), " cat ".to_string());
        entries.insert("blank2".to_string(), "".to_string());
        let normalized = normalize(QuestionKind::Cloze, AnswerValue::Mapping(entries)).unwrap();
        let AnswerValue::Mapping(m) = normalized else {
            panic!("expected mapping");
        };
        assert_eq!(m.len(), 1);
        assert_eq!(m["blank1"], "cat");
    }

    #[test]
    fn mapping_rejects_keys_equal_after_trimming() {
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), "1".to_string());
        entries.insert(" a".to_string(), "2".to_string());
        let err = normalize(QuestionKind::Matching, AnswerValue::Mapping(entries)).unwrap_err();
        assert_eq!(err, "key 'a' appears more than once");
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let err = normalize(QuestionKind::Matching, "a-1".into()).unwrap_err();
        assert_eq!(err, "expected mapping, got text");
    }
}
