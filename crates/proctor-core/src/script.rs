//! TOML answer-script parser.
//!
//! An answer script is a recorded sequence of edits that can be replayed
//! against a live session, e.g. for smoke-testing a deployment or
//! reproducing a sync bug. Loads scripts from TOML and validates them.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::kinds::{self, AnswerShape};
use crate::model::{AnswerValue, QuestionKind};

/// A parsed answer script.
#[derive(Debug, Clone)]
pub struct AnswerScript {
    pub name: String,
    /// Exam to start when none is given on the command line.
    pub exam_id: Option<String>,
    /// Student to start as when none is given on the command line.
    pub student_id: Option<String>,
    /// Delay applied after each step without its own `pause_ms`.
    pub default_pause_ms: u64,
    pub steps: Vec<ScriptStep>,
}

/// One edit in a script.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub question_id: String,
    /// Declared kind, used for offline validation only; the live session
    /// always uses the kind the gateway reports.
    pub kind: Option<QuestionKind>,
    pub value: toml::Value,
    pub pause_ms: Option<u64>,
}

impl ScriptStep {
    /// Convert the raw TOML value into an answer of the given shape.
    ///
    /// Without a shape, arrays become `Choices`. An empty string clears the
    /// answer.
    pub fn answer_value(&self, shape: Option<AnswerShape>) -> Result<AnswerValue> {
        toml_to_answer(&self.value, shape)
            .with_context(|| format!("bad value for question {}", self.question_id))
    }
}

#[derive(Debug, Deserialize)]
struct TomlScriptFile {
    script: TomlScriptHeader,
    #[serde(default)]
    answers: Vec<TomlStep>,
}

#[derive(Debug, Deserialize)]
struct TomlScriptHeader {
    name: String,
    #[serde(default)]
    exam_id: Option<String>,
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    default_pause_ms: u64,
}

#[derive(Debug, Deserialize)]
struct TomlStep {
    question_id: String,
    #[serde(default)]
    kind: Option<String>,
    value: toml::Value,
    #[serde(default)]
    pause_ms: Option<u64>,
}

/// Parse a script file.
pub fn parse_script(path: &Path) -> Result<AnswerScript> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read answer script: {}", path.display()))?;

    parse_script_str(&content, path)
}

/// Parse a TOML string into an `AnswerScript` (useful for testing).
pub fn parse_script_str(content: &str, source_path: &Path) -> Result<AnswerScript> {
    let parsed: TomlScriptFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let steps = parsed
        .answers
        .into_iter()
        .map(|s| {
            let kind = s
                .kind
                .map(|k| k.parse().map_err(|e: String| anyhow::anyhow!("{}", e)))
                .transpose()?;
            Ok(ScriptStep {
                question_id: s.question_id,
                kind,
                value: s.value,
                pause_ms: s.pause_ms,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(AnswerScript {
        name: parsed.script.name,
        exam_id: parsed.script.exam_id,
        student_id: parsed.script.student_id,
        default_pause_ms: parsed.script.default_pause_ms,
        steps,
    })
}

fn toml_to_answer(value: &toml::Value, shape: Option<AnswerShape>) -> Result<AnswerValue> {
    let answer = match value {
        toml::Value::String(s) if s.is_empty() => AnswerValue::Empty,
        toml::Value::String(s) => match shape {
            Some(AnswerShape::Choice) => AnswerValue::Choice(s.clone()),
            _ => AnswerValue::Text(s.clone()),
        },
        toml::Value::Integer(i) => AnswerValue::Number(*i as f64),
        toml::Value::Float(f) => AnswerValue::Number(*f),
        toml::Value::Boolean(b) => AnswerValue::Boolean(*b),
        toml::Value::Array(items) => {
            let items = items
                .iter()
                .map(scalar_to_string)
                .collect::<Result<Vec<_>>>()?;
            match shape {
                Some(AnswerShape::Sequence) => AnswerValue::Sequence(items),
                _ => AnswerValue::Choices(items),
            }
        }
        toml::Value::Table(table) => {
            let entries = table
                .iter()
                .map(|(k, v)| Ok((k.clone(), scalar_to_string(v)?)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            AnswerValue::Mapping(entries)
        }
        toml::Value::Datetime(dt) => AnswerValue::Text(dt.to_string()),
    };
    Ok(answer)
}

fn scalar_to_string(value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        other => anyhow::bail!("expected a scalar, got {}", other.type_str()),
    }
}

/// A warning from script validation.
#[derive(Debug, Clone)]
pub struct ScriptWarning {
    /// The question the warning is about (if applicable).
    pub question_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a script for common issues.
pub fn validate_script(script: &AnswerScript) -> Vec<ScriptWarning> {
    let mut warnings = Vec::new();

    if script.steps.is_empty() {
        warnings.push(ScriptWarning {
            question_id: None,
            message: "script has no answers".into(),
        });
    }

    for step in &script.steps {
        if step.question_id.trim().is_empty() {
            warnings.push(ScriptWarning {
                question_id: None,
                message: "answer with an empty question_id".into(),
            });
            continue;
        }

        let Some(kind) = step.kind else {
            continue;
        };
        let result = step
            .answer_value(Some(kinds::spec_for(kind).shape))
            .and_then(|v| kinds::normalize(kind, v).map_err(|e| anyhow::anyhow!(e)));
        if let Err(e) = result {
            warnings.push(ScriptWarning {
                question_id: Some(step.question_id.clone()),
                message: format!("value does not fit {kind}: {e:#}"),
            });
        }
    }

    let untyped = script.steps.iter().filter(|s| s.kind.is_none()).count();
    if untyped > 0 {
        warnings.push(ScriptWarning {
            question_id: None,
            message: format!("{untyped} answer(s) have no kind and were not checked"),
        });
    }

    warnings
}
