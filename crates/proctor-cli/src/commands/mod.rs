pub mod init;
pub mod kinds;
pub mod resume;
pub mod take;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Cell, Table};

use proctor_core::model::AnswerValue;
use proctor_core::session::SessionController;
use proctor_core::traits::Gateway;
use proctor_gateway::{create_gateway, load_config_from, ProctorConfig};

/// Load config and build the gateway it names.
fn connect(config_path: Option<&Path>) -> Result<(ProctorConfig, Arc<dyn Gateway>)> {
    let config = load_config_from(config_path)?;
    tracing::debug!(gateway = ?config.gateway, "using gateway");
    let gateway: Arc<dyn Gateway> = Arc::from(create_gateway(&config.gateway)?);
    Ok((config, gateway))
}

/// One-line rendering of an answer for tables.
fn display_answer(value: &AnswerValue) -> String {
    let text = match value {
        AnswerValue::Empty => "-".to_string(),
        AnswerValue::Text(s) | AnswerValue::Choice(s) => s.clone(),
        AnswerValue::Choices(items) => items.join(", "),
        AnswerValue::Sequence(items) => items.join(" > "),
        AnswerValue::Number(n) => n.to_string(),
        AnswerValue::Boolean(b) => b.to_string(),
        AnswerValue::Mapping(pairs) => pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", "),
    };
    let text = text.replace('\n', " ");
    if text.chars().count() > 40 {
        let cut: String = text.chars().take(37).collect();
        format!("{cut}...")
    } else {
        text
    }
}

/// Table of every question with its local answer and sync state.
fn answers_table(session: &SessionController) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Kind", "Answer", "Sync"]);

    for (i, question) in session.questions().iter().enumerate() {
        let answer = session.answer(&question.id).unwrap_or_default();
        let sync = if session.is_dirty(&question.id) {
            "pending"
        } else if answer.is_empty() {
            ""
        } else {
            "saved"
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&question.id),
            Cell::new(question.kind),
            Cell::new(display_answer(&answer)),
            Cell::new(sync),
        ]);
    }
    table
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}
