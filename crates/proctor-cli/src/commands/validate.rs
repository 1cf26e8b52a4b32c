//! The `proctor validate` command.

use std::path::PathBuf;

use anyhow::Result;

use proctor_core::script::{parse_script, validate_script};

pub fn execute(script_path: PathBuf) -> Result<()> {
    let script = parse_script(&script_path)?;
    println!("Script: {} ({} answers)", script.name, script.steps.len());
    if let Some(exam) = &script.exam_id {
        println!("  exam: {exam}");
    }

    let warnings = validate_script(&script);
    for w in &warnings {
        let prefix = w
            .question_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Script valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
