//! The `proctor init` command.

use std::path::Path;

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    write_once(Path::new("proctor.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("scripts").context("failed to create scripts/")?;
    write_once(Path::new("scripts/example.toml"), EXAMPLE_SCRIPT)?;

    println!("\nNext steps:");
    println!("  1. Point [gateway] in proctor.toml at your exam service (or keep the mock)");
    println!("  2. Run: proctor validate --script scripts/example.toml");
    println!("  3. Run: proctor take --script scripts/example.toml");

    Ok(())
}

fn write_once(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# proctor configuration

# In-memory exam service with a six-question sample exam.
[gateway]
type = "mock"
exam_id = "demo"

# A real exam service:
# [gateway]
# type = "http"
# base_url = "https://exams.example.edu"
# api_token = "${PROCTOR_API_TOKEN}"
# timeout_secs = 15

[autosave]
debounce_ms = 3000
max_interval_ms = 30000
tick_ms = 250

# Overrides the exam's own limit.
# time_limit_secs = 3600
"#;

const EXAMPLE_SCRIPT: &str = r#"[script]
name = "Sample exam walkthrough"
exam_id = "demo"
student_id = "student-1"
default_pause_ms = 0

[[answers]]
question_id = "capital"
kind = "single_choice"
value = "lyon"

[[answers]]
question_id = "capital"
kind = "single_choice"
value = "paris"
pause_ms = 100

[[answers]]
question_id = "rivers"
kind = "multiple_choice"
value = ["loire", "seine"]

[[answers]]
question_id = "landlocked"
kind = "true_false"
value = false

[[answers]]
question_id = "population"
kind = "numeric"
value = 68.4

[[answers]]
question_id = "regions"
kind = "ordering"
value = ["north", "centre", "south"]

[[answers]]
question_id = "essay"
kind = "essay"
value = """
Oceanic in the west, continental in the east,
and Mediterranean along the southern coast.
"""
"#;
