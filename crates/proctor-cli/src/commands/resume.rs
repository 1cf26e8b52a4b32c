//! The `proctor resume` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use proctor_core::session::SessionController;

use super::{answers_table, connect, format_duration};

pub async fn execute(attempt_id: String, submit: bool, config_path: Option<PathBuf>) -> Result<()> {
    let (config, gateway) = connect(config_path.as_deref())?;
    let mut session = SessionController::new(gateway, config.session_config());
    session
        .resume(&attempt_id)
        .await
        .with_context(|| format!("could not resume attempt {attempt_id}"))?;

    if let Some(attempt) = session.attempt() {
        println!(
            "Attempt {} ({} / {}), started {}",
            attempt.id,
            attempt.exam_id,
            attempt.student_id,
            attempt.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!("{}", answers_table(&session));

    let snapshot = session.snapshot();
    let remaining = snapshot
        .remaining_secs
        .map(|secs| format_duration(std::time::Duration::from_secs(secs)))
        .unwrap_or_else(|| "no limit".to_string());
    println!(
        "{}/{} answered, elapsed {}, remaining {remaining}",
        snapshot.answered,
        snapshot.total_questions,
        format_duration(session.elapsed()),
    );
    if session.is_expired() {
        println!("Time limit has passed.");
    }

    if submit {
        let completion = session
            .submit()
            .await
            .with_context(|| format!("submitting attempt {attempt_id}"))?;
        println!(
            "Submitted attempt {}: {}/{} answered",
            completion.attempt_id, completion.answered, completion.total_questions
        );
    }

    Ok(())
}
