//! The `proctor take` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use proctor_core::autosave::FlushOutcome;
use proctor_core::kinds;
use proctor_core::script::parse_script;
use proctor_core::session::SessionController;

use super::{answers_table, connect, format_duration};

pub async fn execute(
    script_path: PathBuf,
    exam: Option<String>,
    student: Option<String>,
    no_submit: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let script = parse_script(&script_path)?;
    let exam_id = exam
        .or_else(|| script.exam_id.clone())
        .context("no exam given: pass --exam or set exam_id in the script")?;
    let student_id = student
        .or_else(|| script.student_id.clone())
        .context("no student given: pass --student or set student_id in the script")?;

    let (config, gateway) = connect(config_path.as_deref())?;
    let mut session = SessionController::new(gateway, config.session_config());
    session
        .start(&exam_id, &student_id)
        .await
        .with_context(|| format!("could not start exam {exam_id} for {student_id}"))?;

    let attempt_id = session
        .attempt()
        .map(|a| a.id.clone())
        .unwrap_or_default();
    eprintln!(
        "Started attempt {attempt_id}: {} questions ({})",
        session.questions().len(),
        script.name
    );

    let mut applied = 0usize;
    let mut rejected = 0usize;
    for step in &script.steps {
        if session.is_expired() {
            eprintln!("  Time limit reached, skipping remaining answers");
            break;
        }

        let kind = session
            .questions()
            .iter()
            .find(|q| q.id == step.question_id)
            .map(|q| q.kind);
        let shape = kind.map(|k| kinds::spec_for(k).shape);
        let outcome = step
            .answer_value(shape)
            .and_then(|value| {
                session
                    .set_answer(&step.question_id, value)
                    .map_err(anyhow::Error::from)
            });
        match outcome {
            Ok(version) => {
                applied += 1;
                eprintln!("  {} <- v{version}", step.question_id);
            }
            Err(e) => {
                rejected += 1;
                eprintln!("  {} REJECTED: {e:#}", step.question_id);
            }
        }

        let pause = step.pause_ms.unwrap_or(script.default_pause_ms);
        if pause > 0 {
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }
    }

    println!("{}", answers_table(&session));
    println!(
        "{applied} answer(s) applied, {rejected} rejected, elapsed {}",
        format_duration(session.elapsed())
    );

    if no_submit {
        // A background flush may hold the slot; wait it out and flush the rest.
        let outcome = loop {
            match session.sync_now().await? {
                FlushOutcome::Skipped => {
                    if let Some(mut sync) = session.subscribe_sync() {
                        let _ = sync.wait_for(|s| !s.in_flight).await;
                    }
                }
                outcome => break outcome,
            }
        };
        if let FlushOutcome::Failed { error, .. } = outcome {
            anyhow::bail!("could not save answers for attempt {attempt_id}: {error}");
        }
        println!(
            "Attempt {attempt_id} left open; continue with `proctor resume --attempt {attempt_id}`"
        );
        return Ok(());
    }

    let completion = session
        .submit()
        .await
        .with_context(|| format!("submitting attempt {attempt_id}"))?;
    println!(
        "Submitted attempt {}: {}/{} answered at {}",
        completion.attempt_id,
        completion.answered,
        completion.total_questions,
        completion.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    Ok(())
}
