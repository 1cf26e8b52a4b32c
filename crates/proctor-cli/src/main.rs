//! proctor CLI: drive exam sessions from answer scripts.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "proctor", version, about = "Exam session engine with autosave")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an answer script as a student and submit
    Take {
        /// Answer script (.toml)
        #[arg(long)]
        script: PathBuf,

        /// Exam to take (defaults to the script's exam_id)
        #[arg(long)]
        exam: Option<String>,

        /// Student id (defaults to the script's student_id)
        #[arg(long)]
        student: Option<String>,

        /// Flush answers but leave the attempt open
        #[arg(long)]
        no_submit: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the saved state of an open attempt
    Resume {
        /// Attempt id
        #[arg(long)]
        attempt: String,

        /// Submit the attempt after showing it
        #[arg(long)]
        submit: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate an answer script
    Validate {
        /// Path to the script
        #[arg(long)]
        script: PathBuf,
    },

    /// List supported question kinds and their answer shapes
    Kinds,

    /// Create a starter config and example answer script
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("proctor=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Take {
            script,
            exam,
            student,
            no_submit,
            config,
        } => commands::take::execute(script, exam, student, no_submit, config).await,
        Commands::Resume {
            attempt,
            submit,
            config,
        } => commands::resume::execute(attempt, submit, config).await,
        Commands::Validate { script } => commands::validate::execute(script),
        Commands::Kinds => commands::kinds::execute(),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
