use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tailor_agents::artifacts::{chapter_files, read_document, ArtifactStore, RunLayout};
use tailor_agents::config::TailorConfig;
use tailor_agents::context::RunContext;
use tailor_agents::errors::TailorError;
use tailor_agents::gateway::{LlmGateway, OpenAiGateway};
use tailor_agents::strategy::{run_eval, run_strategy, Strategy};

/// Personalize CS textbook chapters for a reader's interest.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Personalize one chapter with a strategy
    Run {
        /// The original textbook chapter to personalize
        #[arg(short, long)]
        chapter: PathBuf,

        /// Your personal/professional interest
        #[arg(short, long)]
        interest: String,

        /// Execution strategy
        #[arg(short, long, value_enum)]
        strategy: Strategy,
    },

    /// Compare and score two finished chapters
    Eval {
        /// First final draft (labelled A)
        #[arg(short = 'a', long)]
        first: PathBuf,

        /// Second final draft (labelled B)
        #[arg(short = 'b', long)]
        second: PathBuf,

        /// Your personal/professional interest
        #[arg(short, long)]
        interest: String,

        /// Reference chapter the drafts were personalized from
        #[arg(short, long)]
        reference: Option<PathBuf>,
    },

    /// Run a strategy over every chapter of a textbook, for every interest
    Batch {
        /// Textbook directory containing markdown chapters
        #[arg(short, long)]
        textbook: PathBuf,

        /// Interests to personalize for (repeatable)
        #[arg(short, long, required = true, num_args = 1..)]
        interest: Vec<String>,

        /// Execution strategy
        #[arg(short, long, value_enum)]
        strategy: Strategy,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal; credentials may come from the shell.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = TailorConfig::from_env();
    config.validate().map_err(TailorError::Configuration)?;
    info!(
        base_url = %config.endpoint.base_url,
        personalizer = %config.models.personalizer,
        judge = %config.models.judge,
        max_concurrency = config.generation.max_concurrency,
        "tailor starting"
    );

    let gateway: Arc<dyn LlmGateway> = Arc::new(OpenAiGateway::from_config(&config)?);

    match cli.command {
        Command::Run {
            chapter,
            interest,
            strategy,
        } => {
            run_chapter(&config, &gateway, &chapter, &interest, strategy).await?;
        }
        Command::Eval {
            first,
            second,
            interest,
            reference,
        } => {
            let reference_text = match reference {
                Some(path) => read_document(&path)?,
                None => String::new(),
            };
            let run_dir = RunLayout::for_eval(&config.eval_dir, Local::now());
            let ctx = RunContext::new(
                Arc::clone(&gateway),
                ArtifactStore::new(run_dir),
                reference_text,
                interest,
                config.generation.clone(),
            )?;
            run_eval(ctx, &first, &second).await?;
        }
        Command::Batch {
            textbook,
            interest,
            strategy,
        } => {
            let chapters = chapter_files(&textbook);
            if chapters.is_empty() {
                warn!(textbook = %textbook.display(), "No markdown chapters found");
            }
            info!(chapters = chapters.len(), interests = interest.len(), %strategy, "Batch starting");
            for chapter in &chapters {
                for topic in &interest {
                    run_chapter(&config, &gateway, chapter, topic, strategy)
                        .await
                        .with_context(|| {
                            format!("{strategy} failed on {} for {topic}", chapter.display())
                        })?;
                }
            }
            info!(runs = chapters.len() * interest.len(), "Batch completed");
        }
    }

    Ok(())
}

async fn run_chapter(
    config: &TailorConfig,
    gateway: &Arc<dyn LlmGateway>,
    chapter: &Path,
    interest: &str,
    strategy: Strategy,
) -> Result<()> {
    let reference_text = read_document(chapter)?;
    let run_dir = RunLayout::for_chapter(&config.output_dir, chapter, Local::now())?;
    let ctx = RunContext::new(
        Arc::clone(gateway),
        ArtifactStore::new(run_dir),
        reference_text,
        interest,
        config.generation.clone(),
    )?;
    let outcome = run_strategy(strategy, ctx, chapter).await?;
    info!(run_dir = %outcome.run_dir.display(), "Run finished");
    Ok(())
}
