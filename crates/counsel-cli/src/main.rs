use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use counsel_core::composer::DraftCache;
use counsel_core::conversation::Role;
use counsel_core::{
    ConversationOrchestrator, ConversationStatus, CounselConfig, IntakeProfile, LengthController,
    ReportComposer, RunRecordStore, SchoolCandidate, SectionKind, TranscriptJournal,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod provider;
mod render;

/// Counsel - admissions counselling reports from a simulated advisory conversation
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the conversation and compose a report
    Run {
        /// Intake file (JSON) with the family profile and candidate schools
        #[arg(long, value_name = "FILE")]
        intake: PathBuf,

        /// Write the document model as JSON
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Write a Markdown rendering
        #[arg(long, value_name = "FILE")]
        markdown: Option<PathBuf>,

        /// Page target, overriding the configuration
        #[arg(long)]
        pages: Option<f64>,
    },

    /// Rank candidate schools
    Rank {
        /// JSON array of schools
        #[arg(long, value_name = "FILE")]
        schools: PathBuf,

        /// Output in JSON format for integrations
        #[arg(long)]
        json: bool,
    },

    /// Show the per-section character budget for a page target
    Budget {
        #[arg(long, default_value = "15")]
        pages: f64,
    },

    /// Run the quality gate over a text file
    Check {
        file: PathBuf,

        /// Print the repaired text
        #[arg(long)]
        fix: bool,
    },
}

/// Contents of an intake file
#[derive(Debug, Deserialize)]
struct RunInput {
    #[serde(default)]
    profile: IntakeProfile,
    schools: Vec<SchoolCandidate>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    dotenvy::dotenv().ok();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            intake,
            out,
            markdown,
            pages,
        } => {
            let input: RunInput = read_json(&intake)?;
            let pages = pages.unwrap_or(config.composer.target_pages);
            run_report(&config, input, pages, out.as_deref(), markdown.as_deref()).await?;
        }
        Commands::Rank { schools, json } => {
            let schools: Vec<SchoolCandidate> = read_json(&schools)?;
            let results = counsel_core::scoring::rank(&schools)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for result in &results {
                    println!(
                        "{:>2}. {:<36} {:>5.1}%",
                        result.rank, result.school.name, result.match_percentage
                    );
                    println!("    {}", result.rationale);
                }
            }
        }
        Commands::Budget { pages } => {
            let lengths = LengthController::new(config.layout.clone());
            let specs = lengths.allocate(
                pages,
                &SectionKind::names(),
                config.composer.section_weights.as_ref(),
            )?;
            println!("{:.1} pages ≈ {:.0} characters", pages, lengths.total_chars(pages));
            for spec in specs {
                println!(
                    "{}. {:<42} {:>6} ({}-{})",
                    spec.order + 1,
                    spec.name,
                    spec.target_chars,
                    spec.min_chars,
                    spec.max_chars
                );
            }
        }
        Commands::Check { file, fix } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let gate = counsel_core::QualityGate::new(&config.quality);
            let report = gate.validate(&text);
            if fix {
                println!("{}", report.clean_text);
            } else {
                println!("Score: {}", report.score);
                for kind in &report.violations {
                    let note = if report.outstanding.contains(kind) { "" } else { " (repaired)" };
                    println!("  {}{}", kind, note);
                }
                for token in &report.placeholders {
                    println!("  placeholder: {}", token);
                }
                if report.verification_notes > 0 {
                    println!("  verification notes: {}", report.verification_notes);
                }
                if !report.passed() {
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<CounselConfig> {
    match path {
        Some(path) => CounselConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(CounselConfig::default()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn run_report(
    config: &CounselConfig,
    input: RunInput,
    pages: f64,
    out: Option<&Path>,
    markdown: Option<&Path>,
) -> Result<()> {
    let generator = Arc::new(provider::OpenAICompatibleGenerator::from_env()?);
    info!("Using model {}", generator.model());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            ctrl_c.cancel();
        }
    });

    // Conversation
    let journal = TranscriptJournal::new(&config.storage.transcript_path);
    let mut orchestrator =
        ConversationOrchestrator::new(generator.clone(), input.profile.clone(), config)
            .with_journal(journal);

    loop {
        match orchestrator.run(&cancel).await? {
            ConversationStatus::AwaitingUser => {
                let question = orchestrator
                    .state()
                    .unresolved()
                    .next()
                    .map(|g| g.topic.clone())
                    .unwrap_or_default();
                println!("The admissions officer is still waiting on: {}", question);
                println!("Answer as the parent (empty line to stop):");
                let answer = read_line().await?;
                if answer.trim().is_empty() {
                    orchestrator.abort("operator declined to answer");
                    anyhow::bail!("Conversation aborted before completion");
                }
                orchestrator.provide_answer(Role::Parent, &answer).await?;
            }
            ConversationStatus::Completed => break,
            status => anyhow::bail!("Conversation ended as {:?}", status),
        }
    }

    let state = orchestrator.into_state();
    for failure in state.failures() {
        warn!(
            "{} turn in round {} was skipped: {}",
            failure.role,
            failure.round + 1,
            failure.error
        );
    }

    // Report
    let records = RunRecordStore::new(&config.storage.summary_path, config.storage.keep_records);
    let composer = ReportComposer::new(generator, config)
        .with_intake(input.profile.clone())
        .with_cache(Arc::new(DraftCache::new()))
        .with_record_store(records);
    let document = composer
        .compose(state.transcript(), &input.schools, pages, &cancel)
        .await?;

    for section in document.degraded_sections() {
        warn!(
            "Section '{}' kept with violations {:?} ({} chars)",
            section.spec.name, section.outstanding, section.char_count
        );
    }

    let title = if input.profile.student_name.is_empty() {
        "Admissions Counselling Report".to_string()
    } else {
        format!("Admissions Counselling Report for {}", input.profile.student_name)
    };
    if let Some(path) = out {
        render::write_json(&document, path)?;
    }
    if let Some(path) = markdown {
        render::write_markdown(&document, &title, path)?;
    }
    if out.is_none() && markdown.is_none() {
        println!("{}", render::to_markdown(&document, &title));
    }

    println!(
        "Report {}: {} sections, {:.1} pages, {} verification notes",
        document.metadata.run_id,
        document.sections.len(),
        document.metadata.page_estimate,
        document.metadata.verification_notes
    );
    Ok(())
}

async fn read_line() -> Result<String> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await?
    .context("Failed to read answer")
}
