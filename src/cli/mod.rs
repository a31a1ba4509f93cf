//! Command-line interface for specforge.
//!
//! Provides commands for running diagram refinement, authoring SRS
//! documents, and inspecting persisted runs.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::{DiagramCompiler, GeminiGenerator, PlantUmlCompiler, TextGenerator};
use crate::core::{summarize, HistoryRecorder, RefinementController, RunSettings};
use crate::docgen::{SrsAuthor, SrsSettings};
use crate::domain::{ArtifactKind, RequirementsSlice, RunOutcome};

/// specforge - iterative SRS and UML diagram refinement
#[derive(Parser, Debug)]
#[command(name = "specforge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the iterative diagram refinement loop over a requirements slice
    Refine {
        /// Requirements slice file (reads from stdin if not provided)
        input: Option<PathBuf>,

        /// Slice name (defaults to the input file stem)
        #[arg(short, long)]
        slice_name: Option<String>,

        /// Maximum number of iterations
        #[arg(short, long, default_value = "5")]
        max_iterations: u32,

        /// Overall score at which refinement stops
        #[arg(short, long, default_value = "10")]
        target_score: f64,

        /// Comma-separated diagram kinds (class, sequence, activity)
        #[arg(short, long)]
        kinds: Option<String>,

        /// Wall-clock budget in seconds; the run is aborted when exceeded
        #[arg(long)]
        budget_seconds: Option<u64>,
    },

    /// Generate and iteratively improve an SRS from a URD
    Srs {
        /// User requirements document file
        urd: PathBuf,

        /// Standard/template text file (IEEE 830 style guidance if omitted)
        #[arg(long)]
        standard: Option<PathBuf>,

        /// Project name (defaults to the URD file stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Maximum number of document versions
        #[arg(short, long, default_value = "10")]
        max_iterations: u32,

        /// Error count at which the audit passes
        #[arg(short, long, default_value = "0")]
        target_errors: u32,
    },

    /// Print the score progression report of a persisted run
    Report {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List persisted refinement runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Refine {
                input,
                slice_name,
                max_iterations,
                target_score,
                kinds,
                budget_seconds,
            } => {
                refine(
                    input,
                    slice_name,
                    max_iterations,
                    target_score,
                    kinds,
                    budget_seconds,
                )
                .await
            }
            Commands::Srs {
                urd,
                standard,
                name,
                max_iterations,
                target_errors,
            } => run_srs(urd, standard, name, max_iterations, target_errors).await,
            Commands::Report { run_id } => show_report(&run_id).await,
            Commands::Runs { limit } => list_runs(limit).await,
            Commands::Config => show_config().await,
        }
    }
}

/// Read input from a file or stdin
fn read_input(input: Option<&PathBuf>) -> Result<String> {
    let content = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read from stdin")?;
            buffer
        }
    };

    if content.trim().is_empty() {
        anyhow::bail!("Input is empty. Provide a file or pipe content to stdin");
    }

    Ok(content)
}

/// Derive a slice/project name from an explicit flag or a file stem
fn derive_name(explicit: Option<String>, path: Option<&PathBuf>, fallback: &str) -> String {
    explicit.unwrap_or_else(|| {
        path.and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| fallback.to_string())
    })
}

/// Build the configured generation adapter
fn build_generator() -> Result<Arc<dyn TextGenerator>> {
    let cfg = crate::config::config()?;
    let api_key = crate::config::require_api_key()?;
    let generator = GeminiGenerator::new(
        api_key,
        cfg.model.clone(),
        Duration::from_secs(cfg.call_timeout_seconds),
    )?;
    Ok(Arc::new(generator))
}

/// Build the configured compiler adapter
fn build_compiler() -> Result<Arc<dyn DiagramCompiler>> {
    let cfg = crate::config::config()?;
    let compiler = match &cfg.plantuml_jar {
        Some(jar) => PlantUmlCompiler::with_jar(jar),
        None => PlantUmlCompiler::with_program(cfg.plantuml_program.clone()),
    };
    Ok(Arc::new(compiler))
}

/// Run the refinement loop for one slice
async fn refine(
    input: Option<PathBuf>,
    slice_name: Option<String>,
    max_iterations: u32,
    target_score: f64,
    kinds: Option<String>,
    budget_seconds: Option<u64>,
) -> Result<()> {
    let text = read_input(input.as_ref())?;
    let name = derive_name(slice_name, input.as_ref(), "RequirementSlice");

    let kinds = match kinds {
        Some(list) => list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<ArtifactKind>().map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()?,
        None => ArtifactKind::ALL.to_vec(),
    };

    let cfg = crate::config::config()?;
    let settings = RunSettings {
        kinds,
        max_iterations,
        target_score,
        budget: budget_seconds.map(Duration::from_secs),
        call_timeout: Duration::from_secs(cfg.call_timeout_seconds),
        retry: cfg.retry.clone(),
    };

    let controller = RefinementController::new(build_generator()?, build_compiler()?);
    let run = controller
        .run(RequirementsSlice::new(name, text), settings)
        .await?;

    println!("{}", summarize(&run));

    if run.outcome == Some(RunOutcome::Aborted) {
        eprintln!("[Run {} aborted before completing]", run.id);
        std::process::exit(1);
    }

    Ok(())
}

/// Run the SRS improvement loop
async fn run_srs(
    urd_path: PathBuf,
    standard_path: Option<PathBuf>,
    name: Option<String>,
    max_iterations: u32,
    target_errors: u32,
) -> Result<()> {
    let urd = std::fs::read_to_string(&urd_path)
        .with_context(|| format!("Failed to read URD file: {}", urd_path.display()))?;

    let standard = match standard_path {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read standard file: {}", path.display()))?,
        None => "Follow the IEEE 830-1998 SRS structure and quality guidelines.".to_string(),
    };

    let name = derive_name(name, Some(&urd_path), "project");

    let cfg = crate::config::config()?;
    let settings = SrsSettings {
        max_iterations,
        target_errors,
        retry: cfg.retry.clone(),
    };

    let author = SrsAuthor::new(build_generator()?);
    let run = author.improve(&name, &urd, &standard, settings).await?;

    println!("SRS improvement: {}", run.name);
    println!("{:<9} {:<8} {:<40}", "VERSION", "ERRORS", "SRS");
    println!("{}", "-".repeat(58));
    for revision in &run.revisions {
        let errors = revision
            .errors
            .map(|e| e.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "v{:<8} {:<8} {:<40}",
            revision.version,
            errors,
            revision.srs_path.display()
        );
    }
    println!(
        "\nTarget reached: {}",
        if run.target_reached { "yes" } else { "no" }
    );

    Ok(())
}

/// Print the report of a persisted run
async fn show_report(run_id_str: &str) -> Result<()> {
    let run_id = Uuid::parse_str(run_id_str)
        .with_context(|| format!("Invalid run ID: {}", run_id_str))?;

    let run = HistoryRecorder::load(run_id).await?;
    println!("{}", summarize(&run));

    Ok(())
}

/// List persisted runs
async fn list_runs(limit: usize) -> Result<()> {
    let run_ids = HistoryRecorder::list_runs().await?;

    if run_ids.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    let mut runs = Vec::new();
    for run_id in run_ids {
        if let Ok(run) = HistoryRecorder::load(run_id).await {
            runs.push(run);
        }
    }
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    println!(
        "{:<38} {:<20} {:<26} {:<8}",
        "RUN ID", "SLICE", "OUTCOME", "SCORE"
    );
    println!("{}", "-".repeat(94));

    for run in runs.iter().take(limit) {
        let outcome = run
            .outcome
            .map(|o| o.to_string())
            .unwrap_or_else(|| "running".to_string());
        let score = run
            .final_score()
            .map(|s| format!("{:.1}", s))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<20} {:<26} {:<8}",
            run.id, run.slice.name, outcome, score
        );
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
async fn show_config() -> Result<()> {
    let cfg = crate::config::config()?;

    println!("specforge configuration");
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home: {}", cfg.home.display());
    println!("  Runs: {}", crate::config::runs_dir()?.display());
    println!("  Docs: {}", crate::config::docs_dir()?.display());
    println!();
    println!("Generator:");
    println!("  Model:    {}", cfg.model);
    println!(
        "  API key:  {}",
        if cfg.api_key.is_some() {
            "configured"
        } else {
            "missing"
        }
    );
    println!("  Timeout:  {}s", cfg.call_timeout_seconds);
    println!();
    println!("Renderer:");
    match &cfg.plantuml_jar {
        Some(jar) => println!("  java -jar {}", jar.display()),
        None => println!("  {}", cfg.plantuml_program),
    }

    let compiler = match &cfg.plantuml_jar {
        Some(jar) => PlantUmlCompiler::with_jar(jar),
        None => PlantUmlCompiler::with_program(cfg.plantuml_program.clone()),
    };
    match compiler.health_check().await {
        Ok(()) => println!("  Health:   ok"),
        Err(e) => println!("  Health:   unavailable ({})", e),
    }

    println!();
    println!("Retry policy:");
    println!("  Max attempts:  {}", cfg.retry.max_attempts);
    println!("  Initial delay: {}ms", cfg.retry.initial_delay_ms);

    Ok(())
}
