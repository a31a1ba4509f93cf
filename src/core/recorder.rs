//! Append-only history recorder with file-based persistence.
//!
//! Each run owns a directory under the runs root:
//!
//! ```text
//! runs/<run-id>/
//!   run.json          # run parameters + outcome (rewritten at seal)
//!   iterations.jsonl  # one IterationRecord per line, append-only
//!   artifacts/        # versioned diagram sources and rendered images
//! ```
//!
//! Only the refinement controller appends; everything else reads.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{ArtifactKind, IterationRecord, RefinementRun, RunOutcome};

/// File-based recorder for one run's iteration history
pub struct HistoryRecorder {
    run_dir: PathBuf,
    log_path: PathBuf,
    artifacts_dir: PathBuf,
    run_path: PathBuf,
}

impl HistoryRecorder {
    /// Create or open the recorder for a run under the configured runs root
    pub async fn open(run_id: Uuid) -> Result<Self> {
        let base = crate::config::runs_dir()?;
        Self::open_in(&base, run_id).await
    }

    /// Create or open the recorder under an explicit base directory
    pub async fn open_in(base: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = base.join(run_id.to_string());
        let artifacts_dir = run_dir.join("artifacts");

        fs::create_dir_all(&artifacts_dir).await.with_context(|| {
            format!(
                "Failed to create artifacts directory: {}",
                artifacts_dir.display()
            )
        })?;

        Ok(Self {
            log_path: run_dir.join("iterations.jsonl"),
            run_path: run_dir.join("run.json"),
            run_dir,
            artifacts_dir,
        })
    }

    /// Get the run directory
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Get the artifacts directory
    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Persist the run parameters when the run starts
    pub(crate) async fn begin(&self, run: &RefinementRun) -> Result<()> {
        self.write_run(run).await
    }

    /// Store a versioned diagram source and return its path
    pub async fn store_source(
        &self,
        slice_name: &str,
        iteration: u32,
        kind: ArtifactKind,
        source: &str,
    ) -> Result<PathBuf> {
        let filename = format!(
            "{}_v{}_{}_diagram.puml",
            sanitize(slice_name),
            iteration,
            kind.slug()
        );
        let path = self.artifacts_dir.join(filename);

        fs::write(&path, source)
            .await
            .with_context(|| format!("Failed to write diagram source: {}", path.display()))?;

        Ok(path)
    }

    /// Append a sealed iteration record to the log and the run history.
    /// Controller-only.
    pub(crate) async fn append(
        &self,
        run: &mut RefinementRun,
        record: IterationRecord,
    ) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .with_context(|| format!("Failed to open history log: {}", self.log_path.display()))?;

        let json = serde_json::to_string(&record).context("Failed to serialize iteration")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write iteration")?;
        file.flush().await.context("Failed to flush iteration")?;

        run.push_iteration(record);
        Ok(())
    }

    /// Seal the run with its terminal outcome and persist the final state.
    /// Controller-only.
    pub(crate) async fn seal(&self, run: &mut RefinementRun, outcome: RunOutcome) -> Result<()> {
        run.seal(outcome);
        self.write_run(run).await
    }

    async fn write_run(&self, run: &RefinementRun) -> Result<()> {
        let json = serde_json::to_string_pretty(run).context("Failed to serialize run")?;
        fs::write(&self.run_path, json)
            .await
            .with_context(|| format!("Failed to write run file: {}", self.run_path.display()))?;
        Ok(())
    }

    /// Replay all iteration records in order
    pub async fn replay(&self) -> Result<Vec<IterationRecord>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.log_path)
            .await
            .with_context(|| format!("Failed to open history log: {}", self.log_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut records = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let record: IterationRecord = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse iteration record: {}", line))?;
            records.push(record);
        }

        Ok(records)
    }

    /// Load a persisted run, rebuilding its history from the append-only log
    pub async fn load(run_id: Uuid) -> Result<RefinementRun> {
        let base = crate::config::runs_dir()?;
        Self::load_in(&base, run_id).await
    }

    /// Load a persisted run from an explicit base directory
    pub async fn load_in(base: &Path, run_id: Uuid) -> Result<RefinementRun> {
        let recorder = Self::open_in(base, run_id).await?;

        let content = fs::read_to_string(&recorder.run_path)
            .await
            .with_context(|| format!("Run {} not found", run_id))?;
        let mut run: RefinementRun =
            serde_json::from_str(&content).context("Failed to parse run file")?;

        // The JSONL log is the source of truth for history
        run.restore_history(recorder.replay().await?);

        Ok(run)
    }

    /// List all run IDs under the configured runs root
    pub async fn list_runs() -> Result<Vec<Uuid>> {
        let base = crate::config::runs_dir()?;
        Self::list_runs_in(&base).await
    }

    /// List all run IDs under an explicit base directory
    pub async fn list_runs_in(base: &Path) -> Result<Vec<Uuid>> {
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(base).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }
}

/// Replace filename-hostile characters in a slice name
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Produce a read-only score-progression report for a run.
///
/// Pure function of the run state: calling it repeatedly on a sealed run
/// yields identical output.
pub fn summarize(run: &RefinementRun) -> String {
    let mut out = String::new();

    out.push_str(&format!("Refinement run {}\n", run.id));
    out.push_str(&format!("Slice: {}\n", run.slice.name));
    out.push_str(&format!(
        "Target: {}/10 | Max iterations: {}\n",
        run.target_score, run.max_iterations
    ));
    out.push_str(&format!(
        "Outcome: {}\n\n",
        run.outcome
            .map(|o| o.to_string())
            .unwrap_or_else(|| "running".to_string())
    ));

    out.push_str(&format!(
        "{:<6} {:<8} {:<8} {:<10}\n",
        "ITER", "SCORE", "DELTA", "COMPILED"
    ));
    out.push_str(&format!("{}\n", "-".repeat(34)));

    for record in run.history() {
        let score = record
            .overall_score()
            .map(|s| format!("{:.1}", s))
            .unwrap_or_else(|| "-".to_string());
        let delta = record
            .delta
            .map(|d| format!("{:+.1}", d))
            .unwrap_or_else(|| "-".to_string());
        let compiled = format!("{}/{}", record.compiled_count(), record.attempts.len());

        out.push_str(&format!(
            "{:<6} {:<8} {:<8} {:<10}",
            record.index, score, delta, compiled
        ));
        if let Some(ref err) = record.validation_error {
            out.push_str(&format!(" (validation failed: {})", err));
        }
        out.push('\n');
    }

    if let Some(metrics) = run.last_metrics() {
        if !metrics.gaps.is_empty() {
            out.push_str("\nResidual gaps:\n");
            for gap in &metrics.gaps {
                out.push_str(&format!("  - {}\n", gap));
            }
        }
        if !metrics.recommendations.is_empty() {
            out.push_str("\nResidual recommendations:\n");
            for rec in &metrics.recommendations {
                out.push_str(&format!("  - {}\n", rec));
            }
        }
    }

    out
}
