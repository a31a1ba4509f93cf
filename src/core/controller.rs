//! Refinement controller: the generate -> compile -> validate -> score ->
//! decide loop over a single run.
//!
//! Iterations are strictly sequential; within one iteration the per-kind
//! generate+compile steps run concurrently and are joined before the single
//! validation call. Adapter failures are retried a bounded number of times
//! at the call site; a phase that still fails is recorded on the iteration
//! and the iteration counter advances regardless, so a persistently failing
//! adapter can never loop forever.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::adapters::plantuml::extract_diagram_source;
use crate::adapters::{DiagramCompiler, RetryPolicy, TextGenerator};
use crate::domain::{
    ArtifactAttempt, ArtifactKind, IterationRecord, MetricsRecord, RefinementRun,
    RequirementsSlice, RunOutcome,
};

use super::prompt;
use super::recorder::HistoryRecorder;
use super::score;

/// The entire externally configurable surface of a refinement run
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Artifact kinds generated and validated every iteration
    pub kinds: Vec<ArtifactKind>,

    /// Hard ceiling on iterations; wasted iterations count
    pub max_iterations: u32,

    /// Overall score at which the run stops with `TargetReached`
    pub target_score: f64,

    /// Optional wall-clock budget; exceeding it seals the run as `Aborted`
    /// at the last fully-completed iteration
    pub budget: Option<Duration>,

    /// Per-call timeout handed to the compiler adapter
    pub call_timeout: Duration,

    /// Bounded retry policy for adapter calls
    pub retry: RetryPolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            kinds: ArtifactKind::ALL.to_vec(),
            max_iterations: 5,
            target_score: 10.0,
            budget: None,
            call_timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}

/// Orchestrates refinement runs over the two adapter seams
pub struct RefinementController {
    generator: Arc<dyn TextGenerator>,
    compiler: Arc<dyn DiagramCompiler>,
    base_dir: Option<PathBuf>,
}

impl RefinementController {
    /// Create a controller persisting under the configured runs root
    pub fn new(generator: Arc<dyn TextGenerator>, compiler: Arc<dyn DiagramCompiler>) -> Self {
        Self {
            generator,
            compiler,
            base_dir: None,
        }
    }

    /// Persist runs under an explicit base directory instead
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Execute one refinement run to its terminal outcome.
    ///
    /// The returned run is sealed: outcome assigned, history complete.
    #[instrument(skip(self, slice, settings), fields(slice = %slice.name))]
    pub async fn run(
        &self,
        slice: RequirementsSlice,
        settings: RunSettings,
    ) -> Result<RefinementRun> {
        if settings.kinds.is_empty() {
            anyhow::bail!("At least one artifact kind must be requested");
        }
        if settings.max_iterations == 0 {
            anyhow::bail!("max_iterations must be at least 1");
        }

        let mut run = RefinementRun::new(
            slice,
            settings.kinds.clone(),
            settings.max_iterations,
            settings.target_score,
        );
        info!(run_id = %run.id, max_iterations = run.max_iterations,
              target = run.target_score, "Starting refinement run");

        let recorder = Arc::new(match &self.base_dir {
            Some(base) => HistoryRecorder::open_in(base, run.id).await?,
            None => HistoryRecorder::open(run.id).await?,
        });
        recorder.begin(&run).await?;

        let started = Instant::now();

        for index in 1..=settings.max_iterations {
            let remaining = settings.budget.map(|b| b.saturating_sub(started.elapsed()));
            if remaining == Some(Duration::ZERO) {
                warn!(run_id = %run.id, index, "Wall-clock budget exhausted, aborting");
                recorder.seal(&mut run, RunOutcome::Aborted).await?;
                return Ok(run);
            }

            let iteration = self.run_iteration(&run, &recorder, index, &settings);
            let outcome = match remaining {
                Some(left) => tokio::time::timeout(left, iteration).await,
                None => Ok(iteration.await),
            };
            let record = match outcome {
                Ok(result) => result?,
                Err(_) => {
                    // In-flight work is dropped; the partial iteration is
                    // never appended.
                    warn!(run_id = %run.id, index, "Budget hit mid-iteration, aborting");
                    recorder.seal(&mut run, RunOutcome::Aborted).await?;
                    return Ok(run);
                }
            };

            let score = record.overall_score();
            let target_reached = score.map(|s| s >= run.target_score).unwrap_or(false);

            info!(
                run_id = %run.id,
                index,
                score = %score.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()),
                compiled = record.compiled_count(),
                "Iteration complete"
            );

            recorder.append(&mut run, record).await?;

            if target_reached {
                info!(run_id = %run.id, "Target score reached");
                recorder.seal(&mut run, RunOutcome::TargetReached).await?;
                return Ok(run);
            }

            if index >= settings.max_iterations {
                info!(run_id = %run.id, "Max iterations exhausted");
                recorder
                    .seal(&mut run, RunOutcome::MaxIterationsExhausted)
                    .await?;
                return Ok(run);
            }
        }

        recorder
            .seal(&mut run, RunOutcome::MaxIterationsExhausted)
            .await?;
        Ok(run)
    }

    /// One full pass: generate+compile all kinds concurrently, validate
    /// jointly, extract metrics, compute the delta.
    async fn run_iteration(
        &self,
        run: &RefinementRun,
        recorder: &Arc<HistoryRecorder>,
        index: u32,
        settings: &RunSettings,
    ) -> Result<IterationRecord> {
        let prior_metrics = run.last_metrics().cloned();

        let mut tasks = JoinSet::new();
        for (position, kind) in settings.kinds.iter().copied().enumerate() {
            let task = KindTask {
                generator: Arc::clone(&self.generator),
                compiler: Arc::clone(&self.compiler),
                recorder: Arc::clone(recorder),
                retry: settings.retry.clone(),
                call_timeout: settings.call_timeout,
                slice: run.slice.clone(),
                prior_metrics: prior_metrics.clone(),
                kind,
                iteration: index,
            };
            tasks.spawn(async move { (position, task.execute().await) });
        }

        // Join barrier: validation cannot proceed with a partial set
        let mut slots: Vec<Option<ArtifactAttempt>> = Vec::new();
        slots.resize_with(settings.kinds.len(), || None);
        while let Some(joined) = tasks.join_next().await {
            let (position, attempt) = joined.context("Artifact task failed")?;
            slots[position] = Some(attempt);
        }
        let attempts: Vec<ArtifactAttempt> = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .context("Artifact task produced no result")?;

        let (metrics, validation_error) =
            match self.validate_with_retry(&run.slice, &attempts, settings).await {
                Ok(report) => match score::extract(&report) {
                    Ok(metrics) => (Some(metrics), None),
                    Err(e) => {
                        // Never inferred, never treated as success
                        warn!(index, error = %e, "Validation report did not parse");
                        (None, Some(e.to_string()))
                    }
                },
                Err(e) => {
                    warn!(index, error = %e, "Validation call failed");
                    (None, Some(format!("validation call failed: {}", e)))
                }
            };

        let previous_score = run.last_iteration().and_then(|r| r.overall_score());
        let delta = match (&metrics, previous_score) {
            (Some(m), Some(prev)) => Some(m.overall_score - prev),
            _ => None,
        };

        Ok(IterationRecord {
            index,
            attempts,
            metrics,
            validation_error,
            delta,
            completed_at: Utc::now(),
        })
    }

    /// Single joint validation call with bounded retries
    async fn validate_with_retry(
        &self,
        slice: &RequirementsSlice,
        attempts: &[ArtifactAttempt],
        settings: &RunSettings,
    ) -> Result<String> {
        let prompt = prompt::validation_prompt(slice, attempts);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.generator.generate(&prompt).await {
                Ok(report) => return Ok(report),
                Err(e) if settings.retry.should_retry(attempt) => {
                    let delay = settings.retry.delay_for_attempt(attempt);
                    warn!(attempt, error = %e, "Validation call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// One artifact kind's generate-and-compile work for one iteration.
///
/// Owns everything it touches; writes only its own attempt slot. Never
/// fails the iteration: every error ends up annotated on the attempt.
struct KindTask {
    generator: Arc<dyn TextGenerator>,
    compiler: Arc<dyn DiagramCompiler>,
    recorder: Arc<HistoryRecorder>,
    retry: RetryPolicy,
    call_timeout: Duration,
    slice: RequirementsSlice,
    prior_metrics: Option<MetricsRecord>,
    kind: ArtifactKind,
    iteration: u32,
}

impl KindTask {
    async fn execute(self) -> ArtifactAttempt {
        let prompt = prompt::synthesize(&self.slice, self.kind, self.prior_metrics.as_ref());

        let raw = match self.generate_with_retry(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(kind = %self.kind, iteration = self.iteration, error = %e,
                      "Generation failed");
                return ArtifactAttempt::generation_failed(
                    self.kind,
                    format!("generation call failed: {}", e),
                );
            }
        };

        let source = extract_diagram_source(&raw);

        let source_path = match self
            .recorder
            .store_source(&self.slice.name, self.iteration, self.kind, &source)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                return ArtifactAttempt::compile_failed(
                    self.kind,
                    source,
                    None,
                    format!("failed to persist source: {}", e),
                );
            }
        };

        match self.render_with_retry(&source_path).await {
            Ok(crate::domain::CompileStatus::Succeeded { rendered }) => {
                ArtifactAttempt::succeeded(self.kind, source, source_path, rendered)
            }
            Ok(crate::domain::CompileStatus::Failed { reason }) => {
                warn!(kind = %self.kind, iteration = self.iteration, %reason,
                      "Diagram rejected by compiler");
                ArtifactAttempt::compile_failed(self.kind, source, Some(source_path), reason)
            }
            Err(e) => {
                warn!(kind = %self.kind, iteration = self.iteration, error = %e,
                      "Compiler invocation failed");
                ArtifactAttempt::compile_failed(
                    self.kind,
                    source,
                    Some(source_path),
                    format!("compiler invocation failed: {}", e),
                )
            }
        }
    }

    async fn generate_with_retry(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.generator.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(kind = %self.kind, attempt, error = %e,
                          "Generation call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn render_with_retry(&self, source_path: &std::path::Path) -> Result<crate::domain::CompileStatus> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.compiler.render(source_path, self.call_timeout).await {
                Ok(status) => return Ok(status),
                Err(e) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(kind = %self.kind, attempt, error = %e,
                          "Compiler invocation failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
