//! Refinement run aggregate and its append-only iteration history.
//!
//! A `RefinementRun` is the top-level record of one refinement loop over a
//! requirements slice. The controller is the only writer; everything else
//! gets read-only views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::{ArtifactAttempt, ArtifactKind};
use super::metrics::MetricsRecord;

/// A named, bounded fragment of a requirements document.
///
/// Immutable input to one refinement run; the name scopes both generation
/// prompts and downstream scope-violation checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsSlice {
    /// Unique name within a run (used in filenames and prompts)
    pub name: String,

    /// Raw requirements text
    pub text: String,
}

impl RequirementsSlice {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// One pass through the generate -> compile -> validate -> score loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration index, strictly increasing within a run
    pub index: u32,

    /// One attempt per requested artifact kind, in request order
    pub attempts: Vec<ArtifactAttempt>,

    /// Parsed QA metrics; `None` when validation or score extraction failed
    pub metrics: Option<MetricsRecord>,

    /// Why `metrics` is absent, when it is
    pub validation_error: Option<String>,

    /// Change in overall score versus the previous iteration; `None` for
    /// iteration 1 and whenever either side lacks metrics
    pub delta: Option<f64>,

    /// When this iteration was sealed
    pub completed_at: DateTime<Utc>,
}

impl IterationRecord {
    /// Overall score of this iteration, if validation produced one
    pub fn overall_score(&self) -> Option<f64> {
        self.metrics.as_ref().map(|m| m.overall_score)
    }

    /// Count of attempts that rendered successfully
    pub fn compiled_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.status.is_success()).count()
    }
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// An iteration reached the target score
    TargetReached,

    /// `max_iterations` elapsed without reaching the target
    MaxIterationsExhausted,

    /// The run was cancelled (e.g. wall-clock budget) before finishing
    Aborted,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunOutcome::TargetReached => "target_reached",
            RunOutcome::MaxIterationsExhausted => "max_iterations_exhausted",
            RunOutcome::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// One refinement run over a single requirements slice.
///
/// The history is append-only: records are added once per iteration by the
/// controller (through the history recorder) and the run is sealed exactly
/// once with an outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementRun {
    /// Unique identifier for this run
    pub id: Uuid,

    /// The slice being refined
    pub slice: RequirementsSlice,

    /// Artifact kinds requested for every iteration
    pub kinds: Vec<ArtifactKind>,

    /// Hard ceiling on iterations (wasted iterations count too)
    pub max_iterations: u32,

    /// Overall score at which the run stops with `TargetReached`
    pub target_score: f64,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run was sealed (if it has been)
    pub completed_at: Option<DateTime<Utc>>,

    /// Terminal outcome; `None` while the loop is still running
    pub outcome: Option<RunOutcome>,

    history: Vec<IterationRecord>,
}

impl RefinementRun {
    /// Create a new, unsealed run
    pub fn new(
        slice: RequirementsSlice,
        kinds: Vec<ArtifactKind>,
        max_iterations: u32,
        target_score: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            slice,
            kinds,
            max_iterations,
            target_score,
            started_at: Utc::now(),
            completed_at: None,
            outcome: None,
            history: Vec::new(),
        }
    }

    /// Read-only view of the iteration history, in order
    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// The most recent iteration, if any
    pub fn last_iteration(&self) -> Option<&IterationRecord> {
        self.history.last()
    }

    /// The most recent iteration that produced metrics.
    ///
    /// Used to pick the prior feedback for the next prompt after a
    /// parse-failed iteration.
    pub fn last_metrics(&self) -> Option<&MetricsRecord> {
        self.history.iter().rev().find_map(|r| r.metrics.as_ref())
    }

    /// Final overall score, if any iteration produced one
    pub fn final_score(&self) -> Option<f64> {
        self.history.iter().rev().find_map(|r| r.overall_score())
    }

    /// Check whether the run has been sealed
    pub fn is_sealed(&self) -> bool {
        self.outcome.is_some()
    }

    /// Append a sealed iteration record. Controller-only.
    pub(crate) fn push_iteration(&mut self, record: IterationRecord) {
        debug_assert!(!self.is_sealed(), "appending to a sealed run");
        debug_assert_eq!(record.index as usize, self.history.len() + 1);
        self.history.push(record);
    }

    /// Assign the terminal outcome. Controller-only; the outcome is
    /// immutable thereafter.
    pub(crate) fn seal(&mut self, outcome: RunOutcome) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
            self.completed_at = Some(Utc::now());
        }
    }

    /// Replace the history with records replayed from the persisted log.
    /// Recorder-only, for `load`.
    pub(crate) fn restore_history(&mut self, records: Vec<IterationRecord>) {
        self.history = records;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::artifact::ArtifactKind;

    fn record(index: u32, score: Option<f64>) -> IterationRecord {
        IterationRecord {
            index,
            attempts: Vec::new(),
            metrics: score.map(|s| MetricsRecord {
                overall_score: s,
                sub_scores: Default::default(),
                gaps: Vec::new(),
                recommendations: Vec::new(),
                raw_text: String::new(),
            }),
            validation_error: None,
            delta: None,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_run_creation() {
        let run = RefinementRun::new(
            RequirementsSlice::new("Checkout", "The user pays."),
            ArtifactKind::ALL.to_vec(),
            5,
            10.0,
        );

        assert_eq!(run.slice.name, "Checkout");
        assert!(run.history().is_empty());
        assert!(!run.is_sealed());
    }

    #[test]
    fn test_last_metrics_skips_parse_failed_iterations() {
        let mut run = RefinementRun::new(
            RequirementsSlice::new("s", "t"),
            vec![ArtifactKind::Structure],
            5,
            10.0,
        );

        run.push_iteration(record(1, Some(6.0)));
        run.push_iteration(record(2, None));

        assert_eq!(run.last_metrics().map(|m| m.overall_score), Some(6.0));
        assert_eq!(run.final_score(), Some(6.0));
    }

    #[test]
    fn test_seal_is_write_once() {
        let mut run = RefinementRun::new(
            RequirementsSlice::new("s", "t"),
            vec![ArtifactKind::Structure],
            1,
            10.0,
        );

        run.seal(RunOutcome::TargetReached);
        run.seal(RunOutcome::Aborted);

        assert_eq!(run.outcome, Some(RunOutcome::TargetReached));
    }

    #[test]
    fn test_run_serialization_round_trip() {
        let mut run = RefinementRun::new(
            RequirementsSlice::new("s", "t"),
            vec![ArtifactKind::Workflow],
            3,
            9.0,
        );
        run.push_iteration(record(1, Some(8.0)));

        let json = serde_json::to_string(&run).unwrap();
        let parsed: RefinementRun = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, run.id);
        assert_eq!(parsed.history().len(), 1);
        assert_eq!(parsed.final_score(), Some(8.0));
    }
}
