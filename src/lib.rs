//! specforge - iterative SRS and UML diagram refinement
//!
//! An orchestrator that drives two document-generation workflows with a
//! generative text model: UML diagram generation with an iterative
//! QA-feedback refinement loop, and SRS authoring with a tag-driven audit
//! loop.
//!
//! # Architecture
//!
//! The refinement core is a sequential state machine per run:
//! generate -> compile -> validate -> score -> decide. Within one iteration
//! the per-kind generate+compile steps run concurrently; the joint
//! validation call is the barrier. Every iteration is appended to an
//! append-only history that survives the process and can be replayed for
//! reporting.
//!
//! # Modules
//!
//! - `adapters`: External collaborators (Gemini generation, PlantUML render)
//! - `core`: Orchestration logic (Controller, Prompt, Score, Recorder)
//! - `docgen`: The SRS authoring workflow
//! - `domain`: Data structures (RefinementRun, IterationRecord, metrics)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Refine diagrams for a requirements slice
//! specforge refine checkout.md --max-iterations 5 --target-score 9
//!
//! # Author an SRS from a URD
//! specforge srs URD.txt --standard 830-1998.txt
//!
//! # Inspect a finished run
//! specforge report <run-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod docgen;
pub mod domain;

// Re-export main types at crate root for convenience
pub use self::core::{summarize, HistoryRecorder, RefinementController, RunSettings};
pub use domain::{
    ArtifactAttempt, ArtifactKind, CompileStatus, IterationRecord, MetricsRecord, RefinementRun,
    RequirementsSlice, RunOutcome,
};

// SRS authoring workflow
pub use docgen::{SrsAuthor, SrsRun, SrsSettings};
