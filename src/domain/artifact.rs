//! Artifact kinds and per-iteration generation/compilation outcomes.
//!
//! One `ArtifactAttempt` is created per requested kind per iteration and is
//! immutable afterwards.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The closed set of diagram kinds a refinement run can request.
///
/// New kinds are a code change, not configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Class diagram (static structure)
    Structure,

    /// Sequence diagram (interactions)
    Interaction,

    /// Activity diagram (logic/workflow)
    Workflow,
}

impl ArtifactKind {
    /// All kinds, in the order they are generated and validated.
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Structure,
        ArtifactKind::Interaction,
        ArtifactKind::Workflow,
    ];

    /// Human-readable diagram name
    pub fn diagram_name(&self) -> &'static str {
        match self {
            ArtifactKind::Structure => "Class Diagram",
            ArtifactKind::Interaction => "Sequence Diagram",
            ArtifactKind::Workflow => "Activity Diagram",
        }
    }

    /// Short identifier used in filenames and CLI flags
    pub fn slug(&self) -> &'static str {
        match self {
            ArtifactKind::Structure => "class",
            ArtifactKind::Interaction => "sequence",
            ArtifactKind::Workflow => "activity",
        }
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "structure" | "class" => Ok(ArtifactKind::Structure),
            "interaction" | "sequence" => Ok(ArtifactKind::Interaction),
            "workflow" | "activity" => Ok(ArtifactKind::Workflow),
            other => Err(format!(
                "unknown artifact kind '{}' (expected class, sequence, or activity)",
                other
            )),
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Result of handing one generated diagram source to the compiler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum CompileStatus {
    /// The renderer produced an image
    Succeeded { rendered: PathBuf },

    /// The renderer (or an upstream phase) rejected this attempt
    Failed { reason: String },
}

impl CompileStatus {
    /// Check whether this attempt rendered successfully
    pub fn is_success(&self) -> bool {
        matches!(self, CompileStatus::Succeeded { .. })
    }
}

/// Outcome of generating and compiling one `ArtifactKind` within one iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactAttempt {
    /// Which diagram kind this attempt is for
    pub kind: ArtifactKind,

    /// Generated diagram description (empty if generation itself failed)
    pub source_text: String,

    /// Where the source was persisted, if it was
    pub source_path: Option<PathBuf>,

    /// Compile outcome for this attempt
    pub status: CompileStatus,
}

impl ArtifactAttempt {
    /// A fully successful attempt
    pub fn succeeded(
        kind: ArtifactKind,
        source_text: String,
        source_path: PathBuf,
        rendered: PathBuf,
    ) -> Self {
        Self {
            kind,
            source_text,
            source_path: Some(source_path),
            status: CompileStatus::Succeeded { rendered },
        }
    }

    /// An attempt whose source was produced but rejected by the compiler
    pub fn compile_failed(
        kind: ArtifactKind,
        source_text: String,
        source_path: Option<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source_text,
            source_path,
            status: CompileStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    /// An attempt that never produced a source (generation-phase failure).
    ///
    /// Recorded so that validation still receives one attempt per requested
    /// kind, with the failure annotated.
    pub fn generation_failed(kind: ArtifactKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            source_text: String::new(),
            source_path: None,
            status: CompileStatus::Failed {
                reason: reason.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing_accepts_both_namings() {
        assert_eq!("class".parse::<ArtifactKind>(), Ok(ArtifactKind::Structure));
        assert_eq!(
            "Sequence".parse::<ArtifactKind>(),
            Ok(ArtifactKind::Interaction)
        );
        assert_eq!(
            "workflow".parse::<ArtifactKind>(),
            Ok(ArtifactKind::Workflow)
        );
        assert!("pie-chart".parse::<ArtifactKind>().is_err());
    }

    #[test]
    fn test_attempt_serialization() {
        let attempt = ArtifactAttempt::compile_failed(
            ArtifactKind::Interaction,
            "@startuml\nA -> B\n@enduml".to_string(),
            None,
            "syntax error on line 2",
        );

        let json = serde_json::to_string(&attempt).unwrap();
        let parsed: ArtifactAttempt = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.kind, ArtifactKind::Interaction);
        assert!(!parsed.status.is_success());
    }

    #[test]
    fn test_generation_failure_has_empty_source() {
        let attempt =
            ArtifactAttempt::generation_failed(ArtifactKind::Structure, "generation call failed");

        assert!(attempt.source_text.is_empty());
        assert!(attempt.source_path.is_none());
        assert!(matches!(attempt.status, CompileStatus::Failed { .. }));
    }
}
