//! Prompt synthesis for generation and validation calls.
//!
//! Pure text transformations: no I/O, no failure modes. The generation
//! prompts follow the original reviewer workflow — a kind-specific baseline
//! scoped to the slice, optionally extended with the previous iteration's QA
//! feedback as mandatory corrections. The validation prompt pins the exact
//! output markers that `core::score` parses.

use crate::domain::{ArtifactAttempt, ArtifactKind, CompileStatus, MetricsRecord, RequirementsSlice};

/// Build the generation prompt for one artifact kind.
///
/// With `prior_metrics` present, the baseline is extended with every gap and
/// recommendation from the previous iteration, in record order, phrased as
/// mandatory corrections. Nothing from the prior feedback is dropped.
pub fn synthesize(
    slice: &RequirementsSlice,
    kind: ArtifactKind,
    prior_metrics: Option<&MetricsRecord>,
) -> String {
    let mut prompt = baseline(slice, kind);

    if let Some(metrics) = prior_metrics {
        prompt.push_str(&corrective_suffix(kind, metrics));
    }

    prompt.push_str(&format!(
        "\nGenerate ONLY PlantUML code for the {} - no explanations, no markdown fences.\n\
         Start with @startuml and end with @enduml.\n",
        kind.diagram_name()
    ));

    prompt
}

/// Kind-specific baseline prompt with the slice scope instruction.
fn baseline(slice: &RequirementsSlice, kind: ArtifactKind) -> String {
    let constraints = match kind {
        ArtifactKind::Structure => {
            "Specific constraints:\n\
             1. Identify the attributes (fields) and operations (methods) for each class\n\
             2. Define the relationships: --|> for inheritance, *-- for composition, o-- for aggregation\n\
             3. Add multiplicity (e.g. 1..*) to every relationship\n"
        }
        ArtifactKind::Interaction => {
            "Specific constraints:\n\
             1. Use autonumber to index the steps\n\
             2. Clearly define participants (actor, participant, database as appropriate)\n\
             3. Use alt/else blocks for the error and failure paths mentioned in the text\n"
        }
        ArtifactKind::Workflow => {
            "Specific constraints:\n\
             1. Use modern activity syntax: start ... stop, :Action description; for activities\n\
             2. Use if (condition?) then (yes) ... else (no) ... endif for decisions\n\
             3. Focus on the business logic and decision flows\n"
        }
    };

    format!(
        "You are a senior software architect. Create a {diagram} in PlantUML format \
         for the requirements slice below.\n\n\
         SCOPE: model ONLY the \"{name}\" slice. Exclude classes, interactions, and \
         flows that belong to other slices of the requirements document; scope \
         violations are penalized during validation.\n\n\
         {constraints}\n\
         REQUIREMENTS SLICE ({name}):\n{text}\n",
        diagram = kind.diagram_name(),
        name = slice.name,
        text = slice.text,
        constraints = constraints,
    )
}

/// Restate the prior iteration's feedback as mandatory corrections.
fn corrective_suffix(kind: ArtifactKind, metrics: &MetricsRecord) -> String {
    let mut section = format!(
        "\nThe previous version of this {} scored {}/10 in QA review. \
         Produce an improved version that addresses ALL of the feedback below. \
         Do not simply restate the previous diagram.\n",
        kind.diagram_name(),
        metrics.overall_score
    );

    if !metrics.gaps.is_empty() {
        section.push_str("\nIdentified gaps (close every one, in priority order):\n");
        for (i, gap) in metrics.gaps.iter().enumerate() {
            section.push_str(&format!("{}. {}\n", i + 1, gap));
        }
    }

    if !metrics.recommendations.is_empty() {
        section.push_str("\nMandatory corrections (apply every one, in priority order):\n");
        for (i, rec) in metrics.recommendations.iter().enumerate() {
            section.push_str(&format!("{}. {}\n", i + 1, rec));
        }
    }

    if metrics.gaps.is_empty() && metrics.recommendations.is_empty() {
        section.push_str("\nNo specific findings were reported; improve clarity and coverage.\n");
    }

    section
}

/// Build the joint validation prompt over all attempts of one iteration.
///
/// Failed attempts are passed through with their failure reason annotated so
/// the reviewer can react to them; the requested output format matches the
/// marker grammar in `core::score` exactly.
pub fn validation_prompt(slice: &RequirementsSlice, attempts: &[ArtifactAttempt]) -> String {
    let mut prompt = format!(
        "You are a senior software architect and quality assurance expert. Validate \
         the UML diagrams below, generated for one requirements slice, for internal \
         consistency, completeness, quality, and scope adherence.\n\n\
         REQUIREMENTS SLICE ({name}):\n{text}\n\nGENERATED DIAGRAMS:\n",
        name = slice.name,
        text = slice.text,
    );

    for (i, attempt) in attempts.iter().enumerate() {
        prompt.push_str(&format!(
            "\n{}. {} ({}):\n",
            i + 1,
            attempt.kind.diagram_name().to_uppercase(),
            attempt.kind.slug()
        ));
        match &attempt.status {
            CompileStatus::Succeeded { .. } => prompt.push_str(&attempt.source_text),
            CompileStatus::Failed { reason } => {
                if attempt.source_text.is_empty() {
                    prompt.push_str(&format!("[diagram generation failed: {}]", reason));
                } else {
                    prompt.push_str(&format!(
                        "{}\n[diagram compilation failed: {}]",
                        attempt.source_text, reason
                    ));
                }
            }
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "\nVALIDATION CRITERIA:\n\
         1. Consistency: do the diagrams contradict each other?\n\
         2. Completeness: do the diagrams cover all requirements in the slice?\n\
         3. Quality: are the diagrams syntactically correct and idiomatic UML?\n\
         4. Scope adherence: does any diagram model content outside this slice?\n\
         Diagrams annotated as failed count heavily against completeness and quality.\n\n\
         OUTPUT FORMAT - reply with exactly these markers so automated tooling can \
         parse your report:\n\n\
         Overall Score: <0-10, halves allowed>/10\n\
         Consistency Score: <0-10>/10\n\
         Completeness Score: <0-10>/10\n\
         Quality Score: <0-10>/10\n\
         Scope Adherence Score: <0-10>/10\n\n\
         Gaps:\n\
         - <one finding per line, most important first>\n\n\
         Recommendations:\n\
         1. <one concrete action per line, most important first>\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn slice() -> RequirementsSlice {
        RequirementsSlice::new("Checkout", "The user pays with a stored card.")
    }

    fn metrics(gaps: &[&str], recs: &[&str]) -> MetricsRecord {
        MetricsRecord {
            overall_score: 6.5,
            sub_scores: BTreeMap::new(),
            gaps: gaps.iter().map(|s| s.to_string()).collect(),
            recommendations: recs.iter().map(|s| s.to_string()).collect(),
            raw_text: String::new(),
        }
    }

    #[test]
    fn test_baseline_prompt_scopes_to_slice() {
        let prompt = synthesize(&slice(), ArtifactKind::Structure, None);

        assert!(prompt.contains("\"Checkout\""));
        assert!(prompt.contains("The user pays with a stored card."));
        assert!(prompt.contains("Exclude classes, interactions, and"));
        assert!(prompt.contains("@startuml"));
    }

    #[test]
    fn test_baseline_prompts_differ_per_kind() {
        let class = synthesize(&slice(), ArtifactKind::Structure, None);
        let seq = synthesize(&slice(), ArtifactKind::Interaction, None);
        let act = synthesize(&slice(), ArtifactKind::Workflow, None);

        assert!(class.contains("multiplicity"));
        assert!(seq.contains("autonumber"));
        assert!(act.contains("endif"));
    }

    #[test]
    fn test_prior_feedback_round_trips_completely() {
        let metrics = metrics(
            &["missing PaymentToken entity", "timeout path absent"],
            &["add alt block for timeout", "model PaymentToken with 1..*"],
        );

        let prompt = synthesize(&slice(), ArtifactKind::Interaction, Some(&metrics));

        for gap in &metrics.gaps {
            assert!(prompt.contains(gap), "gap dropped: {}", gap);
        }
        for rec in &metrics.recommendations {
            assert!(prompt.contains(rec), "recommendation dropped: {}", rec);
        }
        // Ordering preserved: first gap appears before second
        let a = prompt.find(&metrics.gaps[0]).unwrap();
        let b = prompt.find(&metrics.gaps[1]).unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_validation_prompt_annotates_failures() {
        let attempts = vec![
            ArtifactAttempt::succeeded(
                ArtifactKind::Structure,
                "@startuml\nclass A\n@enduml".to_string(),
                PathBuf::from("a.puml"),
                PathBuf::from("a.png"),
            ),
            ArtifactAttempt::generation_failed(ArtifactKind::Interaction, "model call timed out"),
        ];

        let prompt = validation_prompt(&slice(), &attempts);

        assert!(prompt.contains("class A"));
        assert!(prompt.contains("[diagram generation failed: model call timed out]"));
        assert!(prompt.contains("Overall Score:"));
        assert!(prompt.contains("Recommendations:"));
    }
}
