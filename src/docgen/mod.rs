//! SRS authoring workflow.
//!
//! The second document-generation loop: produce an SRS from a user
//! requirements document plus a standard/template text, audit it with a
//! validation pass that must end in a machine-readable `<errors: N>` tag,
//! and revise until the error count reaches the target or iterations run
//! out. Versioned documents (`SRS_vN.txt`, `SRSVR_vN.txt`) are kept for
//! every iteration.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::adapters::{RetryPolicy, TextGenerator};

/// Configurable surface of one SRS improvement run
#[derive(Debug, Clone)]
pub struct SrsSettings {
    /// Hard ceiling on document versions
    pub max_iterations: u32,

    /// Error count at which the audit passes
    pub target_errors: u32,

    /// Bounded retry policy for generation calls
    pub retry: RetryPolicy,
}

impl Default for SrsSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            target_errors: 0,
            retry: RetryPolicy::default(),
        }
    }
}

/// One audited document version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrsRevision {
    /// 1-based document version
    pub version: u32,

    /// Error count from the audit tag; `None` when the tag was missing
    pub errors: Option<u32>,

    /// Path to this version of the SRS
    pub srs_path: PathBuf,

    /// Path to this version's validation report
    pub report_path: PathBuf,
}

/// Result of one SRS improvement run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrsRun {
    /// Project name (directory under the docs root)
    pub name: String,

    /// One entry per audited version, in order
    pub revisions: Vec<SrsRevision>,

    /// Whether the error target was met
    pub target_reached: bool,
}

impl SrsRun {
    /// Error count of the last audited version
    pub fn final_errors(&self) -> Option<u32> {
        self.revisions.last().and_then(|r| r.errors)
    }

    /// Path of the last SRS version
    pub fn final_srs(&self) -> Option<&PathBuf> {
        self.revisions.last().map(|r| &r.srs_path)
    }
}

/// Drives the generate -> audit -> revise loop for one SRS
pub struct SrsAuthor {
    generator: Arc<dyn TextGenerator>,
    base_dir: Option<PathBuf>,
}

impl SrsAuthor {
    /// Create an author persisting under the configured docs root
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            base_dir: None,
        }
    }

    /// Persist documents under an explicit base directory instead
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Run the improvement loop to completion.
    ///
    /// An audit report without a locatable `<errors: N>` tag is treated as
    /// no improvement: the version is recorded with an unknown error count
    /// and the loop continues if iterations remain.
    #[instrument(skip_all, fields(name = %name))]
    pub async fn improve(
        &self,
        name: &str,
        urd: &str,
        standard: &str,
        settings: SrsSettings,
    ) -> Result<SrsRun> {
        if settings.max_iterations == 0 {
            anyhow::bail!("max_iterations must be at least 1");
        }

        let dir = match &self.base_dir {
            Some(base) => base.join(name),
            None => crate::config::docs_dir()?.join(name),
        };
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create docs directory: {}", dir.display()))?;

        info!(max_iterations = settings.max_iterations, target = settings.target_errors,
              "Starting SRS improvement");

        let mut run = SrsRun {
            name: name.to_string(),
            revisions: Vec::new(),
            target_reached: false,
        };

        let mut srs = self
            .generate_with_retry(&srs_generation_prompt(urd, standard), &settings.retry)
            .await
            .context("Initial SRS generation failed")?;
        let mut previous_report: Option<String> = None;

        for version in 1..=settings.max_iterations {
            let srs_path = dir.join(format!("SRS_v{}.txt", version));
            fs::write(&srs_path, &srs)
                .await
                .with_context(|| format!("Failed to write {}", srs_path.display()))?;

            let report = self
                .generate_with_retry(
                    &srs_validation_prompt(urd, &srs, standard, previous_report.as_deref()),
                    &settings.retry,
                )
                .await
                .context("SRS validation call failed")?;

            let report_path = dir.join(format!("SRSVR_v{}.txt", version));
            fs::write(&report_path, &report)
                .await
                .with_context(|| format!("Failed to write {}", report_path.display()))?;

            let errors = extract_error_count(&report);
            if errors.is_none() {
                warn!(version, "Audit report carries no error tag");
            }

            run.revisions.push(SrsRevision {
                version,
                errors,
                srs_path: srs_path.clone(),
                report_path,
            });

            info!(
                version,
                errors = %errors.map(|e| e.to_string()).unwrap_or_else(|| "unknown".to_string()),
                "Audit complete"
            );

            if let Some(count) = errors {
                if count <= settings.target_errors {
                    info!(version, count, "Error target reached");
                    run.target_reached = true;
                    break;
                }
            }

            if version >= settings.max_iterations {
                info!(version, "Max iterations exhausted");
                break;
            }

            srs = self
                .generate_with_retry(&srs_review_prompt(&srs, &report), &settings.retry)
                .await
                .context("SRS review call failed")?;
            previous_report = Some(report);
        }

        let summary_path = dir.join("run.json");
        let json = serde_json::to_string_pretty(&run).context("Failed to serialize SRS run")?;
        fs::write(&summary_path, json)
            .await
            .with_context(|| format!("Failed to write {}", summary_path.display()))?;

        Ok(run)
    }

    async fn generate_with_retry(&self, prompt: &str, retry: &RetryPolicy) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.generator.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if retry.should_retry(attempt) => {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(attempt, error = %e, "Generation call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Extract the `<errors: N>` tag from an audit report.
///
/// `None` means the tag is missing; callers must never read that as zero.
pub fn extract_error_count(report: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"<errors:\s*(\d+)>").expect("error tag regex"));

    re.captures(report)
        .and_then(|caps| caps[1].parse::<u32>().ok())
}

fn srs_generation_prompt(urd: &str, standard: &str) -> String {
    format!(
        "You are a software engineer writing a Software Requirements Specification (SRS).\n\
         Produce a complete SRS that addresses every user requirement below and follows \
         the structure and quality guidelines of the provided standard.\n\n\
         **USER REQUIREMENTS DOCUMENT (URD):**\n{urd}\n\n\
         **STANDARD / TEMPLATE:**\n{standard}\n\n\
         Write requirements that are specific, measurable, and testable, with IDs, \
         priorities, and traceability back to the URD. Generate the complete SRS now:\n",
    )
}

fn srs_validation_prompt(
    urd: &str,
    srs: &str,
    standard: &str,
    previous_report: Option<&str>,
) -> String {
    let previous_section = match previous_report {
        Some(report) => format!(
            "\n**PREVIOUS VALIDATION REPORT:**\n{}\n\n\
             NOTE: this SRS may be a revised version addressing the points above; \
             take unchanged-section remarks into account.\n",
            report
        ),
        None => String::new(),
    };

    format!(
        "You work in software quality and auditing. Validate that the SRS below \
         addresses every user requirement from the URD and follows the provided \
         standard. Identify missing requirements, ambiguities, inconsistencies, and \
         compliance gaps, with specific recommendations for each problem found.\n\n\
         **USER REQUIREMENTS DOCUMENT (URD):**\n{urd}\n\n\
         **SRS TO VALIDATE:**\n{srs}\n\n\
         **STANDARD / TEMPLATE:**\n{standard}\n{previous}\n\
         **CRITICAL: end your report with a tag stating the total number of problems \
         found, in exactly this format:**\n\
         <errors: #>\n\n\
         where # is the number of issues identified (e.g. <errors: 3>, <errors: 0>). \
         Automated tooling reads this tag to decide whether the SRS passed the audit.\n\n\
         Generate the validation report now:\n",
        urd = urd,
        srs = srs,
        standard = standard,
        previous = previous_section,
    )
}

fn srs_review_prompt(srs: &str, report: &str) -> String {
    format!(
        "You are the software engineer who wrote the SRS below. The quality and \
         auditing department reviewed it and produced the validation report that \
         follows. Create a new, improved SRS version that addresses every issue in \
         the report.\n\n\
         **YOUR ORIGINAL SRS DOCUMENT:**\n{srs}\n\n\
         **VALIDATION REPORT WITH FEEDBACK:**\n{report}\n\n\
         Keep the standard document structure, bump the version number, fix every \
         identified gap and ambiguity, and keep requirements specific, measurable, \
         and traceable. Output the complete revised SRS document now:\n",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn test_error_tag_extraction() {
        assert_eq!(extract_error_count("... <errors: 3>"), Some(3));
        assert_eq!(extract_error_count("<errors:0>"), Some(0));
        assert_eq!(extract_error_count("<errors: 15>\ntrailing"), Some(15));
        assert_eq!(extract_error_count("no tag here"), None);
        assert_eq!(extract_error_count("<errors: many>"), None);
    }

    #[test]
    fn test_validation_prompt_demands_the_tag() {
        let prompt = srs_validation_prompt("urd", "srs", "standard", None);
        assert!(prompt.contains("<errors: #>"));

        let with_previous = srs_validation_prompt("urd", "srs", "standard", Some("old report"));
        assert!(with_previous.contains("old report"));
    }

    /// Generator that replays a scripted sequence of responses
    struct ScriptedGenerator {
        responses: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            let mut responses = self.responses.lock().unwrap();
            anyhow::ensure!(!responses.is_empty(), "script exhausted");
            Ok(responses.remove(0))
        }
    }

    fn scripted(responses: &[&str]) -> Arc<dyn TextGenerator> {
        Arc::new(ScriptedGenerator {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        })
    }

    #[tokio::test]
    async fn test_improvement_stops_when_target_reached() {
        let temp = TempDir::new().unwrap();
        // generate v1, audit v1 (2 errors), review -> v2, audit v2 (0 errors)
        let generator = scripted(&[
            "SRS draft one",
            "two problems found\n<errors: 2>",
            "SRS draft two",
            "all clear\n<errors: 0>",
        ]);

        let author = SrsAuthor::new(generator).with_base_dir(temp.path());
        let run = author
            .improve("billing", "the urd", "the standard", SrsSettings::default())
            .await
            .unwrap();

        assert!(run.target_reached);
        assert_eq!(run.revisions.len(), 2);
        assert_eq!(run.final_errors(), Some(0));
        assert!(run.final_srs().unwrap().ends_with("SRS_v2.txt"));
        assert!(temp.path().join("billing/SRSVR_v1.txt").exists());
        assert!(temp.path().join("billing/run.json").exists());
    }

    #[tokio::test]
    async fn test_missing_tag_is_not_success() {
        let temp = TempDir::new().unwrap();
        // audit v1 has no tag, audit v2 still has errors; max 2 iterations
        let generator = scripted(&[
            "SRS draft one",
            "report without the tag",
            "SRS draft two",
            "still bad\n<errors: 4>",
        ]);

        let author = SrsAuthor::new(generator).with_base_dir(temp.path());
        let run = author
            .improve(
                "billing",
                "the urd",
                "the standard",
                SrsSettings {
                    max_iterations: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!run.target_reached);
        assert_eq!(run.revisions[0].errors, None);
        assert_eq!(run.revisions[1].errors, Some(4));
    }
}
