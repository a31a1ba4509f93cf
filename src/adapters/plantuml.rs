//! PlantUML compiler adapter.
//!
//! Runs the PlantUML renderer as a subprocess over a saved `.puml` file and
//! reports either the rendered image location or a structured failure. An
//! invocation problem (missing binary, timeout) is an `Err`; a rejected
//! diagram is a normal `CompileStatus::Failed`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::DiagramCompiler;
use crate::domain::CompileStatus;

/// PlantUML adapter using subprocess mode
pub struct PlantUmlCompiler {
    /// Renderer binary (default: "plantuml")
    program: String,

    /// Optional plantuml.jar path; when set, invokes `java -jar <jar>`
    jar_path: Option<PathBuf>,
}

impl Default for PlantUmlCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl PlantUmlCompiler {
    /// Create a new adapter using the `plantuml` binary on PATH
    pub fn new() -> Self {
        Self {
            program: "plantuml".to_string(),
            jar_path: None,
        }
    }

    /// Create an adapter that invokes `java -jar <jar>`
    pub fn with_jar(jar_path: impl Into<PathBuf>) -> Self {
        Self {
            program: "java".to_string(),
            jar_path: Some(jar_path.into()),
        }
    }

    /// Create an adapter with a custom binary name or path
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            jar_path: None,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(ref jar) = self.jar_path {
            cmd.arg("-jar").arg(jar);
        }
        cmd.arg("-tpng");
        cmd
    }

    /// Check that the renderer can be invoked at all
    pub async fn health_check(&self) -> Result<()> {
        let output = self
            .command()
            .arg("-version")
            .output()
            .await
            .context("Failed to run PlantUML health check")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("PlantUML health check failed: {}", stderr.trim());
        }

        Ok(())
    }
}

#[async_trait]
impl DiagramCompiler for PlantUmlCompiler {
    fn name(&self) -> &str {
        "plantuml"
    }

    async fn render(&self, source: &Path, render_timeout: Duration) -> Result<CompileStatus> {
        debug!(source = %source.display(), "Rendering diagram");

        let child = self
            .command()
            .arg(source)
            .output();

        let output = timeout(render_timeout, child)
            .await
            .with_context(|| {
                format!(
                    "PlantUML render of {} timed out after {:?}",
                    source.display(),
                    render_timeout
                )
            })?
            .with_context(|| format!("Failed to invoke PlantUML for {}", source.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            return Ok(CompileStatus::Failed {
                reason: format!(
                    "renderer exited with code {}: {}",
                    exit_code,
                    stderr.trim()
                ),
            });
        }

        let rendered = source.with_extension("png");
        if rendered.exists() {
            Ok(CompileStatus::Succeeded { rendered })
        } else {
            Ok(CompileStatus::Failed {
                reason: "renderer reported success but produced no image".to_string(),
            })
        }
    }
}

/// Extract the PlantUML block from raw model output.
///
/// Takes the `@startuml..@enduml` span when both markers are present;
/// otherwise strips markdown fences and adds the markers.
pub fn extract_diagram_source(response: &str) -> String {
    const START: &str = "@startuml";
    const END: &str = "@enduml";

    if let (Some(start), Some(end)) = (response.find(START), response.rfind(END)) {
        if start < end {
            return response[start..end + END.len()].trim().to_string();
        }
    }

    let cleaned: String = response
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");
    let cleaned = cleaned.trim();

    let mut source = String::new();
    if !cleaned.starts_with(START) {
        source.push_str(START);
        source.push('\n');
    }
    source.push_str(cleaned);
    if !cleaned.ends_with(END) {
        source.push('\n');
        source.push_str(END);
    }
    source
}
