//! Configuration for specforge paths and adapters.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SPECFORGE_HOME, GOOGLE_API_KEY)
//! 2. Config file (.specforge/config.yaml)
//! 3. Defaults (~/.specforge)
//!
//! Config file discovery:
//! - Searches current directory and parents for .specforge/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::RetryPolicy;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub generator: Option<GeneratorConfig>,
    #[serde(default)]
    pub plantuml: Option<PlantUmlConfig>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to config file)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    /// API key (the GOOGLE_API_KEY env var wins over this)
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub call_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlantUmlConfig {
    /// Renderer binary name or path
    pub program: Option<String>,
    /// plantuml.jar path; when set, the renderer is invoked via java -jar
    pub jar: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to specforge home (engine state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Generator API key (env or config file), if any
    pub api_key: Option<String>,
    /// Generator model name
    pub model: String,
    /// Per-call timeout for adapter calls in seconds
    pub call_timeout_seconds: u64,
    /// Renderer binary
    pub plantuml_program: String,
    /// Optional plantuml.jar path
    pub plantuml_jar: Option<PathBuf>,
    /// Adapter retry policy
    pub retry: RetryPolicy,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".specforge").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".specforge");

    let config_file = find_config_file();
    let file = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    let home = if let Ok(env_home) = std::env::var("SPECFORGE_HOME") {
        PathBuf::from(env_home)
    } else if let Some(home_path) = file.as_ref().and_then(|f| f.paths.home.as_deref()) {
        // home is relative to the .specforge/ directory
        let specforge_dir = config_file
            .as_ref()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new("."));
        resolve_path(specforge_dir, home_path)
    } else {
        default_home
    };

    let generator = file.as_ref().and_then(|f| f.generator.clone());

    let api_key = std::env::var("GOOGLE_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .or_else(|| generator.as_ref().and_then(|g| g.api_key.clone()));

    let model = generator
        .as_ref()
        .and_then(|g| g.model.clone())
        .unwrap_or_else(|| crate::adapters::gemini::DEFAULT_MODEL.to_string());

    let call_timeout_seconds = generator
        .as_ref()
        .and_then(|g| g.call_timeout_seconds)
        .unwrap_or(300);

    let plantuml = file.as_ref().and_then(|f| f.plantuml.clone());
    let plantuml_program = plantuml
        .as_ref()
        .and_then(|p| p.program.clone())
        .unwrap_or_else(|| "plantuml".to_string());
    let plantuml_jar = plantuml
        .as_ref()
        .and_then(|p| p.jar.clone())
        .map(PathBuf::from);

    let retry = file
        .as_ref()
        .and_then(|f| f.retry.clone())
        .unwrap_or_default();

    Ok(ResolvedConfig {
        home,
        config_file,
        api_key,
        model,
        call_timeout_seconds,
        plantuml_program,
        plantuml_jar,
        retry,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

// ============================================================================
// Convenience functions
// ============================================================================

/// Get the specforge home directory (engine state).
pub fn specforge_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the runs directory ($SPECFORGE_HOME/runs)
pub fn runs_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("runs"))
}

/// Get the documents directory ($SPECFORGE_HOME/docs)
pub fn docs_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("docs"))
}

/// The generator API key, or an actionable error if none is configured
pub fn require_api_key() -> Result<String> {
    config()?.api_key.clone().context(
        "No API key configured. Set GOOGLE_API_KEY or add generator.api_key to .specforge/config.yaml",
    )
}
