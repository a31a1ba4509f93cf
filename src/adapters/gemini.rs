//! Gemini generation adapter.
//!
//! Calls the `generateContent` REST endpoint and returns the raw response
//! text. The key is passed as a query parameter, matching the
//! `GOOGLE_API_KEY` convention.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::TextGenerator;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model when none is configured
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// Gemini REST client
pub struct GeminiGenerator {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl GeminiGenerator {
    /// Create a new client for the given key and model
    pub fn new(api_key: String, model: String, call_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            api_key,
            model,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client,
        })
    }

    /// Override the API endpoint (used for tests against a local server)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, prompt_len = prompt.len(), "Sending generation request");

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(self.request_url())
            .json(&body)
            .send()
            .await
            .context("Failed to send generation request")?;

        let status = response.status();
        let parsed: GenerateResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse generation response (HTTP {})", status))?;

        if let Some(error) = parsed.error {
            anyhow::bail!("Generation API error (HTTP {}): {}", status, error.message);
        }

        if !status.is_success() {
            anyhow::bail!("Generation request failed with HTTP {}", status);
        }

        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            anyhow::bail!("No response text received from generation call");
        }

        Ok(text)
    }
}
