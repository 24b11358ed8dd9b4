use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{run_job, Analyzer, HttpRequest, Provider, Transport};
use crate::config::ProviderConfig;
use crate::error::{DigestError, Result};
use crate::segment::{segment, WordCounter};

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Every non-empty candidate part, each followed by a blank line.
    fn text(&self) -> String {
        let mut out = String::new();
        for part in self
            .candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
        {
            if let Some(text) = part.text.as_deref().filter(|t| !t.is_empty()) {
                out.push_str(text);
                out.push_str("\n\n");
            }
        }
        out
    }
}

/// Single-shot analyzer: the prompt is prepended to every segment and
/// segments share no conversation state.
pub struct GeminiAnalyzer {
    config: ProviderConfig,
    permits: Arc<Semaphore>,
    transport: Arc<dyn Transport>,
}

impl GeminiAnalyzer {
    pub fn new(config: ProviderConfig, permits: Arc<Semaphore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            permits,
            transport,
        }
    }

    fn build_request(&self, text: &str) -> HttpRequest {
        let mut generation_config = json!({
            "temperature": self.config.temperature,
            "topP": self.config.top_p,
            "maxOutputTokens": self.config.max_output_tokens,
        });
        if let Some(top_k) = self.config.top_k {
            generation_config["topK"] = json!(top_k);
        }

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        );
        let request = HttpRequest::new(
            url,
            json!({
                "contents": [{ "role": "user", "parts": [{ "text": text }] }],
                "generationConfig": generation_config,
            }),
        );

        match &self.config.api_key {
            Some(key) => request.header("x-goog-api-key", key.clone()),
            None => request,
        }
    }

    async fn generate(&self, text: &str) -> Result<String> {
        let value = self
            .transport
            .post_json(self.build_request(text))
            .await
            .map_err(|e| DigestError::transport(Provider::Gemini, e.to_string()))?;

        let response: GenerateContentResponse = serde_json::from_value(value).map_err(|e| {
            DigestError::transport(Provider::Gemini, format!("unexpected response shape: {}", e))
        })?;
        Ok(response.text())
    }
}

#[async_trait]
impl Analyzer for GeminiAnalyzer {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn analyze(&self, prompt: &str, transcript: &str) -> Result<String> {
        let segments = segment(prompt, transcript, self.config.max_input_tokens, &WordCounter);
        info!(
            "Analyzing {} segment(s) with {} ({})",
            segments.len(),
            Provider::Gemini,
            self.config.model
        );

        let timeout = Duration::from_secs(self.config.timeout_secs);
        run_job(Provider::Gemini, &self.permits, timeout, async {
            let mut result = String::new();
            for (idx, part) in segments.iter().enumerate() {
                let text = self.generate(part).await?;
                debug!("Segment {}/{} returned {} bytes", idx + 1, segments.len(), text.len());
                result.push_str(&text);
            }
            Ok(result)
        })
        .await
    }
}
