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
use crate::segment::{BpeCounter, Segment, Segmenter};

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletion {
    fn first_text(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default()
    }
}

/// Chat analyzer that threads a minimal conversation through the segments.
///
/// The first request carries the prompt as system message. Every later
/// request replaces the whole history with the previous response as system
/// message, so the context never grows with the transcript.
pub struct OpenAiAnalyzer {
    config: ProviderConfig,
    permits: Arc<Semaphore>,
    transport: Arc<dyn Transport>,
    counter: Arc<BpeCounter>,
}

impl OpenAiAnalyzer {
    pub fn new(
        config: ProviderConfig,
        permits: Arc<Semaphore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let counter = Arc::new(BpeCounter::for_model(&config.model)?);
        Ok(Self {
            config,
            permits,
            transport,
            counter,
        })
    }

    fn build_request(&self, system: &str, user: &str) -> HttpRequest {
        let url = format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'));
        let request = HttpRequest::new(
            url,
            json!({
                "model": self.config.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
                "temperature": self.config.temperature,
                "top_p": self.config.top_p,
                "max_tokens": self.config.max_output_tokens,
            }),
        );

        match &self.config.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    /// Subword counting is CPU bound, so the split runs off the async workers.
    async fn split(&self, prompt: &str, transcript: &str) -> Result<Vec<Segment>> {
        let counter = Arc::clone(&self.counter);
        let max_tokens = self.config.max_input_tokens;
        let prompt = prompt.to_string();
        let transcript = transcript.to_string();

        tokio::task::spawn_blocking(move || Segmenter::new(max_tokens, counter.as_ref()).split(&prompt, &transcript))
            .await
            .map_err(|e| DigestError::Task(format!("segmenting the transcript: {}", e)))
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let value = self
            .transport
            .post_json(self.build_request(system, user))
            .await
            .map_err(|e| DigestError::transport(Provider::OpenAi, e.to_string()))?;

        let completion: ChatCompletion = serde_json::from_value(value).map_err(|e| {
            DigestError::transport(Provider::OpenAi, format!("unexpected response shape: {}", e))
        })?;
        Ok(completion.first_text())
    }
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn analyze(&self, prompt: &str, transcript: &str) -> Result<String> {
        let segments = self.split(prompt, transcript).await?;
        info!(
            "Analyzing {} segment(s) with {} ({})",
            segments.len(),
            Provider::OpenAi,
            self.config.model
        );

        let timeout = Duration::from_secs(self.config.timeout_secs);
        run_job(Provider::OpenAi, &self.permits, timeout, async {
            let mut responses: Vec<String> = Vec::with_capacity(segments.len());
            let mut context = prompt.to_string();

            for (idx, segment) in segments.iter().enumerate() {
                let reply = self.complete(&context, &segment.body).await?;
                debug!("Segment {}/{} returned {} bytes", idx + 1, segments.len(), reply.len());

                // An empty reply keeps the last useful context.
                if !reply.trim().is_empty() {
                    context = reply.clone();
                    responses.push(reply);
                }
            }

            Ok(responses.join(" ").trim().to_string())
        })
        .await
    }
}
