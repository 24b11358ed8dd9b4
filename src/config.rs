use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::analyze::Provider;
use crate::error::{DigestError, Result};
use crate::segment::TokenCounter;

/// Default analysis prompt. Speaking intervals are comma separated by the
/// subtitle parser, which is why the prompt mentions it.
pub const DEFAULT_PROMPT: &str = "Here is a transcript of video subtitles, with speaking intervals separated by commas. Please conduct a thorough analysis of the themes, content, and any cultural nuances present in these subtitles. Summarize the key points and provide insights into the dialogue dynamics. All analysis and summary should be presented clearly in Chinese.";

pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

fn default_provider() -> Provider {
    Provider::Gemini
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Prompt prepended to (or sent alongside) every segment
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Provider tried first; the other one is the fallback
    #[serde(default = "default_provider")]
    pub default_provider: Provider,
    /// Proxy URL handed to the HTTP client of both providers
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "ProviderConfig::gemini", deserialize_with = "gemini_section")]
    pub gemini: ProviderConfig,
    #[serde(default = "ProviderConfig::openai", deserialize_with = "openai_section")]
    pub openai: ProviderConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderConfig {
    /// Model identifier sent with each request
    pub model: String,
    /// Base URL of the provider API
    pub endpoint: String,
    /// API key; only ever read from the environment
    #[serde(skip)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    /// Top-k sampling, for providers that support it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Maximum number of tokens generated per request
    pub max_output_tokens: u32,
    /// Token ceiling of one prompt-prefixed segment
    pub max_input_tokens: usize,
    /// Maximum simultaneous in-flight requests, shared by all jobs
    pub max_concurrent_requests: usize,
    /// Wall-clock deadline for one whole multi-segment job
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn gemini() -> Self {
        Self {
            model: "gemini-1.5-pro-latest".to_string(),
            endpoint: GEMINI_ENDPOINT.to_string(),
            api_key: None,
            temperature: 0.9,
            top_p: 0.5,
            top_k: Some(20),
            max_output_tokens: 8192,
            max_input_tokens: 8192,
            max_concurrent_requests: 4,
            timeout_secs: 30,
        }
    }

    pub fn openai() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            endpoint: OPENAI_ENDPOINT.to_string(),
            api_key: None,
            temperature: 0.7,
            top_p: 0.9,
            top_k: None,
            max_output_tokens: 16384,
            max_input_tokens: 16384,
            max_concurrent_requests: 4,
            timeout_secs: 30,
        }
    }
}

/// A provider table as written in the config file. Keys left out keep the
/// provider's built-in default.
#[derive(Debug, Default, Deserialize)]
struct ProviderSection {
    model: Option<String>,
    endpoint: Option<String>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    top_k: Option<u32>,
    max_output_tokens: Option<u32>,
    max_input_tokens: Option<usize>,
    max_concurrent_requests: Option<usize>,
    timeout_secs: Option<u64>,
}

impl ProviderSection {
    fn overlay(self, base: ProviderConfig) -> ProviderConfig {
        ProviderConfig {
            model: self.model.unwrap_or(base.model),
            endpoint: self.endpoint.unwrap_or(base.endpoint),
            api_key: base.api_key,
            temperature: self.temperature.unwrap_or(base.temperature),
            top_p: self.top_p.unwrap_or(base.top_p),
            top_k: self.top_k.or(base.top_k),
            max_output_tokens: self.max_output_tokens.unwrap_or(base.max_output_tokens),
            max_input_tokens: self.max_input_tokens.unwrap_or(base.max_input_tokens),
            max_concurrent_requests: self.max_concurrent_requests.unwrap_or(base.max_concurrent_requests),
            timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
        }
    }
}

fn gemini_section<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<ProviderConfig, D::Error> {
    Ok(ProviderSection::deserialize(deserializer)?.overlay(ProviderConfig::gemini()))
}

fn openai_section<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<ProviderConfig, D::Error> {
    Ok(ProviderSection::deserialize(deserializer)?.overlay(ProviderConfig::openai()))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            default_provider: default_provider(),
            proxy: None,
            gemini: ProviderConfig::gemini(),
            openai: ProviderConfig::openai(),
        }
    }
}

/// Read an environment variable, warning when it is missing or empty.
pub fn load_env_value(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => {
            warn!("Environment variable {} is not set", key);
            None
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DigestError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| DigestError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DigestError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| DigestError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Overlay API keys, the OpenAI endpoint and the proxy from the environment.
    pub fn apply_env(&mut self) {
        self.gemini.api_key = optional_env("GEMINI_API_KEY").or_else(|| optional_env("gemini_api"));
        if self.gemini.api_key.is_none() {
            warn!("Environment variable GEMINI_API_KEY is not set");
        }
        self.openai.api_key = load_env_value("OPENAI_API_KEY");

        if let Some(base) = optional_env("OPENAI_API_BASE") {
            debug!("Using OpenAI endpoint from environment: {}", base);
            self.openai.endpoint = base;
        }

        if self.proxy.is_none() {
            self.proxy = optional_env("HTTPS_PROXY").or_else(|| optional_env("HTTP_PROXY"));
        }
    }

    pub fn provider(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::Gemini => &self.gemini,
            Provider::OpenAi => &self.openai,
        }
    }

    /// Reject settings that would make a job impossible to run.
    pub fn validate(&self) -> Result<()> {
        for provider in Provider::ALL {
            let cfg = self.provider(provider);
            if cfg.max_concurrent_requests == 0 {
                return Err(DigestError::Config(format!(
                    "{}: max_concurrent_requests must be at least 1",
                    provider
                )));
            }
            if cfg.timeout_secs == 0 {
                return Err(DigestError::Config(format!(
                    "{}: timeout_secs must be at least 1",
                    provider
                )));
            }
            let counter = provider.token_counter(&cfg.model)?;
            check_prompt_fits(&self.prompt, cfg.max_input_tokens, counter.as_ref())?;
        }
        Ok(())
    }
}

/// A prompt that already fills the ceiling leaves no room for transcript text.
pub fn check_prompt_fits(prompt: &str, max_tokens: usize, counter: &dyn TokenCounter) -> Result<()> {
    let prompt_tokens = counter.count(prompt);
    if prompt_tokens >= max_tokens {
        return Err(DigestError::Config(format!(
            "Prompt uses {} tokens but the segment ceiling is {}",
            prompt_tokens, max_tokens
        )));
    }
    Ok(())
}
