// Analysis backends
//
// Two providers implement the same `Analyzer` contract with different
// personalities:
// - Gemini: every segment is an independent single-shot generation with the
//   prompt prepended
// - OpenAI: the prompt is a system message and each later segment only sees
//   the previous response
//
// `fallback` sequences a primary and an alternate provider.

pub mod fallback;
pub mod gemini;
pub mod openai;
pub mod transport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::debug;

use crate::config::Config;
use crate::error::{DigestError, Result};
use crate::segment::{BpeCounter, TokenCounter, WordCounter};

pub use fallback::{analyze_with_fallback, Analysis};
pub use gemini::GeminiAnalyzer;
pub use openai::OpenAiAnalyzer;
pub use transport::{HttpRequest, ReqwestTransport, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAi,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Gemini, Provider::OpenAi];

    /// The other provider. There are exactly two, so this never maps a
    /// provider onto itself.
    pub fn fallback(self) -> Provider {
        match self {
            Provider::Gemini => Provider::OpenAi,
            Provider::OpenAi => Provider::Gemini,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
        }
    }

    /// Segment cost function for this provider.
    pub fn token_counter(self, model: &str) -> Result<Box<dyn TokenCounter>> {
        match self {
            Provider::Gemini => Ok(Box::new(WordCounter)),
            Provider::OpenAi => Ok(Box::new(BpeCounter::for_model(model)?)),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sends a transcript, segmented for this provider, to a remote model.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn provider(&self) -> Provider;

    /// Returns the concatenated, non-empty output for all segments.
    async fn analyze(&self, prompt: &str, transcript: &str) -> Result<String>;
}

/// Builds a fresh analyzer per attempt.
pub trait AnalyzerFactory: Send + Sync {
    fn create(&self, provider: Provider) -> Result<Box<dyn Analyzer>>;
}

/// Per-provider concurrency permits, shared by every job in the process.
#[derive(Debug, Clone)]
pub struct PermitPool {
    gemini: Arc<Semaphore>,
    openai: Arc<Semaphore>,
}

impl PermitPool {
    pub fn new(gemini: usize, openai: usize) -> Self {
        Self {
            gemini: Arc::new(Semaphore::new(gemini)),
            openai: Arc::new(Semaphore::new(openai)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.gemini.max_concurrent_requests,
            config.openai.max_concurrent_requests,
        )
    }

    pub fn for_provider(&self, provider: Provider) -> Arc<Semaphore> {
        match provider {
            Provider::Gemini => Arc::clone(&self.gemini),
            Provider::OpenAi => Arc::clone(&self.openai),
        }
    }
}

/// Analyzer factory backed by the real HTTP transport.
#[derive(Clone)]
pub struct HttpAnalyzerFactory {
    config: Arc<Config>,
    permits: PermitPool,
    transport: Arc<dyn Transport>,
}

impl HttpAnalyzerFactory {
    pub fn new(config: Arc<Config>, permits: PermitPool, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            permits,
            transport,
        }
    }

    /// Factory with a reqwest transport configured from `config`.
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let transport = ReqwestTransport::new(config.proxy.as_deref())?;
        let permits = PermitPool::from_config(&config);
        Ok(Self::new(config, permits, Arc::new(transport)))
    }
}

impl AnalyzerFactory for HttpAnalyzerFactory {
    fn create(&self, provider: Provider) -> Result<Box<dyn Analyzer>> {
        let cfg = self.config.provider(provider).clone();
        let permits = self.permits.for_provider(provider);
        let transport = Arc::clone(&self.transport);

        Ok(match provider {
            Provider::Gemini => Box::new(GeminiAnalyzer::new(cfg, permits, transport)),
            Provider::OpenAi => Box::new(OpenAiAnalyzer::new(cfg, permits, transport)?),
        })
    }
}

/// Run one provider job under a single deadline.
///
/// The deadline covers waiting for a permit and every segment request. The
/// permit is released when `work` finishes or the deadline drops it.
pub(crate) async fn run_job<F>(
    provider: Provider,
    permits: &Semaphore,
    timeout: Duration,
    work: F,
) -> Result<String>
where
    F: Future<Output = Result<String>>,
{
    let deadline = Instant::now() + timeout;

    let job = async {
        let _permit = permits
            .acquire()
            .await
            .map_err(|_| DigestError::Config(format!("{} permit pool is closed", provider)))?;
        debug!("{} permit acquired, {} left", provider, permits.available_permits());
        work.await
    };

    let output = tokio::time::timeout_at(deadline, job)
        .await
        .map_err(|_| DigestError::Timeout {
            provider,
            seconds: timeout.as_secs(),
        })??;

    if output.trim().is_empty() {
        return Err(DigestError::EmptyResult { provider });
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every request after a short delay and records the highest
    /// number of requests it saw at once.
    #[derive(Default)]
    struct CountingTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        total: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn post_json(&self, _request: HttpRequest) -> std::result::Result<serde_json::Value, TransportError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.total.fetch_add(1, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(20)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({ "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }] }))
        }
    }

    #[test]
    fn test_fallback_mapping_is_two_way() {
        for provider in Provider::ALL {
            assert_ne!(provider.fallback(), provider);
            assert_eq!(provider.fallback().fallback(), provider);
        }
    }

    #[test]
    fn test_provider_names_round_trip_through_serde() {
        assert_eq!(serde_json::to_string(&Provider::OpenAi).unwrap(), "\"openai\"");
        let parsed: Provider = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(parsed, Provider::Gemini);
    }

    #[tokio::test]
    async fn test_run_job_reports_empty_output() {
        let permits = Semaphore::new(1);
        let err = run_job(Provider::Gemini, &permits, Duration::from_secs(5), async {
            Ok("  \n".to_string())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DigestError::EmptyResult { provider: Provider::Gemini }));
        assert_eq!(permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_run_job_times_out_waiting_for_permit() {
        let permits = Semaphore::new(1);
        let _held = permits.acquire().await.unwrap();

        let err = run_job(Provider::OpenAi, &permits, Duration::from_millis(50), async {
            Ok("never".to_string())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DigestError::Timeout { provider: Provider::OpenAi, .. }));
    }

    #[tokio::test]
    async fn test_run_job_releases_permit_on_error() {
        let permits = Semaphore::new(2);
        let result = run_job(Provider::Gemini, &permits, Duration::from_secs(5), async {
            Err(DigestError::transport(Provider::Gemini, "boom"))
        })
        .await;
        assert!(matches!(result, Err(DigestError::Transport { .. })));
        assert_eq!(permits.available_permits(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_permit_pool_caps_requests_across_jobs() {
        let mut config = Config::default();
        config.gemini.max_concurrent_requests = 2;
        config.gemini.max_input_tokens = 4;
        let config = Arc::new(config);

        let transport = Arc::new(CountingTransport::default());
        let factory = Arc::new(HttpAnalyzerFactory::new(
            Arc::clone(&config),
            PermitPool::from_config(&config),
            Arc::clone(&transport) as Arc<dyn Transport>,
        ));

        let mut jobs = tokio::task::JoinSet::new();
        for _ in 0..6 {
            let factory = Arc::clone(&factory);
            jobs.spawn(async move {
                let analyzer = factory.create(Provider::Gemini)?;
                analyzer.analyze("P", "one two three four five six").await
            });
        }
        while let Some(joined) = jobs.join_next().await {
            assert!(joined.unwrap().is_ok());
        }

        let peak = transport.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 2, "peak in-flight requests was {}", peak);
        assert!(transport.total.load(Ordering::SeqCst) >= 6);
    }
}
