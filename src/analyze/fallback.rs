//! Primary/fallback sequencing of the two providers.
//!
//! At most two attempts are made per job: the primary provider, then its
//! fixed alternate. The primary is never retried.

use tracing::{debug, info, warn};

use super::{AnalyzerFactory, Provider};
use crate::error::{DigestError, Result};

/// A successful analysis and the provider that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub provider: Provider,
    pub text: String,
    /// Whether the primary provider failed and the alternate answered
    pub fell_back: bool,
}

async fn attempt(
    factory: &dyn AnalyzerFactory,
    provider: Provider,
    prompt: &str,
    transcript: &str,
) -> Result<String> {
    let analyzer = factory.create(provider)?;
    debug!("Starting analysis attempt with {}", analyzer.provider());
    let text = analyzer.analyze(prompt, transcript).await?;
    if text.trim().is_empty() {
        return Err(DigestError::EmptyResult {
            provider: analyzer.provider(),
        });
    }
    Ok(text)
}

/// Analyze with `primary`, retrying once on the alternate provider when the
/// primary errors or produces nothing.
pub async fn analyze_with_fallback(
    factory: &dyn AnalyzerFactory,
    primary: Provider,
    prompt: &str,
    transcript: &str,
) -> Result<Analysis> {
    let primary_err = match attempt(factory, primary, prompt, transcript).await {
        Ok(text) => {
            info!("Analysis completed by {}", primary);
            return Ok(Analysis {
                provider: primary,
                text,
                fell_back: false,
            });
        }
        Err(e) => e,
    };

    let fallback = primary.fallback();
    match &primary_err {
        DigestError::EmptyResult { .. } => {
            warn!("Primary provider {} returned an empty result, switching to {}", primary, fallback)
        }
        other => warn!(
            "Primary provider {} failed ({}): {}. Switching to {}",
            primary,
            other.kind(),
            other,
            fallback
        ),
    }

    match attempt(factory, fallback, prompt, transcript).await {
        Ok(text) => {
            info!("Analysis completed by fallback provider {}", fallback);
            Ok(Analysis {
                provider: fallback,
                text,
                fell_back: true,
            })
        }
        Err(e) => Err(DigestError::Fallback {
            primary,
            primary_cause: primary_err.to_string(),
            fallback,
            source: Box::new(e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::Analyzer;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    enum Scripted {
        Text(&'static str),
        Transport,
        Timeout,
    }

    struct ScriptedAnalyzer {
        provider: Provider,
        outcome: Scripted,
    }

    #[async_trait]
    impl Analyzer for ScriptedAnalyzer {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn analyze(&self, prompt: &str, transcript: &str) -> Result<String> {
            assert_eq!(prompt, "P");
            assert_eq!(transcript, "t1 t2");
            match self.outcome {
                Scripted::Text(text) => Ok(text.to_string()),
                Scripted::Transport => Err(DigestError::transport(self.provider, "connection reset")),
                Scripted::Timeout => Err(DigestError::Timeout {
                    provider: self.provider,
                    seconds: 30,
                }),
            }
        }
    }

    #[derive(Default)]
    struct ScriptedFactory {
        outcomes: HashMap<Provider, Scripted>,
        calls: Arc<Mutex<Vec<Provider>>>,
    }

    impl ScriptedFactory {
        fn with(mut self, provider: Provider, outcome: Scripted) -> Self {
            self.outcomes.insert(provider, outcome);
            self
        }

        fn calls(&self) -> Vec<Provider> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AnalyzerFactory for ScriptedFactory {
        fn create(&self, provider: Provider) -> Result<Box<dyn Analyzer>> {
            self.calls.lock().unwrap().push(provider);
            let outcome = self
                .outcomes
                .get(&provider)
                .cloned()
                .ok_or_else(|| DigestError::Config(format!("{} is not configured", provider)))?;
            Ok(Box::new(ScriptedAnalyzer { provider, outcome }))
        }
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let factory = ScriptedFactory::default()
            .with(Provider::Gemini, Scripted::Text("from gemini"))
            .with(Provider::OpenAi, Scripted::Text("from openai"));

        let analysis = analyze_with_fallback(&factory, Provider::Gemini, "P", "t1 t2").await.unwrap();
        assert_eq!(analysis.text, "from gemini");
        assert!(!analysis.fell_back);
        assert_eq!(factory.calls(), vec![Provider::Gemini]);
    }

    #[tokio::test]
    async fn test_transport_error_falls_back_once() {
        let factory = ScriptedFactory::default()
            .with(Provider::Gemini, Scripted::Transport)
            .with(Provider::OpenAi, Scripted::Text("from openai"));

        let analysis = analyze_with_fallback(&factory, Provider::Gemini, "P", "t1 t2").await.unwrap();
        assert_eq!(
            analysis,
            Analysis {
                provider: Provider::OpenAi,
                text: "from openai".to_string(),
                fell_back: true,
            }
        );
        assert_eq!(factory.calls(), vec![Provider::Gemini, Provider::OpenAi]);
    }

    #[tokio::test]
    async fn test_empty_primary_result_falls_back() {
        let factory = ScriptedFactory::default()
            .with(Provider::OpenAi, Scripted::Text(""))
            .with(Provider::Gemini, Scripted::Text("from gemini"));

        let analysis = analyze_with_fallback(&factory, Provider::OpenAi, "P", "t1 t2").await.unwrap();
        assert_eq!(analysis.provider, Provider::Gemini);
        assert_eq!(factory.calls(), vec![Provider::OpenAi, Provider::Gemini]);
    }

    #[tokio::test]
    async fn test_fallback_result_matches_direct_call() {
        let factory = ScriptedFactory::default()
            .with(Provider::Gemini, Scripted::Timeout)
            .with(Provider::OpenAi, Scripted::Text("direct"));

        let direct = factory
            .create(Provider::OpenAi)
            .unwrap()
            .analyze("P", "t1 t2")
            .await
            .unwrap();
        let analysis = analyze_with_fallback(&factory, Provider::Gemini, "P", "t1 t2").await.unwrap();
        assert_eq!(analysis.text, direct);
    }

    #[tokio::test]
    async fn test_both_failures_name_both_providers() {
        let factory = ScriptedFactory::default()
            .with(Provider::Gemini, Scripted::Timeout)
            .with(Provider::OpenAi, Scripted::Transport);

        let err = analyze_with_fallback(&factory, Provider::Gemini, "P", "t1 t2").await.unwrap_err();
        match &err {
            DigestError::Fallback {
                primary,
                fallback,
                source,
                ..
            } => {
                assert_eq!(*primary, Provider::Gemini);
                assert_eq!(*fallback, Provider::OpenAi);
                assert!(matches!(**source, DigestError::Transport { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("gemini") && message.contains("openai"));
        assert_eq!(factory.calls(), vec![Provider::Gemini, Provider::OpenAi]);
    }

    #[tokio::test]
    async fn test_unconstructible_primary_still_falls_back() {
        let factory = ScriptedFactory::default().with(Provider::Gemini, Scripted::Text("rescued"));

        let analysis = analyze_with_fallback(&factory, Provider::OpenAi, "P", "t1 t2").await.unwrap();
        assert_eq!(analysis.text, "rescued");
        assert_eq!(factory.calls(), vec![Provider::OpenAi, Provider::Gemini]);
    }
}
