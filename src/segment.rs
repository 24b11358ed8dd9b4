//! Token-bounded splitting of a transcript into prompt-prefixed segments.
//!
//! The transcript is walked word by word. A segment is closed as soon as the
//! next word would push `prompt + body` over the ceiling, and a new one is
//! started from the prompt again. A single word that cannot fit even in an
//! empty segment is kept anyway so that no text is ever dropped.

use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

use crate::error::{DigestError, Result};

/// Cost function used to measure a piece of text against a token ceiling.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Cheap approximation: one token per whitespace separated word.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Exact subword count using the model's BPE encoding.
pub struct BpeCounter {
    bpe: CoreBPE,
}

impl BpeCounter {
    /// Pick the encoding for `model`, falling back to `cl100k_base` for
    /// model names the tokenizer tables do not know yet.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => {
                debug!("No tokenizer registered for {}, using cl100k_base", model);
                tiktoken_rs::cl100k_base()
                    .map_err(|e| DigestError::Config(format!("Failed to load tokenizer: {}", e)))?
            }
        };
        Ok(Self { bpe })
    }
}

impl TokenCounter for BpeCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// One chunk of transcript words that fits the ceiling together with the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Transcript words of this segment, joined by single spaces
    pub body: String,
    /// Measured cost of prompt plus body
    pub tokens: usize,
}

impl Segment {
    /// Full text sent to a provider that has no separate system message.
    pub fn with_prompt(&self, prompt: &str) -> String {
        if prompt.is_empty() {
            self.body.clone()
        } else {
            format!("{} {}", prompt, self.body)
        }
    }

    /// A segment over the ceiling can only hold a single forced word.
    pub fn is_forced(&self, max_tokens: usize) -> bool {
        self.tokens > max_tokens
    }
}

/// Splits transcripts for one provider: a ceiling plus a cost function.
pub struct Segmenter<'a> {
    max_tokens: usize,
    counter: &'a dyn TokenCounter,
}

impl<'a> Segmenter<'a> {
    pub fn new(max_tokens: usize, counter: &'a dyn TokenCounter) -> Self {
        Self {
            max_tokens,
            counter,
        }
    }

    /// Split `transcript` into segments whose cost, including `prompt`,
    /// stays within the ceiling. An empty transcript yields no segments.
    ///
    /// Each word is costed on its own, with its leading space, and added to
    /// a running total. Only when that total crosses the ceiling is the
    /// candidate body counted in full, so every segment is encoded a
    /// bounded number of times rather than once per word.
    pub fn split(&self, prompt: &str, transcript: &str) -> Vec<Segment> {
        let prompt_tokens = self.counter.count(prompt);
        let mut segments = Vec::new();
        let mut body = String::new();
        let mut body_tokens = 0;

        for word in transcript.split_whitespace() {
            if body.is_empty() {
                // An empty segment always accepts the word, even when it alone
                // overruns the ceiling.
                body.push_str(word);
                body_tokens = self.counter.count(word);
                continue;
            }

            let start = body.len();
            body.push(' ');
            body.push_str(word);

            let estimate = body_tokens + self.counter.count(&body[start..]);
            if prompt_tokens + estimate <= self.max_tokens {
                body_tokens = estimate;
                continue;
            }

            let exact = self.counter.count(&body);
            if prompt_tokens + exact <= self.max_tokens {
                body_tokens = exact;
                continue;
            }

            body.truncate(start);
            segments.push(self.close(std::mem::take(&mut body), prompt_tokens));
            body.push_str(word);
            body_tokens = self.counter.count(word);
        }

        if !body.is_empty() {
            segments.push(self.close(body, prompt_tokens));
        }

        debug!(
            "Split transcript into {} segment(s) with ceiling {}",
            segments.len(),
            self.max_tokens
        );
        segments
    }

    fn close(&self, body: String, prompt_tokens: usize) -> Segment {
        let segment = Segment {
            tokens: prompt_tokens + self.counter.count(&body),
            body,
        };
        if segment.is_forced(self.max_tokens) {
            warn!(
                "A single word costs {} tokens, over the ceiling of {}; sending it alone",
                segment.tokens, self.max_tokens
            );
        }
        segment
    }
}

/// Prompt-prefixed segment texts, in transcript order.
pub fn segment(
    prompt: &str,
    transcript: &str,
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> Vec<String> {
    Segmenter::new(max_tokens, counter)
        .split(prompt, transcript)
        .iter()
        .map(|s| s.with_prompt(prompt))
        .collect()
}
