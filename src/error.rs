use std::path::PathBuf;

use thiserror::Error;

use crate::analyze::Provider;

#[derive(Error, Debug)]
pub enum DigestError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode JSON subtitles in {}: {message}", .path.display())]
    Decode { path: PathBuf, message: String },

    #[error("{provider} transport error: {message}")]
    Transport { provider: Provider, message: String },

    #[error("{provider} request timed out after {seconds}s")]
    Timeout { provider: Provider, seconds: u64 },

    #[error("{provider} returned an empty analysis")]
    EmptyResult { provider: Provider },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("{primary} failed ({primary_cause}); fallback {fallback} failed: {source}")]
    Fallback {
        primary: Provider,
        primary_cause: String,
        fallback: Provider,
        #[source]
        source: Box<DigestError>,
    },
}

impl DigestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn transport(provider: Provider, message: impl Into<String>) -> Self {
        Self::Transport {
            provider,
            message: message.into(),
        }
    }

    /// Short label used when logging why a provider attempt failed.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::UnsupportedFormat(_) | Self::Decode { .. } => "format",
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::EmptyResult { .. } => "empty-result",
            Self::Config(_) => "config",
            Self::Task(_) => "task",
            Self::Fallback { .. } => "fallback",
        }
    }
}

pub type Result<T> = std::result::Result<T, DigestError>;
