//! Subdigest - Subtitle Transcript Analysis
//!
//! Parses subtitle files into a flat transcript, splits it into
//! token-bounded segments and analyzes them with a generative model,
//! falling back to a second provider when the first one fails.

pub mod analyze;
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod segment;
pub mod subtitle;
pub mod workflow;
