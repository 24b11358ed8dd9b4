//! JSON subtitle schemas.
//!
//! Two incompatible layouts share the `.json` extension: the old one is a
//! bare list of entries, the new one wraps the same entries in a `body`
//! field next to styling metadata. Only `content` is used for analysis; the
//! other fields are decoded so that malformed files are rejected.

use serde::Deserialize;
use std::path::Path;

use super::SubtitleParser;
use crate::error::{DigestError, Result};

pub const CONTENT_DELIMITER: &str = ", ";

#[derive(Debug, Clone, Deserialize)]
pub struct SubtitleEntry {
    #[serde(default)]
    pub from: Option<f64>,
    #[serde(default)]
    pub to: Option<f64>,
    #[serde(default)]
    pub sid: Option<i64>,
    #[serde(default)]
    pub location: Option<i64>,
    pub content: String,
    #[serde(default)]
    pub music: Option<f64>,
}

/// Old layout: `[{"from": .., "to": .., "content": ..}, ..]`
pub type OldSubtitleFormat = Vec<SubtitleEntry>;

/// New layout: styling metadata plus a `body` list of entries.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSubtitleFormat {
    #[serde(default)]
    pub font_size: Option<f64>,
    #[serde(default)]
    pub font_color: Option<String>,
    #[serde(default)]
    pub background_alpha: Option<f64>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default, rename = "Stroke")]
    pub stroke: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub body: Vec<SubtitleEntry>,
}

pub fn decode_old(data: &[u8]) -> serde_json::Result<OldSubtitleFormat> {
    serde_json::from_slice(data)
}

pub fn decode_new(data: &[u8]) -> serde_json::Result<NewSubtitleFormat> {
    serde_json::from_slice(data)
}

fn join_contents(entries: &[SubtitleEntry]) -> String {
    entries
        .iter()
        .map(|entry| entry.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTENT_DELIMITER)
}

#[derive(Debug, Default)]
pub struct OldJsonParser;

impl SubtitleParser for OldJsonParser {
    fn name(&self) -> &'static str {
        "json (list)"
    }

    fn parse(&self, path: &Path, data: &[u8]) -> Result<String> {
        let entries = decode_old(data).map_err(|e| DigestError::decode(path, e.to_string()))?;
        Ok(join_contents(&entries))
    }
}

#[derive(Debug, Default)]
pub struct NewJsonParser;

impl SubtitleParser for NewJsonParser {
    fn name(&self) -> &'static str {
        "json (body)"
    }

    fn parse(&self, path: &Path, data: &[u8]) -> Result<String> {
        let format = decode_new(data).map_err(|e| DigestError::decode(path, e.to_string()))?;
        Ok(join_contents(&format.body))
    }
}
