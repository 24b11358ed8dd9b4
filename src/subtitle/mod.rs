// Subtitle parsing
//
// A parser is selected per file, never by the user:
// - `.srt` / `.txt`: line parser
// - `.json`: old list schema if it decodes, otherwise the new `body` schema

pub mod json;
pub mod srt;

use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{DigestError, Result};

pub use json::{NewJsonParser, OldJsonParser, SubtitleEntry};
pub use srt::LineParser;

/// Turns raw subtitle bytes into a flattened transcript.
pub trait SubtitleParser: Send + Sync {
    /// Human readable format name, used in logs
    fn name(&self) -> &'static str;

    fn parse(&self, path: &Path, data: &[u8]) -> Result<String>;
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Whether the file extension is one the parser understands.
pub fn is_supported(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("srt" | "txt" | "json"))
}

/// Select the parser for `path`, probing JSON content to tell the schemas apart.
pub fn select_parser(path: &Path, data: &[u8]) -> Result<Box<dyn SubtitleParser>> {
    match extension(path).as_deref() {
        Some("srt" | "txt") => Ok(Box::new(LineParser)),
        Some("json") => {
            let old_err = match json::decode_old(data) {
                Ok(_) => return Ok(Box::new(OldJsonParser)),
                Err(e) => e,
            };
            debug!("{} is not a list of entries: {}", path.display(), old_err);

            match json::decode_new(data) {
                Ok(_) => Ok(Box::new(NewJsonParser)),
                Err(new_err) => Err(DigestError::decode(
                    path,
                    format!("old schema: {}; new schema: {}", old_err, new_err),
                )),
            }
        }
        _ => Err(DigestError::UnsupportedFormat(format!(
            "{} (expected .srt, .txt or .json)",
            path.display()
        ))),
    }
}

/// Parse already loaded subtitle bytes.
pub fn parse(path: &Path, data: &[u8]) -> Result<String> {
    let parser = select_parser(path, data)?;
    info!("Parsing {} as {}", path.display(), parser.name());
    parser.parse(path, data)
}

/// Read and parse a subtitle file from disk.
pub async fn parse_subtitle_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    if !is_supported(path) {
        return Err(DigestError::UnsupportedFormat(format!(
            "{} (expected .srt, .txt or .json)",
            path.display()
        )));
    }

    let data = fs::read(path).await.map_err(|e| DigestError::io(path, e))?;
    parse(path, &data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selects_by_extension_and_schema() {
        let list = br#"[{"content":"a"}]"#;
        let body = br#"{"body":[{"content":"a"}]}"#;

        assert_eq!(select_parser(Path::new("a.srt"), b"").unwrap().name(), "srt/txt");
        assert_eq!(select_parser(Path::new("a.TXT"), b"").unwrap().name(), "srt/txt");
        assert_eq!(select_parser(Path::new("a.json"), list).unwrap().name(), "json (list)");
        assert_eq!(select_parser(Path::new("a.json"), body).unwrap().name(), "json (body)");
    }

    #[test]
    fn test_unsupported_extension() {
        let err = select_parser(Path::new("movie.ass"), b"").err().unwrap();
        assert!(matches!(err, DigestError::UnsupportedFormat(_)));
        assert!(select_parser(Path::new("noextension"), b"").is_err());
    }

    #[test]
    fn test_json_matching_neither_schema_reports_both() {
        let err = parse(Path::new("broken.json"), br#"{"lines": []}"#).unwrap_err();
        match err {
            DigestError::Decode { path, message } => {
                assert_eq!(path, Path::new("broken.json"));
                assert!(message.contains("old schema"));
                assert!(message.contains("new schema"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_json_body_scenario() {
        let transcript = parse(Path::new("clip.json"), br#"{"body":[{"content":"a"},{"content":"b"}]}"#)
            .unwrap();
        assert_eq!(transcript, "a, b");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = parse_subtitle_file("/definitely/not/here.srt").await.unwrap_err();
        assert!(matches!(err, DigestError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.srt"));
    }
}
