use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::info;

use crate::error::{DigestError, Result};

/// Heading above the transcript in the analysis file ("original text").
pub const ORIGINAL_HEADING: &str = "## 原始文本：";
/// Heading above the model output in the analysis file ("generated text").
pub const GENERATED_HEADING: &str = "## 生成文本：";

/// Markdown files written beside a subtitle file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// Transcript only
    pub original: PathBuf,
    /// Transcript followed by the analysis
    pub analysis: PathBuf,
}

impl OutputPaths {
    /// `<dir>/<stem>original.md` and `<dir>/<stem>analysis.md` for `input`.
    pub fn for_input(input: &Path) -> Self {
        let dir = input.parent().unwrap_or_else(|| Path::new(""));
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            original: dir.join(format!("{}original.md", stem)),
            analysis: dir.join(format!("{}analysis.md", stem)),
        }
    }
}

pub fn render_analysis(transcript: &str, result: &str) -> String {
    format!(
        "{}\n\n{}\n\n{}\n\n{}",
        ORIGINAL_HEADING, transcript, GENERATED_HEADING, result
    )
}

/// Write the transcript and the analysis next to `input`.
pub async fn save_analysis(input: &Path, transcript: &str, result: &str) -> Result<OutputPaths> {
    let paths = OutputPaths::for_input(input);

    fs::write(&paths.original, transcript)
        .await
        .map_err(|e| DigestError::io(&paths.original, e))?;
    fs::write(&paths.analysis, render_analysis(transcript, result))
        .await
        .map_err(|e| DigestError::io(&paths.analysis, e))?;

    info!("Wrote {} and {}", paths.original.display(), paths.analysis.display());
    Ok(paths)
}

/// Open `dir` in the platform file manager without waiting for it.
pub fn open_directory(dir: &Path) -> Result<()> {
    let program = if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };

    Command::new(program)
        .arg(dir)
        .spawn()
        .map(|_| ())
        .map_err(|e| DigestError::io(dir, e))
}
