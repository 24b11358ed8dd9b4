use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::analyze::{analyze_with_fallback, Analysis, AnalyzerFactory, HttpAnalyzerFactory, Provider};
use crate::config::Config;
use crate::error::{DigestError, Result};
use crate::output::{save_analysis, OutputPaths};
use crate::subtitle::{is_supported, parse_subtitle_file};

/// Outcome of one parsed, analyzed and saved subtitle file.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub input: PathBuf,
    pub analysis: Analysis,
    pub outputs: OutputPaths,
}

/// Summary of a directory run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<JobReport>,
    pub failed: Vec<(PathBuf, DigestError)>,
}

/// Parse, analyze and save pipeline. Cheap to clone; clones share the
/// provider permit pool.
#[derive(Clone)]
pub struct Workflow {
    config: Arc<Config>,
    factory: Arc<dyn AnalyzerFactory>,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let factory = HttpAnalyzerFactory::from_config(Arc::clone(&config))?;
        Ok(Self::with_factory(config, Arc::new(factory)))
    }

    pub fn with_factory(config: Arc<Config>, factory: Arc<dyn AnalyzerFactory>) -> Self {
        Self { config, factory }
    }

    /// Process one subtitle file. Output files are only written once the
    /// analysis succeeded.
    pub async fn process_file<P: AsRef<Path>>(&self, input: P, provider: Provider) -> Result<JobReport> {
        let input = input.as_ref();
        info!("Processing subtitle file: {}", input.display());

        let transcript = parse_subtitle_file(input).await?;
        info!("Transcript has {} characters", transcript.chars().count());

        let analysis =
            analyze_with_fallback(self.factory.as_ref(), provider, &self.config.prompt, &transcript).await?;
        let outputs = save_analysis(input, &transcript, &analysis.text).await?;

        Ok(JobReport {
            input: input.to_path_buf(),
            analysis,
            outputs,
        })
    }

    /// Process every supported subtitle file below `dir` concurrently. The
    /// provider permit pool bounds how many requests are in flight.
    pub async fn process_directory<P: AsRef<Path>>(&self, dir: P, provider: Provider) -> Result<BatchReport> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(DigestError::Config(format!("{} is not a directory", dir.display())));
        }

        let files = find_subtitle_files(dir);
        info!("Found {} subtitle files in {}", files.len(), dir.display());

        let progress = ProgressBar::new(files.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut pending: BTreeSet<PathBuf> = files.iter().cloned().collect();
        let mut jobs = JoinSet::new();
        for file in files {
            let workflow = self.clone();
            jobs.spawn(async move {
                let result = workflow.process_file(&file, provider).await;
                (file, result)
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok((file, Ok(job))) => {
                    pending.remove(&file);
                    progress.set_message(format!("{}", job.input.display()));
                    report.succeeded.push(job);
                }
                Ok((file, Err(e))) => {
                    pending.remove(&file);
                    warn!("Failed to process {}: {}", file.display(), e);
                    report.failed.push((file, e));
                }
                Err(e) => warn!("Batch job panicked or was cancelled: {}", e),
            }
            progress.inc(1);
        }
        progress.finish_with_message("done");

        // Jobs that never reported back still count as failures.
        for file in pending {
            report
                .failed
                .push((file, DigestError::Task("job panicked or was cancelled".to_string())));
        }

        info!(
            "Batch finished: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

/// Supported subtitle files below `dir`, sorted for a stable order.
pub fn find_subtitle_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_supported(p))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_subtitle_files_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("season1");
        std::fs::create_dir_all(&nested).unwrap();
        for name in ["b.srt", "a.json", "notes.md", "movie.mp4"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        std::fs::write(nested.join("c.TXT"), "x").unwrap();

        let files = find_subtitle_files(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.srt", "c.TXT"]);
    }
}
