//! Subdigest - Subtitle Transcript Analysis
//!
//! Entry point: parses a subtitle file, analyzes the transcript with the
//! configured provider (falling back to the other one) and writes the
//! markdown results beside the input.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subdigest::cli::{Args, Commands};
use subdigest::config::Config;
use subdigest::output::open_directory;
use subdigest::subtitle::parse_subtitle_file;
use subdigest::workflow::Workflow;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = setup_logging(args.verbose) {
        eprintln!("{:#}", e);
    }

    // Every failure kind ends the process the same way.
    if let Err(e) = run(args).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.apply_env();

    match args.command {
        Commands::Analyze {
            input,
            provider,
            prompt,
            open,
        } => {
            let input = match input {
                Some(path) => path,
                None => prompt_for_path().await?,
            };
            if let Some(prompt) = prompt {
                config.prompt = prompt;
            }
            let provider = provider.unwrap_or(config.default_provider);

            let workflow = Workflow::new(config)?;
            let report = workflow
                .process_file(&input, provider)
                .await
                .with_context(|| format!("Error processing subtitles {}", input.display()))?;

            println!("{}", report.outputs.original.display());
            println!("{}", report.outputs.analysis.display());

            if open {
                let dir = report
                    .outputs
                    .analysis
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                open_directory(&dir)
                    .with_context(|| format!("Failed to open directory {}", dir.display()))?;
            }
        }
        Commands::Batch {
            input_dir,
            provider,
            prompt,
        } => {
            if let Some(prompt) = prompt {
                config.prompt = prompt;
            }
            let provider = provider.unwrap_or(config.default_provider);

            let workflow = Workflow::new(config)?;
            let report = workflow.process_directory(&input_dir, provider).await?;

            for job in &report.succeeded {
                println!("{} ({})", job.outputs.analysis.display(), job.analysis.provider);
            }
            if !report.failed.is_empty() {
                for (file, e) in &report.failed {
                    eprintln!("{}: {}", file.display(), e);
                }
                anyhow::bail!("{} of {} files failed", report.failed.len(), report.failed.len() + report.succeeded.len());
            }
        }
        Commands::Transcript { input } => {
            let transcript = parse_subtitle_file(&input).await?;
            println!("{}", transcript);
        }
        Commands::InitConfig { output } => {
            Config::default().save_to_file(&output)?;
            info!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => {
            if Path::new("subdigest.toml").exists() {
                info!("Found subdigest.toml in current directory, loading...");
                Config::from_file("subdigest.toml")?
            } else {
                Config::default()
            }
        }
    };
    Ok(config)
}

/// Ask for the subtitle file on stdin.
async fn prompt_for_path() -> Result<PathBuf> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Subtitle file (.srt, .txt, .json): ").await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

    let path = line.trim().trim_matches('"');
    if path.is_empty() {
        anyhow::bail!("No file selected.");
    }
    Ok(PathBuf::from(path))
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".subdigest").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "subdigest.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("subdigest.log").display()
    );
    Ok(())
}
