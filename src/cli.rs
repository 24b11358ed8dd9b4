use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::analyze::Provider;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a single subtitle file (.srt, .txt or .json)
    Analyze {
        /// Subtitle file; asked for interactively when omitted
        input: Option<PathBuf>,

        /// Provider tried first (the other one is the fallback)
        #[arg(short, long, value_enum)]
        provider: Option<Provider>,

        /// Override the analysis prompt
        #[arg(long)]
        prompt: Option<String>,

        /// Open the output directory when done
        #[arg(long)]
        open: bool,
    },

    /// Analyze every subtitle file in a directory
    Batch {
        /// Directory searched recursively for subtitle files
        input_dir: PathBuf,

        /// Provider tried first (the other one is the fallback)
        #[arg(short, long, value_enum)]
        provider: Option<Provider>,

        /// Override the analysis prompt
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Print the transcript extracted from a subtitle file
    Transcript {
        /// Subtitle file
        input: PathBuf,
    },

    /// Write the default configuration as TOML
    InitConfig {
        /// Destination file
        #[arg(default_value = "subdigest.toml")]
        output: PathBuf,
    },
}
