//! Command line arguments

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Download the audio of a video or playlist", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download and convert every track behind a link
    Download {
        /// Video or playlist link
        url: String,

        /// 1-based format number, see `tune-fetch formats`
        #[arg(short, long)]
        format: Option<i64>,

        /// Root folder for this run instead of the configured one
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the available audio formats
    Formats,

    /// Show or change persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the current settings
    Show,
    /// Persist one setting
    Set { key: String, value: String },
}
