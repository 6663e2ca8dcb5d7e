use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "compute-engine")]
#[command(about = "Process analysis reports into measures, issues and history", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit reports and process them until the queue is empty
    Run {
        /// Scanner report files (JSON)
        #[arg(short, long = "report", required = true, num_args = 1..)]
        reports: Vec<PathBuf>,

        /// Configuration file (defaults to the nearest .compute-engine.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Storage state file, loaded before and saved after the run
        #[arg(short, long, env = "CE_STATE")]
        state: Option<PathBuf>,

        /// Number of workers (overrides the configuration)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Log step and purge timings
        #[arg(long)]
        profile: bool,

        /// Increase verbosity (-v, -vv)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },

    /// Validate the configuration and print the effective settings
    CheckConfig {
        /// Configuration file (defaults to the nearest .compute-engine.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Increase verbosity (-v, -vv)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },
}
