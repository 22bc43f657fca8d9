//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::commands;

/// Fetch and merge an upstream tag into every repository listed in the
/// tree's manifest
#[derive(Parser, Debug)]
#[command(name = "upstream-merge")]
#[command(version, about, long_about = None)]
#[command(after_help = "Example: upstream-merge -t android-12.0.0_r2 -p")]
pub struct Cli {
    #[command(flatten)]
    pub merge: commands::merge::MergeArgs,

    /// Colorize output (always, never, auto)
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Root of the source tree (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);
        let root = match self.root {
            Some(root) => root,
            None => std::env::current_dir()?,
        };
        commands::merge::execute(self.merge, &root, &self.color)
    }
}

/// `RUST_LOG` wins over `--log-level` when both are given.
fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A second initialization (in tests) is harmless.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}
