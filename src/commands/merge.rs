//! Merge command implementation
//!
//! Runs one merge of an upstream reference across the tree:
//! 1. Load and validate the configuration
//! 2. Resolve projects from the manifest and exclusion list
//! 3. Fetch, merge and optionally push each project concurrently
//! 4. Save the checkpoint and sync the manifest repository
//! 5. Optionally bump the version file
//!
//! Per-project failures are reported in the summary and do not change the
//! exit code. Only fatal errors make the command fail.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use upstream_merge::config::{Config, CONFIG_FILE_NAME};
use upstream_merge::output::{render_summary, OutputConfig};
use upstream_merge::pipeline::{MergeRequest, RunContext};
use upstream_merge::vcs::GitCli;

/// Arguments for a merge run
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Upstream tag or reference to merge
    #[arg(short, long, value_name = "TAG")]
    pub tag: String,

    /// Push every successfully merged repository
    #[arg(short, long)]
    pub push: bool,

    /// Bump the minor version and commit it after the merge
    #[arg(short, long)]
    pub bump: bool,

    /// Resume from the saved checkpoint instead of starting over
    #[arg(short = 'c', long = "continue")]
    pub resume: bool,

    /// Number of repositories merged concurrently
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub jobs: Option<u32>,

    /// Path to config file
    #[arg(long, value_name = "PATH", env = "UPSTREAM_MERGE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Execute the merge command
pub fn execute(args: MergeArgs, root: &Path, color: &str) -> Result<()> {
    let config = Config::load(root, args.config.as_deref())?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| root.join(CONFIG_FILE_NAME));
    config.validate(&config_path, args.push)?;

    let request = MergeRequest {
        tag: args.tag,
        publish: args.push,
        bump: args.bump,
        resume: args.resume,
        jobs: args.jobs.map(|jobs| jobs as usize),
    };

    let vcs = GitCli::new(config.timeout());
    let summary = RunContext::new(root, &config, &vcs)
        .execute(&request)
        .with_context(|| format!("Merge of {} aborted", request.tag))?;

    let output = OutputConfig::from_env_and_flag(color);
    print!("{}", render_summary(&summary, &output));
    Ok(())
}
