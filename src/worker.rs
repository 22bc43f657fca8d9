//! Per-repository sync step
//!
//! A [`SyncWorker`] takes one project through two milestones, each attempted
//! at most once per run:
//!
//! 1. **merge**: fetch the tag from upstream and merge `FETCH_HEAD`, unless
//!    the checkpoint already records the project as merged;
//! 2. **publish**: when requested, push `HEAD` to the publish remote, provided
//!    the project is merged.
//!
//! Each success is written to the shared checkpoint immediately. A failure is
//! logged with the captured error text and leaves the checkpoint untouched,
//! so the next resumed run retries it.

use std::path::{Path, PathBuf};

use log::{error, info};

use crate::checkpoint::SharedCheckpoints;
use crate::config::{remote_url, Config};
use crate::error::Result;
use crate::registry::{project_dir, Project};
use crate::vcs::Vcs;

/// What happened to one milestone of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Not asked for in this run.
    NotRequested,
    /// The checkpoint already records it.
    AlreadyDone,
    Succeeded,
    /// Attempted and failed; carries the reason.
    Failed(String),
    /// Not attempted because an earlier milestone failed.
    Skipped,
}

impl StepStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepStatus::Failed(_))
    }
}

/// Result of syncing one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectOutcome {
    pub path: String,
    pub merge: StepStatus,
    pub publish: StepStatus,
}

impl ProjectOutcome {
    pub fn is_failure(&self) -> bool {
        self.merge.is_failure() || self.publish.is_failure()
    }
}

/// Settings shared by every project of a batch.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Upstream reference to merge.
    pub tag: String,
    /// Push after merging.
    pub publish: bool,
    pub upstream_url: String,
    pub remote_url: String,
    pub remote_branch: String,
}

impl SyncOptions {
    pub fn from_config(config: &Config, tag: &str, publish: bool) -> Self {
        Self {
            tag: tag.to_string(),
            publish,
            upstream_url: config.upstream_url.clone(),
            remote_url: config.remote_url.clone(),
            remote_branch: config.remote_branch.clone(),
        }
    }
}

/// Runs the merge and publish milestones for projects of one tree.
pub struct SyncWorker<'a> {
    root: PathBuf,
    vcs: &'a dyn Vcs,
    checkpoints: &'a SharedCheckpoints,
    options: &'a SyncOptions,
}

impl<'a> SyncWorker<'a> {
    pub fn new(
        root: &Path,
        vcs: &'a dyn Vcs,
        checkpoints: &'a SharedCheckpoints,
        options: &'a SyncOptions,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            vcs,
            checkpoints,
            options,
        }
    }

    /// Sync one project.
    ///
    /// Only failures to launch a command, or a poisoned checkpoint lock, are
    /// returned as errors.
    pub fn sync(&self, project: &Project) -> Result<ProjectOutcome> {
        let dir = project_dir(&self.root, &project.path);
        let state = self.checkpoints.get(&project.path)?;

        let merge = if state.merged {
            StepStatus::AlreadyDone
        } else {
            let status = fetch_and_merge(
                self.vcs,
                &dir,
                &project.path,
                &remote_url(&self.options.upstream_url, &project.upstream_name),
                &self.options.tag,
            )?;
            if status == StepStatus::Succeeded {
                self.checkpoints
                    .update(&project.path, true, state.published)?;
            }
            status
        };

        let publish = if !self.options.publish {
            StepStatus::NotRequested
        } else if merge.is_failure() {
            StepStatus::Skipped
        } else {
            let status = push(
                self.vcs,
                &dir,
                &project.path,
                &remote_url(&self.options.remote_url, &project.name),
                &self.options.remote_branch,
            )?;
            if status == StepStatus::Succeeded {
                self.checkpoints.update(&project.path, true, true)?;
            }
            status
        };

        Ok(ProjectOutcome {
            path: project.path.clone(),
            merge,
            publish,
        })
    }
}

/// Fetch `reference` from `url` into the checkout at `dir` and merge it.
///
/// `label` names the repository in log messages.
pub fn fetch_and_merge(
    vcs: &dyn Vcs,
    dir: &Path,
    label: &str,
    url: &str,
    reference: &str,
) -> Result<StepStatus> {
    let fetch = vcs.fetch(dir, url, reference)?;
    if !fetch.success() {
        let reason = fetch.failure_reason();
        error!("Fetching {} for {} failed, reason: {}", reference, label, reason);
        return Ok(StepStatus::Failed(reason));
    }

    let merge = vcs.merge_fetched(dir)?;
    if !merge.success() {
        let reason = merge.failure_reason();
        error!("Merge failed for {}, reason: {}", label, reason);
        return Ok(StepStatus::Failed(reason));
    }

    info!("Merged {} in {}", reference, label);
    Ok(StepStatus::Succeeded)
}

/// Push `HEAD` of the checkout at `dir` to `branch` at `url`.
pub fn push(
    vcs: &dyn Vcs,
    dir: &Path,
    label: &str,
    url: &str,
    branch: &str,
) -> Result<StepStatus> {
    let out = vcs.push(dir, url, branch)?;
    if !out.success() {
        let reason = out.failure_reason();
        error!("Failed to push {}, reason: {}", label, reason);
        return Ok(StepStatus::Failed(reason));
    }
    info!("Pushed {}", label);
    Ok(StepStatus::Succeeded)
}
