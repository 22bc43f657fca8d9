//! Orchestrator for a complete merge run
//!
//! This module threads one run through its phases in a fixed order:
//!
//! 1. Resolve the project list from the manifest and exclusion list, keeping
//!    only valid checkouts.
//! 2. Load the checkpoint (resume) or discard a stale one (fresh run), and drop
//!    projects that are already merged and published.
//! 3. Run the concurrent batch of sync workers and wait for it.
//! 4. Persist the checkpoint map once.
//! 5. Merge (and publish) the manifest repository itself.
//! 6. Optionally bump the minor version, publishing the version repository
//!    when publishing was requested.
//!
//! Steps 5 and 6 only start after the batch has fully returned.

use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::bump::{bump_version_file, VersionBump};
use crate::checkpoint::{CheckpointMap, CheckpointStore, SharedCheckpoints};
use crate::config::{remote_url, Config};
use crate::error::Result;
use crate::registry::{self, project_dir, Project};
use crate::scheduler::{available_parallelism, BatchReport, BatchScheduler};
use crate::vcs::Vcs;
use crate::worker::{self, ProjectOutcome, StepStatus, SyncOptions, SyncWorker};

/// What the operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    /// Upstream reference to merge.
    pub tag: String,
    /// Push each merged repository.
    pub publish: bool,
    /// Bump the minor version afterward.
    pub bump: bool,
    /// Continue from the persisted checkpoint.
    pub resume: bool,
    /// Concurrency hint overriding the configuration.
    pub jobs: Option<usize>,
}

impl MergeRequest {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            publish: false,
            bump: false,
            resume: false,
            jobs: None,
        }
    }
}

/// Everything a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub tag: String,
    /// Projects left out because the checkpoint records them as done.
    pub already_done: Vec<String>,
    /// Outcomes of the concurrent batch.
    pub batch: BatchReport,
    /// Whether the checkpoint file was written.
    pub checkpoint_saved: bool,
    /// Outcome of the manifest repository sync.
    pub manifest_repo: ProjectOutcome,
    /// The version bump, when requested.
    pub version_bump: Option<VersionBump>,
    /// Push of the version repository after a bump.
    pub version_publish: StepStatus,
}

impl RunSummary {
    /// Whether any repository failed to merge or publish.
    pub fn has_failures(&self) -> bool {
        self.batch.failures().next().is_some()
            || self.manifest_repo.is_failure()
            || self.version_publish.is_failure()
    }
}

/// State of one run, constructed at its start.
pub struct RunContext<'a> {
    root: PathBuf,
    config: &'a Config,
    vcs: &'a dyn Vcs,
}

impl<'a> RunContext<'a> {
    pub fn new(root: &Path, config: &'a Config, vcs: &'a dyn Vcs) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            vcs,
        }
    }

    /// Execute a merge run.
    pub fn execute(&self, request: &MergeRequest) -> Result<RunSummary> {
        let store = CheckpointStore::new(self.root.join(&self.config.checkpoint_file));
        let loaded = if request.resume {
            store.load()
        } else {
            if let Err(e) = store.clear() {
                warn!("Failed to remove stale checkpoint: {}", e);
            }
            CheckpointMap::new()
        };

        info!("Kicking off merge with tag {}", request.tag);
        let projects = registry::load_projects(&self.root, self.config)?;
        let projects = registry::retain_repositories(projects, self.vcs, &self.root)?;
        let (already_done, pending) = split_done(projects, &loaded);
        if !already_done.is_empty() {
            info!(
                "Skipping {} projects already merged and pushed",
                already_done.len()
            );
        }

        let options = SyncOptions::from_config(self.config, &request.tag, request.publish);
        let checkpoints = SharedCheckpoints::new(loaded);
        let batch = {
            let worker = SyncWorker::new(&self.root, self.vcs, &checkpoints, &options);
            let hint = request
                .jobs
                .or(self.config.jobs)
                .unwrap_or_else(available_parallelism);
            BatchScheduler::new(hint).run(&pending, &worker)?
        };

        let map = checkpoints.into_inner()?;
        let checkpoint_saved = !map.is_empty() && self.save_checkpoint(&store, &map);

        let manifest_repo = self.sync_manifest_repo(&options)?;

        let (version_bump, version_publish) = if request.bump {
            let bump = bump_version_file(&self.root, &self.config.version, self.vcs)?;
            let publish = if !request.publish {
                StepStatus::NotRequested
            } else if !bump.committed {
                StepStatus::Skipped
            } else {
                worker::push(
                    self.vcs,
                    &project_dir(&self.root, &self.config.version.repo_path),
                    &self.config.version.repo_path,
                    &remote_url(&options.remote_url, &self.config.version.repo_name),
                    &options.remote_branch,
                )?
            };
            (Some(bump), publish)
        } else {
            (None, StepStatus::NotRequested)
        };

        Ok(RunSummary {
            tag: request.tag.clone(),
            already_done,
            batch,
            checkpoint_saved,
            manifest_repo,
            version_bump,
            version_publish,
        })
    }

    fn save_checkpoint(&self, store: &CheckpointStore, map: &CheckpointMap) -> bool {
        match store.save(map) {
            Ok(()) => {
                info!(
                    "Saved checkpoint for {} projects to {}",
                    map.len(),
                    store.path().display()
                );
                true
            }
            Err(e) => {
                error!("Failed to save checkpoint {}: {}", store.path().display(), e);
                false
            }
        }
    }

    /// Merge the manifest repository. It is not part of the batch and is
    /// never checkpointed.
    fn sync_manifest_repo(&self, options: &SyncOptions) -> Result<ProjectOutcome> {
        let repo = &self.config.manifest_repo;
        let dir = project_dir(&self.root, &repo.path);
        if !self.vcs.is_repository(&dir)? {
            warn!("Manifest repository {} is not a checkout, skipping", repo.path);
            return Ok(ProjectOutcome {
                path: repo.path.clone(),
                merge: StepStatus::Skipped,
                publish: StepStatus::Skipped,
            });
        }

        let merge = worker::fetch_and_merge(
            self.vcs,
            &dir,
            &repo.path,
            &remote_url(&options.upstream_url, &repo.name),
            &options.tag,
        )?;
        let publish = if !options.publish {
            StepStatus::NotRequested
        } else if merge.is_failure() {
            StepStatus::Skipped
        } else {
            worker::push(
                self.vcs,
                &dir,
                &repo.path,
                &remote_url(&options.remote_url, &repo.name),
                &options.remote_branch,
            )?
        };

        Ok(ProjectOutcome {
            path: repo.path.clone(),
            merge,
            publish,
        })
    }
}

/// Separate projects the checkpoint records as merged and pushed.
pub(crate) fn split_done(
    projects: Vec<Project>,
    loaded: &CheckpointMap,
) -> (Vec<String>, Vec<Project>) {
    let (done, pending): (Vec<Project>, Vec<Project>) = projects
        .into_iter()
        .partition(|project| loaded.is_done(&project.path));
    (done.into_iter().map(|p| p.path).collect(), pending)
}
