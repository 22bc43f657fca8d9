//! Batch scheduling
//!
//! The work set is split into groups of `hint` projects. Groups run
//! concurrently on a rayon pool of `hint` threads, so at most `hint` groups
//! are in flight and the rest queue behind them. Inside a group, projects are
//! synced one after another in list order.
//!
//! [`BatchScheduler::run`] returns only once every group has finished. If a
//! worker hits a fatal error, groups stop taking new projects and the first
//! fatal error is returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::{debug, error};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::registry::Project;
use crate::worker::{ProjectOutcome, SyncWorker};

/// Split `projects` into `ceil(len / hint)` groups of at most `hint` each.
///
/// A hint of zero is treated as one.
pub fn partition(projects: &[Project], hint: usize) -> Vec<&[Project]> {
    projects.chunks(hint.max(1)).collect()
}

/// Concurrency hint from the machine, one when it cannot be determined.
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Outcomes of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<ProjectOutcome>,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &ProjectOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_failure())
    }

    pub fn outcome(&self, path: &str) -> Option<&ProjectOutcome> {
        self.outcomes.iter().find(|outcome| outcome.path == path)
    }
}

/// Drives [`SyncWorker`]s over a project list.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    hint: usize,
}

impl BatchScheduler {
    pub fn new(hint: usize) -> Self {
        Self { hint: hint.max(1) }
    }

    pub fn hint(&self) -> usize {
        self.hint
    }

    /// Sync every project and wait for all groups to finish.
    ///
    /// Outcomes are reported in project order.
    pub fn run(&self, projects: &[Project], worker: &SyncWorker<'_>) -> Result<BatchReport> {
        let groups = partition(projects, self.hint);
        debug!(
            "Dispatching {} projects in {} groups on {} threads",
            projects.len(),
            groups.len(),
            self.hint
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.hint)
            .thread_name(|index| format!("sync-worker-{}", index))
            .build()?;

        let aborted = AtomicBool::new(false);
        let fatal: Mutex<Option<Error>> = Mutex::new(None);

        let grouped: Vec<Vec<ProjectOutcome>> = pool.install(|| {
            groups
                .par_iter()
                .map(|group| {
                    let mut outcomes = Vec::with_capacity(group.len());
                    for project in group.iter() {
                        if aborted.load(Ordering::SeqCst) {
                            break;
                        }
                        match worker.sync(project) {
                            Ok(outcome) => outcomes.push(outcome),
                            Err(e) => {
                                error!("Aborting batch at {}: {}", project.path, e);
                                aborted.store(true, Ordering::SeqCst);
                                if let Ok(mut slot) = fatal.lock() {
                                    slot.get_or_insert(e);
                                }
                                break;
                            }
                        }
                    }
                    outcomes
                })
                .collect()
        });

        let fatal = fatal.into_inner().map_err(|_| Error::LockPoisoned {
            context: "batch error slot".to_string(),
        })?;
        if let Some(e) = fatal {
            return Err(e);
        }

        Ok(BatchReport {
            outcomes: grouped.into_iter().flatten().collect(),
        })
    }
}
