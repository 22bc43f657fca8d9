//! # Version-Control Seam
//!
//! The sync engine never talks to `git` directly. It goes through the [`Vcs`]
//! trait, which exposes the handful of primitives a merge run needs. In the
//! application [`GitCli`] implements them by running the system `git` binary
//! through [`crate::exec::run`], so SSH keys, credential helpers and any
//! settings in `~/.gitconfig` apply as usual. Tests substitute a recording
//! mock.
//!
//! Each primitive returns the raw [`CommandResult`]; deciding whether a
//! non-zero exit is a failure worth logging belongs to the caller. Only a
//! failure to launch the command is an `Err`.

use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::exec::{self, CommandResult};

/// Version-control primitives used by the sync engine.
pub trait Vcs: Send + Sync {
    /// Whether `dir` is inside a valid repository checkout.
    fn is_repository(&self, dir: &Path) -> Result<bool>;

    /// Fetch `reference` from `url` into `FETCH_HEAD`.
    fn fetch(&self, dir: &Path, url: &str, reference: &str) -> Result<CommandResult>;

    /// Merge `FETCH_HEAD` into the current branch.
    fn merge_fetched(&self, dir: &Path) -> Result<CommandResult>;

    /// Push `HEAD` to `branch` at `url`.
    fn push(&self, dir: &Path, url: &str, branch: &str) -> Result<CommandResult>;

    /// Stage `file`, given relative to `dir`.
    fn add(&self, dir: &Path, file: &Path) -> Result<CommandResult>;

    /// Commit the staged changes with `message`.
    fn commit(&self, dir: &Path, message: &str) -> Result<CommandResult>;
}

/// [`Vcs`] backed by the system `git` command.
#[derive(Debug, Clone)]
pub struct GitCli {
    timeout: Duration,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn git(&self, dir: &Path, args: &[&str]) -> Result<CommandResult> {
        let argv: Vec<&str> = std::iter::once("git").chain(args.iter().copied()).collect();
        exec::run(&argv, Some(dir), self.timeout)
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(exec::DEFAULT_TIMEOUT)
    }
}

impl Vcs for GitCli {
    fn is_repository(&self, dir: &Path) -> Result<bool> {
        if !dir.is_dir() {
            return Ok(false);
        }
        Ok(self.git(dir, &["rev-parse"])?.success())
    }

    fn fetch(&self, dir: &Path, url: &str, reference: &str) -> Result<CommandResult> {
        self.git(dir, &["fetch", url, reference])
    }

    fn merge_fetched(&self, dir: &Path) -> Result<CommandResult> {
        self.git(dir, &["merge", "FETCH_HEAD"])
    }

    fn push(&self, dir: &Path, url: &str, branch: &str) -> Result<CommandResult> {
        let refspec = format!("HEAD:{}", branch);
        self.git(dir, &["push", url, &refspec])
    }

    fn add(&self, dir: &Path, file: &Path) -> Result<CommandResult> {
        let file = file.to_string_lossy();
        self.git(dir, &["add", "--", &file])
    }

    fn commit(&self, dir: &Path, message: &str) -> Result<CommandResult> {
        self.git(dir, &["commit", "-m", message])
    }
}
