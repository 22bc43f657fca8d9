//! # Tree Configuration
//!
//! This module defines the optional `.upstream-merge.yaml` file that describes
//! the layout of the tree being synchronized: where the manifest, exclusion
//! list and checkpoint live, which remotes to fetch from and publish to, and
//! how the version file is laid out.
//!
//! Every field has a default, so a tree that follows the default layout needs
//! no configuration file at all. Paths are relative to the tree root.
//!
//! ```yaml
//! manifest: .repo/manifests/snippets/tree.xml
//! upstream_url: https://android.googlesource.com/platform
//! remote_url: git@github.com:example-org
//! remote_branch: main
//! remote_overrides:
//!   build/make: build
//! version:
//!   file: vendor/example/config/version.mk
//!   repo_path: vendor/example
//!   repo_name: vendor_example
//!   major_marker: "EXAMPLE_VERSION_MAJOR :="
//!   minor_marker: "EXAMPLE_VERSION_MINOR :="
//!   commit_prefix: "example: "
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::exec::DEFAULT_TIMEOUT;

/// Name of the configuration file looked up at the tree root.
pub const CONFIG_FILE_NAME: &str = ".upstream-merge.yaml";

/// Layout and remotes of the tree being synchronized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Manifest listing the repositories to synchronize.
    pub manifest: PathBuf,
    /// Repository paths to skip, one per line.
    pub exclude_file: PathBuf,
    /// Where per-repository progress is persisted between runs.
    pub checkpoint_file: PathBuf,
    /// Base URL the upstream tag is fetched from; the repository name is
    /// appended.
    pub upstream_url: String,
    /// Base URL merged repositories are published to; the manifest name is
    /// appended.
    pub remote_url: String,
    /// Branch on the publish remote that receives `HEAD`.
    pub remote_branch: String,
    /// Repository paths whose upstream name differs from the path.
    pub remote_overrides: BTreeMap<String, String>,
    /// The manifest repository, synchronized after the batch.
    pub manifest_repo: RepoRef,
    /// Version file bumped by `--bump`.
    pub version: VersionConfig,
    /// Per-command timeout in seconds.
    pub command_timeout_secs: u64,
    /// Concurrency hint; the available parallelism when unset.
    pub jobs: Option<usize>,
}

/// A repository addressed by its checkout path and remote name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub path: String,
    pub name: String,
}

/// Location and markers of the version file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VersionConfig {
    /// The version file, relative to the tree root.
    pub file: PathBuf,
    /// Checkout path of the repository that owns the version file.
    pub repo_path: String,
    /// Publish-side name of that repository.
    pub repo_name: String,
    /// Text preceding the major version number.
    pub major_marker: String,
    /// Text preceding the minor version number.
    pub minor_marker: String,
    /// Prepended to the bump commit message.
    pub commit_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from(".repo/manifests/default.xml"),
            exclude_file: PathBuf::from(".upstream-merge/exclude.txt"),
            checkpoint_file: PathBuf::from(".upstream-merge/checkpoint.txt"),
            upstream_url: "https://android.googlesource.com/platform".to_string(),
            remote_url: String::new(),
            remote_branch: "main".to_string(),
            remote_overrides: BTreeMap::from([("build/make".to_string(), "build".to_string())]),
            manifest_repo: RepoRef {
                path: ".repo/manifests".to_string(),
                name: "manifest".to_string(),
            },
            version: VersionConfig::default(),
            command_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            jobs: None,
        }
    }
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("vendor/config/version.mk"),
            repo_path: "vendor".to_string(),
            repo_name: "vendor".to_string(),
            major_marker: "VERSION_MAJOR :=".to_string(),
            minor_marker: "VERSION_MINOR :=".to_string(),
            commit_prefix: String::new(),
        }
    }
}

impl Config {
    /// Resolve the configuration for a tree.
    ///
    /// An explicitly named file must exist. Without one, `CONFIG_FILE_NAME`
    /// at the tree root is used when present, and the defaults otherwise.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = root.join(CONFIG_FILE_NAME);
                if path.is_file() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Read and parse a YAML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&content).map_err(|message| Error::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    fn parse(content: &str) -> std::result::Result<Self, String> {
        // An empty file is a valid "all defaults" configuration.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    /// Check settings that only matter for some runs.
    pub fn validate(&self, path: &Path, push: bool) -> Result<()> {
        if push && self.remote_url.trim().is_empty() {
            return Err(Error::Config {
                path: path.to_path_buf(),
                message: "`remote_url` must be set to publish with --push".to_string(),
            });
        }
        if self.command_timeout_secs == 0 {
            return Err(Error::Config {
                path: path.to_path_buf(),
                message: "`command_timeout_secs` must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Per-command timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Name to fetch `path` from upstream with.
    pub fn upstream_name<'a>(&'a self, path: &'a str) -> &'a str {
        self.remote_overrides
            .get(path)
            .map(String::as_str)
            .unwrap_or(path)
    }
}

/// Join a remote base URL and a repository name.
pub fn remote_url(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}
