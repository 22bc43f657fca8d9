//! # Version Bump
//!
//! After a successful merge run the tree's minor version can be raised by
//! one. The version file holds two marker lines:
//!
//! ```text
//! VERSION_MAJOR := 2
//! VERSION_MINOR := 7
//! ```
//!
//! Only the minor line is rewritten, as `<minor marker> <new value>`; every
//! other byte of the file is kept. The change is then staged and committed in
//! the repository that owns the file.
//!
//! Any problem reading, parsing or writing the file is fatal: there is no
//! half-bumped state worth keeping.

use std::path::{Path, PathBuf};

use log::{error, info};

use crate::config::VersionConfig;
use crate::error::{Error, Result};
use crate::registry::project_dir;
use crate::vcs::Vcs;

/// A completed minor version increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBump {
    pub major: u64,
    pub from_minor: u64,
    pub to_minor: u64,
    /// Whether the change was staged and committed.
    pub committed: bool,
}

impl VersionBump {
    /// The new version as `major.minor`.
    pub fn version(&self) -> String {
        format!("{}.{}", self.major, self.to_minor)
    }
}

/// Increment the minor version in `contents`.
///
/// Returns the rewritten text and the bump (not yet committed).
pub fn bump_minor(
    source: &Path,
    contents: &str,
    markers: &VersionConfig,
) -> Result<(String, VersionBump)> {
    let version_error = |message: String| Error::VersionFile {
        path: source.to_path_buf(),
        message,
    };

    let lines: Vec<&str> = contents.split('\n').collect();
    let (_, major) = find_marker(&lines, &markers.major_marker).map_err(version_error)?;
    let (minor_index, minor) = find_marker(&lines, &markers.minor_marker).map_err(version_error)?;

    let to_minor = minor
        .checked_add(1)
        .ok_or_else(|| version_error(format!("minor version {} cannot be incremented", minor)))?;
    let line_end = if lines[minor_index].ends_with('\r') { "\r" } else { "" };
    let new_line = format!("{} {}{}", markers.minor_marker, to_minor, line_end);
    let updated = lines
        .iter()
        .enumerate()
        .map(|(index, line)| if index == minor_index { new_line.as_str() } else { *line })
        .collect::<Vec<_>>()
        .join("\n");

    Ok((
        updated,
        VersionBump {
            major,
            from_minor: minor,
            to_minor,
            committed: false,
        },
    ))
}

/// First line containing `marker`, and the integer that follows it.
fn find_marker(lines: &[&str], marker: &str) -> std::result::Result<(usize, u64), String> {
    let (index, line) = lines
        .iter()
        .enumerate()
        .find(|(_, line)| line.contains(marker))
        .ok_or_else(|| format!("marker {:?} not found", marker))?;
    let value = line
        .split_once(marker)
        .map(|(_, rest)| rest.trim())
        .unwrap_or_default();
    let number = value
        .parse::<u64>()
        .map_err(|_| format!("{:?} is not a version number after {:?}", value, marker))?;
    Ok((index, number))
}

/// Bump the minor version in the tree at `root` and commit it.
pub fn bump_version_file(
    root: &Path,
    config: &VersionConfig,
    vcs: &dyn Vcs,
) -> Result<VersionBump> {
    let path = root.join(&config.file);
    if !path.is_file() {
        return Err(Error::VersionFile {
            path,
            message: "file does not exist".to_string(),
        });
    }
    let relative =
        staged_path(&config.file, &config.repo_path).ok_or_else(|| Error::VersionFile {
            path: path.clone(),
            message: format!("not inside the version repository {}", config.repo_path),
        })?;

    let contents = std::fs::read_to_string(&path).map_err(|e| Error::VersionFile {
        path: path.clone(),
        message: format!("failed to read: {}", e),
    })?;
    let (updated, mut bump) = bump_minor(&path, &contents, config)?;

    info!(
        "Bumping version from {}.{} to {}",
        bump.major,
        bump.from_minor,
        bump.version()
    );
    std::fs::write(&path, updated).map_err(|e| Error::VersionFile {
        path: path.clone(),
        message: format!("failed to write: {}", e),
    })?;

    let repo = project_dir(root, &config.repo_path);
    let add = vcs.add(&repo, &relative)?;
    if !add.success() {
        error!(
            "Failed to stage {}, reason: {}",
            relative.display(),
            add.failure_reason()
        );
        return Ok(bump);
    }
    let message = format!("{}bump version to {}", config.commit_prefix, bump.version());
    let commit = vcs.commit(&repo, &message)?;
    if !commit.success() {
        error!(
            "Failed to commit version bump in {}, reason: {}",
            config.repo_path,
            commit.failure_reason()
        );
        return Ok(bump);
    }

    info!("Committed version {} in {}", bump.version(), config.repo_path);
    bump.committed = true;
    Ok(bump)
}

fn staged_path(file: &Path, repo_path: &str) -> Option<PathBuf> {
    file.strip_prefix(repo_path)
        .ok()
        .filter(|relative| !relative.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
