//! # Project Registry
//!
//! Resolves the set of repositories a run works on.
//!
//! 1.  The manifest is parsed for `<project path=".." name=".."/>` elements.
//! 2.  Paths listed in the exclusion file are dropped.
//! 3.  Each remaining path becomes a [`Project`], with its upstream name taken
//!     from the configured remote-name overrides.
//! 4.  Just before scheduling, [`retain_repositories`] drops paths that are
//!     not valid checkouts in the tree.
//!
//! A manifest that cannot be read or parsed is fatal. A missing exclusion
//! file simply excludes nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use log::{info, warn};
use xot::Xot;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::vcs::Vcs;

/// Repository paths to skip.
pub type ExcludeSet = BTreeSet<String>;

/// One `<project>` entry of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestProject {
    pub path: String,
    pub name: String,
}

/// A repository to synchronize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Checkout path relative to the tree root; unique within a run.
    pub path: String,
    /// Repository name on the publish remote.
    pub name: String,
    /// Repository name on the upstream remote.
    pub upstream_name: String,
}

impl Project {
    /// A project whose names all equal its path.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: path.clone(),
            upstream_name: path.clone(),
            path,
        }
    }
}

/// Parse the `<project>` elements of a manifest document.
///
/// A project without `path` lives at its `name`, and one without `name` is
/// published under its `path`. Blank attributes count as missing.
pub fn parse_manifest(source: &Path, xml: &str) -> Result<Vec<ManifestProject>> {
    let parse_error = |message: String| Error::ManifestParse {
        path: source.to_path_buf(),
        message,
    };

    let mut xot = Xot::new();
    let root = xot.parse(xml).map_err(|e| parse_error(e.to_string()))?;
    let project_tag = xot.add_name("project");
    let path_attr = xot.add_name("path");
    let name_attr = xot.add_name("name");

    let mut projects = Vec::new();
    for node in xot.descendants(root) {
        let is_project = xot
            .element(node)
            .is_some_and(|element| element.name() == project_tag);
        if !is_project {
            continue;
        }
        // An empty attribute counts as absent.
        let attribute = |name| {
            xot.get_attribute(node, name)
                .filter(|value| !value.trim().is_empty())
                .map(str::to_string)
        };
        let path = attribute(path_attr);
        let name = attribute(name_attr);
        let project = match (path, name) {
            (Some(path), Some(name)) => ManifestProject { path, name },
            (Some(path), None) => ManifestProject {
                name: path.clone(),
                path,
            },
            (None, Some(name)) => ManifestProject {
                path: name.clone(),
                name,
            },
            (None, None) => {
                return Err(parse_error(
                    "<project> element has neither a path nor a name".to_string(),
                ))
            }
        };
        projects.push(project);
    }
    Ok(projects)
}

/// Read the exclusion list; a missing file excludes nothing.
pub fn read_exclude_list(path: &Path) -> Result<ExcludeSet> {
    if !path.is_file() {
        return Ok(ExcludeSet::new());
    }
    let content = std::fs::read_to_string(path).map_err(|source| Error::ExcludeList {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_exclude_list(&content))
}

/// One path per line; surrounding whitespace and blank lines are ignored.
pub fn parse_exclude_list(content: &str) -> ExcludeSet {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Map manifest paths to names, leaving out excluded paths.
///
/// A path listed twice keeps its last entry.
pub fn resolve(manifest: &[ManifestProject], exclude: &ExcludeSet) -> BTreeMap<String, String> {
    manifest
        .iter()
        .filter(|project| !exclude.contains(&project.path))
        .map(|project| (project.path.clone(), project.name.clone()))
        .collect()
}

/// Read the manifest and exclusion list of the tree at `root` and build the
/// project list.
pub fn load_projects(root: &Path, config: &Config) -> Result<Vec<Project>> {
    let manifest_path = root.join(&config.manifest);
    let xml = std::fs::read_to_string(&manifest_path).map_err(|e| Error::ManifestParse {
        path: manifest_path.clone(),
        message: e.to_string(),
    })?;
    let manifest = parse_manifest(&manifest_path, &xml)?;
    let exclude = read_exclude_list(&root.join(&config.exclude_file))?;

    let resolved = resolve(&manifest, &exclude);
    info!(
        "Manifest lists {} projects, {} after exclusions",
        manifest.len(),
        resolved.len()
    );
    Ok(into_projects(resolved, config))
}

/// Attach upstream names to a resolved path→name mapping.
pub fn into_projects(resolved: BTreeMap<String, String>, config: &Config) -> Vec<Project> {
    resolved
        .into_iter()
        .map(|(path, name)| Project {
            upstream_name: config.upstream_name(&path).to_string(),
            path,
            name,
        })
        .collect()
}

/// Keep only projects that are valid repository checkouts under `root`.
pub fn retain_repositories(
    projects: Vec<Project>,
    vcs: &dyn Vcs,
    root: &Path,
) -> Result<Vec<Project>> {
    let mut kept = Vec::with_capacity(projects.len());
    for project in projects {
        if vcs.is_repository(&project_dir(root, &project.path))? {
            kept.push(project);
        } else {
            warn!("Skipping {}: not a repository checkout", project.path);
        }
    }
    Ok(kept)
}

/// Directory of the checkout at `path` inside the tree at `root`.
pub fn project_dir(root: &Path, path: &str) -> PathBuf {
    root.join(path)
}
