//! Shared test utilities for integration and E2E tests.
//!
//! This module provides a fixture that lays out a complete, local-only
//! environment for a merge run:
//!
//! ```text
//! <temp>/upstream/<name>   upstream repositories, fetched by path
//! <temp>/remote/<name>     bare publish remotes
//! <temp>/tree/...          the source tree the binary runs in
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     if !git_available() {
//!         return;
//!     }
//!     let fixture = GitFixture::new();
//!     fixture.add_project("a", "repo_a");
//!     fixture.command().args(["-t", "v1"]).assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::git_available;
    #[allow(unused_imports)]
    pub use super::GitFixture;
}

/// Whether a usable `git` binary is on the `PATH`.
///
/// Tests that drive real repositories return early when it is not.
#[allow(dead_code)]
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Run `git` with a fixed identity, panicking on failure.
#[allow(dead_code)]
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Test User",
            "-c",
            "user.email=test@example.com",
            "-c",
            "init.defaultBranch=main",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "tag.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A temporary upstream, remote and tree, wired together through the tree's
/// `.upstream-merge.yaml`.
pub struct GitFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl GitFixture {
    /// Create the directory layout and the default configuration.
    pub fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        for dir in ["upstream", "remote", "tree"] {
            temp_dir
                .child(dir)
                .create_dir_all()
                .expect("Failed to create fixture directory");
        }
        let fixture = Self { temp_dir };
        fixture.with_config("");
        fixture
    }

    /// Write `.upstream-merge.yaml`, with `extra` appended to the URL settings.
    pub fn with_config(&self, extra: &str) -> &Self {
        let config = format!(
            "upstream_url: {}\nremote_url: {}\nremote_branch: main\nremote_overrides: {{}}\n{}",
            self.upstream().display(),
            self.remote().display(),
            extra
        );
        self.tree_child(".upstream-merge.yaml")
            .write_str(&config)
            .expect("Failed to write config file");
        self
    }

    pub fn upstream(&self) -> PathBuf {
        self.temp_dir.path().join("upstream")
    }

    pub fn remote(&self) -> PathBuf {
        self.temp_dir.path().join("remote")
    }

    /// Root of the source tree.
    pub fn tree(&self) -> PathBuf {
        self.temp_dir.path().join("tree")
    }

    pub fn tree_child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child("tree").child(path)
    }

    /// Create upstream repository `name`, a bare remote for it, and a clone
    /// at `path` in the tree. Upstream then gains a commit tagged `v1` that
    /// the tree does not have yet.
    pub fn add_project(&self, path: &str, name: &str) {
        self.add_project_with(path, name, &[("README", name)]);
    }

    /// Like [`add_project`](Self::add_project) with initial `files`.
    pub fn add_project_with(&self, path: &str, name: &str, files: &[(&str, &str)]) {
        let upstream = self.upstream().join(name);
        std::fs::create_dir_all(&upstream).expect("Failed to create upstream repo");
        git(&upstream, &["init", "-q"]);
        for (file, content) in files {
            write_file(&upstream.join(file), content);
        }
        git(&upstream, &["add", "-A"]);
        git(&upstream, &["commit", "-q", "-m", "initial"]);

        let checkout = self.tree().join(path);
        if let Some(parent) = checkout.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create checkout parent");
        }
        git(
            self.temp_dir.path(),
            &[
                "clone",
                "-q",
                &upstream.to_string_lossy(),
                &checkout.to_string_lossy(),
            ],
        );

        let remote = self.remote().join(name);
        std::fs::create_dir_all(&remote).expect("Failed to create remote repo");
        git(&remote, &["init", "-q", "--bare"]);

        write_file(&upstream.join("UPSTREAM_CHANGE"), "v1\n");
        git(&upstream, &["add", "-A"]);
        git(&upstream, &["commit", "-q", "-m", "upstream v1"]);
        git(&upstream, &["tag", "v1"]);
    }

    /// Write the manifest listing `projects` as `(path, name)` pairs.
    pub fn with_manifest(&self, projects: &[(&str, &str)]) -> &Self {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<manifest>\n");
        for (path, name) in projects {
            xml.push_str(&format!("  <project path=\"{}\" name=\"{}\" />\n", path, name));
        }
        xml.push_str("</manifest>\n");
        self.tree_child(".repo/manifests/default.xml")
            .write_str(&xml)
            .expect("Failed to write manifest");
        self
    }

    pub fn with_exclude(&self, lines: &str) -> &Self {
        self.tree_child(".upstream-merge/exclude.txt")
            .write_str(lines)
            .expect("Failed to write exclude list");
        self
    }

    /// Checkpoint file contents, if one was written.
    pub fn checkpoint(&self) -> Option<String> {
        std::fs::read_to_string(self.tree().join(".upstream-merge/checkpoint.txt")).ok()
    }

    /// Current `HEAD` of a tree checkout.
    pub fn head(&self, path: &str) -> String {
        git(&self.tree().join(path), &["rev-parse", "HEAD"])
            .trim()
            .to_string()
    }

    /// Commit the `v1` tag points to upstream.
    pub fn upstream_tag(&self, name: &str) -> String {
        git(&self.upstream().join(name), &["rev-parse", "v1^{commit}"])
            .trim()
            .to_string()
    }

    /// `main` of the bare remote, if it has been pushed.
    pub fn remote_main(&self, name: &str) -> Option<String> {
        let output = Command::new("git")
            .args(["rev-parse", "--verify", "-q", "refs/heads/main"])
            .current_dir(self.remote().join(name))
            .output()
            .ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// A command for the binary, running in the tree with a fixed identity
    /// for any commits it makes.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("upstream-merge");
        cmd.current_dir(self.tree())
            .env_remove("UPSTREAM_MERGE_CONFIG")
            .env_remove("RUST_LOG")
            .env("GIT_AUTHOR_NAME", "Test User")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test User")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("GIT_CEILING_DIRECTORIES", self.temp_dir.path())
            .env("NO_COLOR", "1");
        cmd
    }
}

impl Default for GitFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    std::fs::write(path, content).expect("Failed to write file");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_layout() {
        let fixture = GitFixture::new();
        assert!(fixture.upstream().is_dir());
        assert!(fixture.remote().is_dir());
        assert!(fixture.tree().join(".upstream-merge.yaml").is_file());
    }

    #[test]
    fn test_fixture_writes_manifest() {
        let fixture = GitFixture::new();
        fixture.with_manifest(&[("a", "repo_a")]);
        let manifest =
            std::fs::read_to_string(fixture.tree().join(".repo/manifests/default.xml")).unwrap();
        assert!(manifest.contains(r#"path="a""#));
    }
}
