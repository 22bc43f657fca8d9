//! # Upstream Merge Library
//!
//! This library merges an upstream tag into every repository of a
//! manifest-tracked source tree. It is designed to be used by the
//! `upstream-merge` command-line tool, and every phase can also be driven on
//! its own, with a substitute [`vcs::Vcs`], from other code or from tests.
//!
//! ## Quick Example
//!
//! ```
//! use upstream_merge::checkpoint::{CheckpointMap, SyncState};
//! use upstream_merge::registry::{parse_exclude_list, parse_manifest, resolve};
//! use std::path::Path;
//!
//! let manifest = parse_manifest(
//!     Path::new("default.xml"),
//!     r#"<manifest>
//!          <project path="a" name="repo_a"/>
//!          <project path="b" name="repo_b"/>
//!        </manifest>"#,
//! )
//! .unwrap();
//! let resolved = resolve(&manifest, &parse_exclude_list("b\n"));
//! assert_eq!(resolved.len(), 1);
//!
//! let mut map = CheckpointMap::new();
//! map.insert("a", SyncState::new(true, false));
//! assert_eq!(map.render(), "a;merged=true;pushed=false\n");
//! ```
//!
//! ## Core Concepts
//!
//! - **Registry (`registry`)**: reads the manifest and exclusion list and
//!   produces the projects of a run.
//! - **Checkpoints (`checkpoint`)**: per-repository `merged`/`pushed` progress,
//!   persisted between runs so a failed run can be resumed.
//! - **Workers (`worker`)**: fetch, merge and push one repository, recording
//!   each success in the shared checkpoint.
//! - **Scheduler (`scheduler`)**: splits the projects into groups and runs the
//!   groups concurrently on a bounded pool.
//! - **Version bump (`bump`)**: raises the minor version after a run.
//! - **VCS (`vcs`, `exec`)**: the `git` primitives and the process runner
//!   beneath them.
//!
//! ## Execution Flow
//!
//! [`pipeline::RunContext::execute`] runs the phases in order: resolve
//! projects, filter by checkpoint, run the batch, persist the checkpoint,
//! sync the manifest repository, and optionally bump the version.

pub mod bump;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod exec;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod vcs;
pub mod worker;

#[cfg(test)]
mod proptests;
