//! # Error Handling
//!
//! This module defines the single error type used by the `upstream-merge`
//! library. It is built with `thiserror`, and every fallible library function
//! returns [`Result<T>`].
//!
//! Only conditions that must end the whole run are represented here. Failures
//! that affect a single repository (a fetch that returns non-zero, a merge
//! conflict, a rejected push) are not errors in this sense: they are recorded
//! in the project's outcome, logged, and the run continues.
//!
//! The binary is the only place that turns an `Error` into a process exit
//! code.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for upstream-merge operations
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration file could not be read or parsed.
    #[error("Configuration error in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    /// The manifest could not be read or is not a valid project listing.
    #[error("Manifest error in {}: {message}", path.display())]
    ManifestParse { path: PathBuf, message: String },

    /// The exclusion list exists but could not be read.
    #[error("Failed to read exclude list {}: {source}", path.display())]
    ExcludeList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external command could not be started or its output could not be
    /// collected.
    #[error("Failed to run `{command}`: {source}")]
    CommandLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A checkpoint line did not match `path;merged=<bool>;pushed=<bool>`.
    #[error("Malformed checkpoint at line {line}: {content:?}")]
    CheckpointParse { line: usize, content: String },

    /// The version file is missing, unreadable, unwritable, or lacks the
    /// expected markers.
    #[error("Version file error in {}: {message}", path.display())]
    VersionFile { path: PathBuf, message: String },

    /// The worker thread pool could not be created.
    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A mutex guarding shared run state has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
