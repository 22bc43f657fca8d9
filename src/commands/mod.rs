//! # CLI Command Implementations
//!
//! The `upstream-merge` tool has a single command, the merge run. It follows
//! the usual layout of a command module:
//!
//! - An `Args` struct that defines the command's flags, derived using `clap`.
//! - An `execute` function that takes the parsed `Args`, calls into the
//!   `upstream_merge` library and prints the result.

pub mod merge;
