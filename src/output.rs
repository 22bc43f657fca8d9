//! # Run Summary Output
//!
//! Renders the [`RunSummary`] printed at the end of a run. Status markers are
//! emoji on color-capable terminals and bracketed words otherwise, following
//! the `--color` flag and the usual environment conventions:
//!
//! - `--color=always|never` wins over everything else;
//! - `NO_COLOR` (any value) or `CLICOLOR=0` disables color;
//! - `CLICOLOR_FORCE` set to a non-zero value enables it;
//! - `TERM=dumb` disables it;
//! - otherwise the terminal's own capabilities decide.

use std::env;
use std::fmt::Write as _;

use crate::pipeline::RunSummary;
use crate::worker::{ProjectOutcome, StepStatus};

/// Whether status markers may use emoji.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    /// Resolve the `--color` flag value against the environment.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_ascii_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect(),
        };
        Self { use_color }
    }

    pub fn plain() -> Self {
        Self { use_color: false }
    }

    fn detect() -> bool {
        if env::var_os("NO_COLOR").is_some() || env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| !v.is_empty() && v != "0") {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }
}

/// `emoji` when colors are enabled, `plain` otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// Human-readable report of a run.
pub fn render_summary(summary: &RunSummary, config: &OutputConfig) -> String {
    let ok = emoji(config, "✅", "[OK]");
    let failed = emoji(config, "❌", "[FAILED]");
    let mut out = String::new();

    let outcomes = &summary.batch.outcomes;
    let failures: Vec<&ProjectOutcome> = summary.batch.failures().collect();
    let merged = outcomes
        .iter()
        .filter(|o| matches!(o.merge, StepStatus::Succeeded))
        .count();
    let pushed = outcomes
        .iter()
        .filter(|o| matches!(o.publish, StepStatus::Succeeded))
        .count();

    let _ = writeln!(out, "Merge of {} finished", summary.tag);
    let _ = writeln!(
        out,
        "   {} processed, {} merged, {} pushed, {} already done",
        outcomes.len(),
        merged,
        pushed,
        summary.already_done.len()
    );

    if failures.is_empty() {
        let _ = writeln!(out, "{} All repositories synced", ok);
    } else {
        let _ = writeln!(out, "{} {} repositories need attention:", failed, failures.len());
        for outcome in failures {
            let _ = writeln!(out, "   {}: {}", outcome.path, describe(outcome));
        }
        let _ = writeln!(out, "   Fix them and re-run with -c to continue.");
    }

    let manifest = &summary.manifest_repo;
    if manifest.is_failure() {
        let _ = writeln!(out, "{} {}: {}", failed, manifest.path, describe(manifest));
    }

    if let Some(bump) = &summary.version_bump {
        let marker = if bump.committed { ok } else { failed };
        let _ = writeln!(
            out,
            "{} Version {}.{} -> {}{}",
            marker,
            bump.major,
            bump.from_minor,
            bump.version(),
            if bump.committed { "" } else { " (not committed)" }
        );
    }
    if let StepStatus::Failed(reason) = &summary.version_publish {
        let _ = writeln!(out, "{} Version push failed: {}", failed, reason);
    }

    out
}

fn describe(outcome: &ProjectOutcome) -> String {
    match (&outcome.merge, &outcome.publish) {
        (StepStatus::Failed(reason), _) => format!("merge failed ({})", first_line(reason)),
        (_, StepStatus::Failed(reason)) => format!("push failed ({})", first_line(reason)),
        _ => "ok".to_string(),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
