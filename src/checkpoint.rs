//! # Checkpoints
//!
//! Per-repository progress of a merge run, persisted so that a failed run can
//! be resumed without redoing finished work.
//!
//! The on-disk format is one line per repository:
//!
//! ```text
//! build/make;merged=true;pushed=false
//! frameworks/base;merged=true;pushed=true
//! ```
//!
//! During a run the map lives in [`SharedCheckpoints`], which workers update
//! under a single mutex. The map is written back once, after the concurrent
//! batch has finished.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard};

use log::{error, info, warn};
use regex::Regex;

use crate::error::{Error, Result};

static LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<path>.+);merged=(?P<merged>true|false);pushed=(?P<pushed>true|false)$")
        .expect("checkpoint line pattern is valid")
});

/// Progress of one repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncState {
    pub merged: bool,
    pub published: bool,
}

impl SyncState {
    pub fn new(merged: bool, published: bool) -> Self {
        Self { merged, published }
    }

    /// Nothing left to do for this repository.
    pub fn should_skip(&self) -> bool {
        self.merged && self.published
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "merged={};pushed={}", self.merged, self.published)
    }
}

/// Repository path to progress, ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointMap {
    entries: BTreeMap<String, SyncState>,
}

impl CheckpointMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<SyncState> {
        self.entries.get(path).copied()
    }

    pub fn insert(&mut self, path: impl Into<String>, state: SyncState) {
        self.entries.insert(path.into(), state);
    }

    /// Whether `path` is both merged and published.
    pub fn is_done(&self, path: &str) -> bool {
        self.get(path).is_some_and(|state| state.should_skip())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SyncState)> {
        self.entries.iter().map(|(path, state)| (path.as_str(), *state))
    }

    /// Flatten to the on-disk format, one line per entry.
    pub fn render(&self) -> String {
        self.iter()
            .map(|(path, state)| format!("{};{}\n", path, state))
            .collect()
    }

    /// Parse the on-disk format; blank lines are ignored.
    pub fn parse(content: &str) -> Result<Self> {
        let mut map = Self::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let caps = LINE.captures(line).ok_or_else(|| Error::CheckpointParse {
                line: index + 1,
                content: line.to_string(),
            })?;
            map.insert(
                &caps["path"],
                SyncState::new(&caps["merged"] == "true", &caps["pushed"] == "true"),
            );
        }
        Ok(map)
    }
}

impl FromIterator<(String, SyncState)> for CheckpointMap {
    fn from_iter<I: IntoIterator<Item = (String, SyncState)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// The checkpoint file of a tree.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the checkpoint, `None` when there is no file.
    pub fn try_load(&self) -> Result<Option<CheckpointMap>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        CheckpointMap::parse(&content).map(Some)
    }

    /// Read the checkpoint, starting fresh when it is missing or unreadable.
    pub fn load(&self) -> CheckpointMap {
        match self.try_load() {
            Ok(Some(map)) => {
                info!(
                    "Loaded checkpoint for {} projects from {}",
                    map.len(),
                    self.path.display()
                );
                map
            }
            Ok(None) => {
                warn!(
                    "Checkpoint file {} is missing, merge will start fresh",
                    self.path.display()
                );
                CheckpointMap::new()
            }
            Err(e) => {
                error!(
                    "Failed to read checkpoint {}: {}, merge will start fresh",
                    self.path.display(),
                    e
                );
                CheckpointMap::new()
            }
        }
    }

    /// Overwrite the checkpoint file with `map`.
    pub fn save(&self, map: &CheckpointMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, map.render())?;
        Ok(())
    }

    /// Remove a checkpoint left behind by an earlier run.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed stale checkpoint {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The checkpoint map of a running batch, updated concurrently by workers.
#[derive(Debug, Default)]
pub struct SharedCheckpoints {
    map: Mutex<CheckpointMap>,
}

impl SharedCheckpoints {
    pub fn new(map: CheckpointMap) -> Self {
        Self {
            map: Mutex::new(map),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, CheckpointMap>> {
        self.map.lock().map_err(|_| Error::LockPoisoned {
            context: "checkpoint map".to_string(),
        })
    }

    /// Current state of `path`; default when never recorded.
    pub fn get(&self, path: &str) -> Result<SyncState> {
        Ok(self.lock()?.get(path).unwrap_or_default())
    }

    /// Record the progress of `path`.
    pub fn update(&self, path: &str, merged: bool, published: bool) -> Result<()> {
        self.lock()?.insert(path, SyncState::new(merged, published));
        Ok(())
    }

    /// Copy of the map as it is now.
    pub fn snapshot(&self) -> Result<CheckpointMap> {
        Ok(self.lock()?.clone())
    }

    pub fn into_inner(self) -> Result<CheckpointMap> {
        self.map.into_inner().map_err(|_| Error::LockPoisoned {
            context: "checkpoint map".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn sample() -> CheckpointMap {
        let mut map = CheckpointMap::new();
        map.insert("frameworks/base", SyncState::new(true, true));
        map.insert("build/make", SyncState::new(true, false));
        map.insert("art", SyncState::new(false, false));
        map
    }

    #[test]
    fn test_state_display_matches_file_layout() {
        assert_eq!(
            SyncState::new(true, false).to_string(),
            "merged=true;pushed=false"
        );
    }

    #[test]
    fn test_should_skip_requires_both_flags() {
        assert!(SyncState::new(true, true).should_skip());
        assert!(!SyncState::new(true, false).should_skip());
        assert!(!SyncState::new(false, true).should_skip());
        assert!(!SyncState::default().should_skip());
    }

    #[test]
    fn test_render_is_sorted_by_path() {
        assert_eq!(
            sample().render(),
            "art;merged=false;pushed=false\n\
             build/make;merged=true;pushed=false\n\
             frameworks/base;merged=true;pushed=true\n"
        );
    }

    #[test]
    fn test_parse_ignores_blank_lines() {
        let map = CheckpointMap::parse("\nart;merged=true;pushed=false\n\n").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("art"), Some(SyncState::new(true, false)));
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        for bad in [
            "art",
            "art;merged=true",
            "art;merged=yes;pushed=false",
            ";merged=true;pushed=true",
            "art;pushed=true;merged=true",
        ] {
            let err = CheckpointMap::parse(bad).unwrap_err();
            assert!(
                matches!(err, Error::CheckpointParse { line: 1, .. }),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = CheckpointMap::parse("art;merged=true;pushed=true\nbogus\n").unwrap_err();
        assert!(matches!(err, Error::CheckpointParse { line: 2, .. }));
    }

    #[test]
    fn test_save_load_save_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp.path().join("state/checkpoint.txt"));

        store.save(&sample()).unwrap();
        let first = std::fs::read_to_string(store.path()).unwrap();
        let loaded = store.load();
        assert_eq!(loaded, sample());

        store.save(&loaded).unwrap();
        let second = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp.path().join("checkpoint.txt"));
        assert!(store.try_load().unwrap().is_none());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_malformed_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp.path().join("checkpoint.txt"));
        std::fs::write(store.path(), "not a checkpoint\n").unwrap();
        assert!(store.try_load().is_err());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_clear_removes_file_and_tolerates_absence() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp.path().join("checkpoint.txt"));
        store.save(&sample()).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
    }

    #[test]
    fn test_shared_updates_from_many_threads() {
        let shared = Arc::new(SharedCheckpoints::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for j in 0..25 {
                        let path = format!("repo{}_{}", i, j);
                        shared.update(&path, true, false).unwrap();
                        shared.update(&path, true, j % 2 == 0).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let map = Arc::try_unwrap(shared).unwrap().into_inner().unwrap();
        assert_eq!(map.len(), 200);
        assert_eq!(map.get("repo3_4"), Some(SyncState::new(true, true)));
        assert_eq!(map.get("repo3_5"), Some(SyncState::new(true, false)));
    }

    #[test]
    fn test_shared_get_defaults_for_unknown_path() {
        let shared = SharedCheckpoints::new(sample());
        assert_eq!(shared.get("unknown").unwrap(), SyncState::default());
        assert_eq!(shared.get("build/make").unwrap(), SyncState::new(true, false));
    }
}
