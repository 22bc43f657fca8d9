//! Property-based tests for checkpoints, partitioning and exclusion.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all of them.

#[cfg(test)]
mod proptest_tests {
    use std::collections::BTreeMap;

    use crate::checkpoint::{CheckpointMap, CheckpointStore, SyncState};
    use crate::pipeline::split_done;
    use crate::registry::{resolve, ExcludeSet, ManifestProject, Project};
    use crate::scheduler::partition;
    use proptest::prelude::*;

    fn repo_path() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_.-]{0,8}(/[a-z0-9_.-]{1,8}){0,3}"
    }

    fn checkpoint_map() -> impl Strategy<Value = CheckpointMap> {
        prop::collection::btree_map(repo_path(), (any::<bool>(), any::<bool>()), 0..40).prop_map(
            |entries| {
                entries
                    .into_iter()
                    .map(|(path, (merged, published))| (path, SyncState::new(merged, published)))
                    .collect::<CheckpointMap>()
            },
        )
    }

    proptest! {
        /// Property: parsing a rendered map gives the same map back
        #[test]
        fn checkpoint_render_parse_roundtrip(map in checkpoint_map()) {
            let parsed = CheckpointMap::parse(&map.render()).unwrap();
            prop_assert_eq!(parsed, map);
        }

        /// Property: save, load, save leaves the file byte-identical
        #[test]
        fn checkpoint_file_is_stable(map in checkpoint_map()) {
            let temp = tempfile::TempDir::new().unwrap();
            let store = CheckpointStore::new(temp.path().join("checkpoint.txt"));
            store.save(&map).unwrap();
            let first = std::fs::read_to_string(store.path()).unwrap();
            let loaded = store.try_load().unwrap().unwrap();
            prop_assert_eq!(&loaded, &map);
            store.save(&loaded).unwrap();
            let second = std::fs::read_to_string(store.path()).unwrap();
            prop_assert_eq!(first, second);
        }

        /// Property: partitioning yields ceil(K/H) groups whose concatenation
        /// is the input
        #[test]
        fn partition_preserves_sequence(count in 0usize..120, hint in 1usize..32) {
            let projects: Vec<Project> = (0..count).map(|i| Project::new(format!("p{}", i))).collect();
            let groups = partition(&projects, hint);

            prop_assert_eq!(groups.len(), count.div_ceil(hint));
            prop_assert!(groups.iter().all(|g| !g.is_empty() && g.len() <= hint));
            let flattened: Vec<Project> = groups.concat();
            prop_assert_eq!(flattened, projects);
        }

        /// Property: an excluded path never survives resolution
        #[test]
        fn excluded_paths_never_resolve(
            paths in prop::collection::vec(repo_path(), 0..30),
            picks in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            let manifest: Vec<ManifestProject> = paths
                .iter()
                .map(|p| ManifestProject { path: p.clone(), name: p.clone() })
                .collect();
            let exclude: ExcludeSet = if paths.is_empty() {
                ExcludeSet::new()
            } else {
                picks.iter().map(|i| paths[i.index(paths.len())].clone()).collect()
            };

            let resolved: BTreeMap<String, String> = resolve(&manifest, &exclude);
            for path in &exclude {
                prop_assert!(!resolved.contains_key(path));
            }
            for path in &paths {
                prop_assert_eq!(resolved.contains_key(path), !exclude.contains(path));
            }
        }

        /// Property: a resumed run leaves out exactly the fully done
        /// projects, wherever they sit in the manifest
        #[test]
        fn done_projects_are_filtered(
            (map, order) in checkpoint_map().prop_flat_map(|map| {
                let paths: Vec<String> = map.iter().map(|(path, _)| path.to_string()).collect();
                (Just(map), Just(paths).prop_shuffle())
            })
        ) {
            let projects: Vec<Project> = order.iter().map(Project::new).collect();
            let (done, pending) = split_done(projects, &map);

            prop_assert!(done.iter().all(|path| map.is_done(path)));
            prop_assert!(pending.iter().all(|project| !map.is_done(&project.path)));
            prop_assert_eq!(done.len() + pending.len(), order.len());
        }
    }
}
