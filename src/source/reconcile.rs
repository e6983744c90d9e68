//! Priority-aware reconciliation of one file's contents against the store.
//!
//! A pass only ever touches keys owned by the file being reconciled or keys
//! the file defines. Keys owned by other files are never deleted here; they
//! are displaced only when the reconciled file has a strictly lower priority
//! number than their current owner.

use super::registry::FileRegistry;
use super::store::{ConfigEntry, ConfigStore, Entries};
use crate::types::{ChangeEvent, FlatConfig, LOWEST_PRECEDENCE, SOURCE_NAME};
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, info};

/// Reconcile `new_conf`, freshly read from `file_path`, into `store`.
///
/// Returns the events produced, in the order they were generated. The store
/// is replaced in one step at the end of the pass. If `file_path` is not
/// registered the pass is a no-op.
pub fn reconcile(
    store: &mut ConfigStore,
    registry: &FileRegistry,
    mut new_conf: FlatConfig,
    file_path: &Path,
) -> Vec<ChangeEvent> {
    let Some(file_priority) = registry.priority_of(file_path) else {
        debug!(path = %file_path.display(), "Skipping reconcile for unregistered file");
        return Vec::new();
    };

    let mut events = Vec::new();
    let mut next = Entries::new();

    for (key, entry) in store.entries() {
        let incoming = new_conf.remove(key);

        if entry.owner == file_path {
            match incoming {
                None => {
                    events.push(ChangeEvent::delete(SOURCE_NAME, key, entry.value.clone()));
                }
                Some(value) if value == entry.value => {
                    next.insert(key.clone(), entry.clone());
                }
                Some(value) => {
                    events.push(ChangeEvent::update(SOURCE_NAME, key, value.clone()));
                    next.insert(key.clone(), ConfigEntry::new(value, file_path));
                }
            }
            continue;
        }

        let Some(value) = incoming else {
            next.insert(key.clone(), entry.clone());
            continue;
        };

        let owner_priority = registry
            .priority_of(&entry.owner)
            .unwrap_or(LOWEST_PRECEDENCE);

        match file_priority.cmp(&owner_priority) {
            Ordering::Equal => {
                info!(
                    key = %key,
                    owner = %entry.owner.display(),
                    other = %file_path.display(),
                    "Two files have same priority, keeping existing value"
                );
                next.insert(key.clone(), entry.clone());
            }
            Ordering::Less => {
                if value != entry.value {
                    events.push(ChangeEvent::update(SOURCE_NAME, key, value.clone()));
                }
                next.insert(key.clone(), ConfigEntry::new(value, file_path));
            }
            Ordering::Greater => {
                next.insert(key.clone(), entry.clone());
            }
        }
    }

    // Whatever is left was not present under any owner.
    for (key, value) in new_conf {
        events.push(ChangeEvent::create(SOURCE_NAME, key.clone(), value.clone()));
        next.insert(key, ConfigEntry::new(value, file_path));
    }

    store.replace(next);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use serde_yaml::Value;
    use std::path::PathBuf;

    fn conf(pairs: &[(&str, Value)]) -> FlatConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn setup(files: &[(&str, u32)]) -> (ConfigStore, FileRegistry) {
        let mut registry = FileRegistry::new();
        for (path, priority) in files {
            registry.register(Path::new(path), *priority);
        }
        (ConfigStore::new(), registry)
    }

    #[test]
    fn test_initial_load_creates() {
        let (mut store, registry) = setup(&[("/a.yaml", 1)]);
        let events = reconcile(
            &mut store,
            &registry,
            conf(&[("db.host", "x".into()), ("db.port", 5432.into())]),
            Path::new("/a.yaml"),
        );

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == EventKind::Create));
        assert_eq!(store.get("db.port"), Some(Value::from(5432)));
        assert_eq!(store.owner_of("db.host"), Some(Path::new("/a.yaml")));
    }

    #[test]
    fn test_same_file_update_and_delete() {
        let (mut store, registry) = setup(&[("/a.yaml", 1)]);
        let a = Path::new("/a.yaml");
        reconcile(
            &mut store,
            &registry,
            conf(&[("db.host", "x".into()), ("db.port", 5432.into())]),
            a,
        );

        let events = reconcile(&mut store, &registry, conf(&[("db.host", "y".into())]), a);

        assert_eq!(events.len(), 2);
        assert!(events.contains(&ChangeEvent::update(SOURCE_NAME, "db.host", "y".into())));
        assert!(events.contains(&ChangeEvent::delete(SOURCE_NAME, "db.port", 5432.into())));
        assert_eq!(store.get("db.host"), Some(Value::from("y")));
        assert!(store.get("db.port").is_none());
    }

    #[test]
    fn test_unchanged_file_emits_nothing() {
        let (mut store, registry) = setup(&[("/a.yaml", 1)]);
        let a = Path::new("/a.yaml");
        let contents = conf(&[("x", 1.into()), ("list", Value::Sequence(vec![1.into()]))]);
        reconcile(&mut store, &registry, contents.clone(), a);

        let events = reconcile(&mut store, &registry, contents, a);
        assert!(events.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_unregistered_file_is_noop() {
        let (mut store, registry) = setup(&[("/a.yaml", 1)]);
        reconcile(&mut store, &registry, conf(&[("k", 1.into())]), Path::new("/a.yaml"));

        let events = reconcile(
            &mut store,
            &registry,
            conf(&[("k", 2.into()), ("new", 3.into())]),
            Path::new("/ghost.yaml"),
        );

        assert!(events.is_empty());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k"), Some(Value::from(1)));
    }

    #[test]
    fn test_lower_number_wins_regardless_of_order() {
        for order in [["/f1.yaml", "/f2.yaml"], ["/f2.yaml", "/f1.yaml"]] {
            let (mut store, registry) = setup(&[("/f1.yaml", 1), ("/f2.yaml", 2)]);
            for path in order {
                let value = if path == "/f1.yaml" { "one" } else { "two" };
                reconcile(&mut store, &registry, conf(&[("k", value.into())]), Path::new(path));
            }
            assert_eq!(store.get("k"), Some(Value::from("one")));
            assert_eq!(store.owner_of("k"), Some(Path::new("/f1.yaml")));
        }
    }

    #[test]
    fn test_displacement_emits_update() {
        let (mut store, registry) = setup(&[("/weak.yaml", 5), ("/strong.yaml", 1)]);
        reconcile(&mut store, &registry, conf(&[("k", "weak".into())]), Path::new("/weak.yaml"));

        let events = reconcile(
            &mut store,
            &registry,
            conf(&[("k", "strong".into())]),
            Path::new("/strong.yaml"),
        );

        assert_eq!(events, vec![ChangeEvent::update(SOURCE_NAME, "k", "strong".into())]);
    }

    #[test]
    fn test_displacement_with_equal_value_is_silent() {
        let (mut store, registry) = setup(&[("/weak.yaml", 5), ("/strong.yaml", 1)]);
        reconcile(&mut store, &registry, conf(&[("k", 1.into())]), Path::new("/weak.yaml"));

        let events = reconcile(&mut store, &registry, conf(&[("k", 1.into())]), Path::new("/strong.yaml"));

        assert!(events.is_empty());
        assert_eq!(store.owner_of("k"), Some(Path::new("/strong.yaml")));
    }

    #[test]
    fn test_weaker_file_never_takes_effect() {
        let (mut store, registry) = setup(&[("/a.yaml", 1), ("/b.yaml", 5)]);
        reconcile(&mut store, &registry, conf(&[("db.host", "a".into())]), Path::new("/a.yaml"));

        let events = reconcile(
            &mut store,
            &registry,
            conf(&[("db.host", "b".into()), ("b.only", true.into())]),
            Path::new("/b.yaml"),
        );
        assert_eq!(events, vec![ChangeEvent::create(SOURCE_NAME, "b.only", true.into())]);
        assert_eq!(store.get("db.host"), Some(Value::from("a")));

        // B drops db.host: it never owned it, so nothing happens to it.
        let events = reconcile(
            &mut store,
            &registry,
            conf(&[("b.only", true.into())]),
            Path::new("/b.yaml"),
        );
        assert!(events.is_empty());
        assert_eq!(store.get("db.host"), Some(Value::from("a")));
    }

    #[test]
    fn test_equal_priority_keeps_first_owner() {
        let (mut store, registry) = setup(&[("/first.yaml", 3), ("/second.yaml", 3)]);
        reconcile(&mut store, &registry, conf(&[("k", "first".into())]), Path::new("/first.yaml"));

        let events = reconcile(
            &mut store,
            &registry,
            conf(&[("k", "second".into())]),
            Path::new("/second.yaml"),
        );

        assert!(events.is_empty());
        assert_eq!(store.get("k"), Some(Value::from("first")));
        assert_eq!(store.owner_of("k"), Some(Path::new("/first.yaml")));
    }

    #[test]
    fn test_owner_removal_does_not_fall_back() {
        let (mut store, registry) = setup(&[("/strong.yaml", 1), ("/weak.yaml", 5)]);
        reconcile(&mut store, &registry, conf(&[("k", "weak".into())]), Path::new("/weak.yaml"));
        reconcile(&mut store, &registry, conf(&[("k", "strong".into())]), Path::new("/strong.yaml"));

        let events = reconcile(&mut store, &registry, FlatConfig::new(), Path::new("/strong.yaml"));

        assert_eq!(events, vec![ChangeEvent::delete(SOURCE_NAME, "k", "strong".into())]);
        assert!(store.get("k").is_none());
    }

    #[test]
    fn test_other_files_keys_untouched() {
        let (mut store, registry) = setup(&[("/a.yaml", 1), ("/b.yaml", 2)]);
        reconcile(&mut store, &registry, conf(&[("a.key", 1.into())]), Path::new("/a.yaml"));
        reconcile(&mut store, &registry, conf(&[("b.key", 2.into())]), Path::new("/b.yaml"));

        let events = reconcile(&mut store, &registry, FlatConfig::new(), Path::new("/b.yaml"));

        assert_eq!(events, vec![ChangeEvent::delete(SOURCE_NAME, "b.key", 2.into())]);
        assert_eq!(store.get("a.key"), Some(Value::from(1)));
    }

    #[test]
    fn test_every_key_owned_by_registered_file() {
        let (mut store, registry) = setup(&[("/a.yaml", 1), ("/b.yaml", 2), ("/c.yaml", 2)]);
        let files = ["/a.yaml", "/b.yaml", "/c.yaml", "/b.yaml", "/a.yaml"];
        for (i, path) in files.iter().enumerate() {
            let own_key = format!("own.{}", path);
            let contents = conf(&[
                ("shared", Value::from(i as u64)),
                (own_key.as_str(), Value::from(i as u64)),
            ]);
            reconcile(&mut store, &registry, contents, Path::new(path));
        }

        for entry in store.entries().values() {
            assert!(registry.exists(&entry.owner));
        }
        assert_eq!(store.owner_of("shared"), Some(PathBuf::from("/a.yaml").as_path()));
    }
}
