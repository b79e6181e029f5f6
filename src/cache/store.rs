use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::debug;

use super::{CacheError, ConstraintCache};
use crate::model::{System, SystemId};

/// Constraint caches keyed by entity-tree identity.
///
/// An entry is reused while the tree's structural revision is unchanged and
/// rebuilt otherwise. Failed builds leave no entry behind. Entries of
/// dropped systems are pruned whenever a new cache is stored.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: RwLock<HashMap<SystemId, Entry>>,
    builds: AtomicUsize,
}

#[derive(Debug)]
struct Entry {
    cache: Arc<ConstraintCache>,
    owner: Weak<()>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cache for `system`, building it on first use or after a
    /// structural change.
    pub fn get_or_build(&self, system: &System) -> Result<Arc<ConstraintCache>, CacheError> {
        {
            let guard = self.entries.read().map_err(|_| CacheError::Poisoned)?;
            if let Some(entry) = guard.get(&system.id()) {
                if entry.cache.revision() == system.revision() {
                    debug!(system = %system.id(), "constraint cache hit");
                    return Ok(Arc::clone(&entry.cache));
                }
            }
        }

        let built = ConstraintCache::build(system);
        let mut guard = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        let built = match built {
            Ok(cache) => cache,
            Err(e) => {
                guard.remove(&system.id());
                return Err(e);
            }
        };
        self.builds.fetch_add(1, Ordering::Relaxed);

        // Another thread may have built the same revision meanwhile.
        if let Some(entry) = guard.get(&system.id()) {
            if entry.cache.revision() == system.revision() {
                return Ok(Arc::clone(&entry.cache));
            }
        }
        let cache = Arc::new(built);
        guard.insert(
            system.id(),
            Entry {
                cache: Arc::clone(&cache),
                owner: system.liveness(),
            },
        );
        let before = guard.len();
        guard.retain(|_, entry| entry.is_live());
        if guard.len() < before {
            debug!(evicted = before - guard.len(), "dropped caches of released systems");
        }
        Ok(cache)
    }

    /// Drops the caches of systems that no longer exist. Returns how many
    /// were removed.
    pub fn prune(&self) -> usize {
        let mut guard = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = guard.len();
        guard.retain(|_, entry| entry.is_live());
        before - guard.len()
    }

    /// Drops the cache of one entity tree. Returns whether one existed.
    pub fn invalidate(&self, system: SystemId) -> bool {
        match self.entries.write() {
            Ok(mut guard) => guard.remove(&system).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(&system).is_some(),
        }
    }

    pub fn clear(&self) {
        match self.entries.write() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful cache constructions so far.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{name, num, Function};

    fn system() -> System {
        let mut sys = System::new("plant");
        let root = sys.root();
        let a = sys.add_port(root, "A", 5).unwrap();
        let b = sys.add_port(root, "B", 0).unwrap();
        sys.add_influence(root, "copy", a, b, Function::unary("v", name("v")))
            .unwrap();
        sys
    }

    #[test]
    fn second_call_reuses_cache() {
        let store = CacheStore::new();
        let sys = system();
        let first = store.get_or_build(&sys).unwrap();
        let second = store.get_or_build(&sys).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.builds(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn value_changes_keep_cache_structural_changes_rebuild() {
        let store = CacheStore::new();
        let mut sys = system();
        let first = store.get_or_build(&sys).unwrap();

        let a = sys.find_port(sys.root(), "A").unwrap();
        sys.set_value(a, 42).unwrap();
        let same = store.get_or_build(&sys).unwrap();
        assert!(Arc::ptr_eq(&first, &same));

        sys.add_port(sys.root(), "C", 0).unwrap();
        let rebuilt = store.get_or_build(&sys).unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.port_count(), 3);
        assert_eq!(store.builds(), 2);
    }

    #[test]
    fn failed_build_leaves_no_entry() {
        let store = CacheStore::new();
        let mut sys = system();
        store.get_or_build(&sys).unwrap();
        let s = sys.add_state(sys.root(), "run").unwrap();
        sys.add_transition(sys.root(), "bad", s, s, name("nope").gt(num(0)))
            .unwrap();
        assert!(store.get_or_build(&sys).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn forks_get_their_own_cache() {
        let store = CacheStore::new();
        let base = system();
        let mut left = base.clone();
        let mut right = base.clone();
        let root = base.root();
        left.add_port(root, "L", 0).unwrap();
        right.add_port(root, "R1", 0).unwrap();
        right.add_port(root, "R2", 0).unwrap();
        left.add_port(root, "L2", 0).unwrap();
        assert_eq!(left.revision(), right.revision());

        let l = store.get_or_build(&left).unwrap();
        let r = store.get_or_build(&right).unwrap();
        assert!(!Arc::ptr_eq(&l, &r));
        assert_eq!(l.system(), left.id());
        assert_eq!(r.system(), right.id());
        assert_eq!(store.builds(), 2);
    }

    #[test]
    fn dropped_systems_are_evicted() {
        let store = CacheStore::new();
        let keep = system();
        let gone = keep.clone();
        store.get_or_build(&gone).unwrap();
        assert_eq!(store.len(), 1);

        drop(gone);
        store.get_or_build(&keep).unwrap();
        assert_eq!(store.len(), 1);

        let other = keep.clone();
        store.get_or_build(&other).unwrap();
        drop(other);
        assert_eq!(store.prune(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.prune(), 0);
    }

    #[test]
    fn invalidate_and_clear() {
        let store = CacheStore::new();
        let sys = system();
        store.get_or_build(&sys).unwrap();
        assert!(store.invalidate(sys.id()));
        assert!(!store.invalidate(sys.id()));
        store.get_or_build(&sys).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.builds(), 2);
    }
}
