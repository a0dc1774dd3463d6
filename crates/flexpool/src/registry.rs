//! Concurrent worker membership.
//!
//! Every method takes the registry lock for exactly one operation and never
//! calls into worker code or touches a channel while holding it.

use parking_lot::Mutex;
use std::collections::{HashMap, hash_map::Entry};
use std::hash::Hash;
use std::sync::Arc;

/// Why [`Registry::insert_with`] did not register a worker.
pub(crate) enum Rejected<E> {
    /// The identity is already taken.
    Occupied,
    /// The start hook failed; nothing was inserted.
    Start(E),
}

/// Identity-keyed map of active workers.
pub(crate) struct Registry<Id, W> {
    workers: Mutex<HashMap<Id, Arc<W>>>,
}

impl<Id, W> Registry<Id, W>
where
    Id: Eq + Hash + Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `worker` under `id` unless the id is taken.
    ///
    /// The occupancy check, `start` and the insertion happen in one critical
    /// section, so two racing inserts for the same id cannot both succeed and
    /// a worker is never visible before it was started. `start` must not block.
    pub(crate) fn insert_with<E>(
        &self,
        id: Id,
        worker: Arc<W>,
        start: impl FnOnce(Arc<W>) -> Result<(), E>,
    ) -> Result<(), Rejected<E>> {
        let mut workers = self.workers.lock();
        match workers.entry(id) {
            Entry::Occupied(_) => Err(Rejected::Occupied),
            Entry::Vacant(slot) => {
                start(Arc::clone(&worker)).map_err(Rejected::Start)?;
                slot.insert(worker);
                Ok(())
            }
        }
    }

    pub(crate) fn remove(&self, id: &Id) -> Option<Arc<W>> {
        self.workers.lock().remove(id)
    }

    /// Removes whichever worker the map yields first. No order is implied.
    pub(crate) fn remove_any(&self) -> Option<(Id, Arc<W>)> {
        let mut workers = self.workers.lock();
        let id = workers.keys().next()?.clone();
        workers.remove_entry(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.workers.lock().len()
    }

    pub(crate) fn contains(&self, id: &Id) -> bool {
        self.workers.lock().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admit(registry: &Registry<u32, &'static str>, id: u32, name: &'static str) -> bool {
        registry
            .insert_with(id, Arc::new(name), |_| Ok::<_, ()>(()))
            .is_ok()
    }

    #[test]
    fn insert_rejects_taken_ids() {
        let registry = Registry::new();
        assert!(admit(&registry, 1, "a"));
        assert!(!admit(&registry, 1, "b"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.remove(&1).as_deref(), Some(&"a"));
    }

    #[test]
    fn failed_start_leaves_no_entry() {
        let registry: Registry<u32, &str> = Registry::new();
        let res = registry.insert_with(3, Arc::new("c"), |_| Err("no threads"));

        assert!(matches!(res, Err(Rejected::Start("no threads"))));
        assert!(!registry.contains(&3));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn remove_any_drains_every_entry() {
        let registry = Registry::new();
        for id in 0..4 {
            assert!(admit(&registry, id, "w"));
        }

        let mut seen = Vec::new();
        while let Some((id, _)) = registry.remove_any() {
            assert!(!registry.contains(&id));
            seen.push(id);
        }
        seen.sort_unstable();

        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert!(registry.remove_any().is_none());
    }
}
