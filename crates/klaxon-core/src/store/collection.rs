// ── Ordered reactive entity collection ──
//
// Insertion-ordered storage with O(1) id lookups and push-based change
// notification via `watch` channels. Mutation methods are serialized
// behind a single mutex: the reconciler is the only writer, but the store
// is shared across tasks, so the guard makes each mutation one atomic
// step from any observer's point of view.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tokio::sync::watch;

/// Key accessor for entities stored in an [`EntityList`].
pub(crate) trait Keyed {
    fn key(&self) -> &str;
}

/// An ordered, reactive collection for a single entity type.
///
/// Entries keep insertion order with the most recent at the head. Every
/// mutation rebuilds the snapshot that subscribers receive, inside the
/// same locked step as the mutation itself.
pub(crate) struct EntityList<T> {
    /// Primary storage: entity id -> entity, head-first order.
    entries: Mutex<IndexMap<String, Arc<T>>>,

    /// Full snapshot, rebuilt on mutation for cheap subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Keyed + Clone + Send + Sync + 'static> EntityList<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            entries: Mutex::new(IndexMap::new()),
            snapshot,
        }
    }

    /// Discard the collection and replace it with `items`, keeping their
    /// order. A repeated id within `items` overwrites the earlier record.
    pub(crate) fn replace_all(&self, items: Vec<T>) {
        let mut map = self.lock();
        map.clear();
        for item in items {
            let key = item.key().to_owned();
            map.insert(key, Arc::new(item));
        }
        self.publish(&map);
    }

    /// Insert at the head. Silently ignored when an entity with the same
    /// id already exists. Returns `true` if the entity was inserted.
    pub(crate) fn prepend(&self, item: T) -> bool {
        let key = item.key().to_owned();
        let mut map = self.lock();
        if map.contains_key(&key) {
            return false;
        }
        map.shift_insert(0, key, Arc::new(item));
        self.publish(&map);
        true
    }

    /// Insert at the head and evict everything beyond `cap`, in one
    /// locked step -- no observer ever sees more than `cap` entries.
    /// A repeated id overwrites the existing record and moves it to the
    /// head rather than duplicating it.
    pub(crate) fn prepend_capped(&self, item: T, cap: usize) {
        let key = item.key().to_owned();
        let mut map = self.lock();
        map.shift_insert(0, key, Arc::new(item));
        map.truncate(cap);
        self.publish(&map);
    }

    /// Apply a partial update to the entity with this id, preserving its
    /// position. Returns `false` (and changes nothing) when the id is
    /// absent -- expected under network jitter, not an error.
    pub(crate) fn patch(&self, key: &str, update: impl FnOnce(&mut T)) -> bool {
        let mut map = self.lock();
        let Some(entry) = map.get_mut(key) else {
            return false;
        };
        let mut updated = (**entry).clone();
        update(&mut updated);
        *entry = Arc::new(updated);
        self.publish(&map);
        true
    }

    /// Replace the record with this id wholesale, preserving its
    /// position. Returns `false` when the id is absent.
    pub(crate) fn replace(&self, item: T) -> bool {
        let key = item.key().to_owned();
        let mut map = self.lock();
        let Some(entry) = map.get_mut(&key) else {
            return false;
        };
        *entry = Arc::new(item);
        self.publish(&map);
        true
    }

    /// Remove by id, preserving the order of the rest. Returns `false`
    /// when the id is absent.
    pub(crate) fn remove(&self, key: &str) -> bool {
        let mut map = self.lock();
        if map.shift_remove(key).is_none() {
            return false;
        }
        self.publish(&map);
        true
    }

    /// Look up an entity by id.
    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.lock().get(key).map(Arc::clone)
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Arc<T>>> {
        // A poisoned lock only means a panicked writer; the map itself
        // is never left mid-mutation.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Collect the values into a snapshot vec and broadcast it.
    fn publish(&self, map: &IndexMap<String, Arc<T>>) {
        let values: Vec<Arc<T>> = map.values().map(Arc::clone).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
