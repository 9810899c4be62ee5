//! Arena of producers, each behind its own lock, plus the owner index.
//!
//! The registry lock is only held long enough to clone handles out; all
//! producer mutation happens under the per-producer mutex. Removed ids are
//! retired for the life of the registry and can never be registered again.
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::producer::{OwnerId, Producer, ProducerId};

pub type SharedProducer = Arc<Mutex<Producer>>;

/// Producer ids of one owner. Most owners run a handful of units.
pub type OwnerProducerSet = SmallVec<[ProducerId; 8]>;

/// Lock a producer, recovering the state if a previous holder panicked.
pub fn lock_producer(shared: &SharedProducer) -> MutexGuard<'_, Producer> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct ProducerRegistry {
    producers: RwLock<BTreeMap<ProducerId, SharedProducer>>,
    owners: RwLock<HashMap<OwnerId, OwnerProducerSet>>,
    retired: RwLock<HashSet<ProducerId>>,
    next_id: AtomicU64,
}

impl Default for ProducerRegistry {
    fn default() -> Self {
        Self {
            producers: RwLock::new(BTreeMap::new()),
            owners: RwLock::new(HashMap::new()),
            retired: RwLock::new(HashSet::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl ProducerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh identifier.
    pub fn allocate_id(&self) -> ProducerId {
        ProducerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a producer. Returns `None` if the id is already taken or
    /// was removed earlier.
    pub fn insert(&self, producer: Producer) -> Option<SharedProducer> {
        let id = producer.id;
        let owner = producer.owner;
        let shared = Arc::new(Mutex::new(producer));
        {
            let mut producers = self.producers.write().unwrap_or_else(PoisonError::into_inner);
            if producers.contains_key(&id) || self.is_retired(id) {
                return None;
            }
            producers.insert(id, Arc::clone(&shared));
        }
        self.owners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(owner)
            .or_default()
            .push(id);
        // Records restored from persistence keep their ids; never reissue them.
        self.next_id
            .fetch_max(id.0.saturating_add(1), Ordering::Relaxed);
        Some(shared)
    }

    #[must_use]
    pub fn get(&self, id: ProducerId) -> Option<SharedProducer> {
        self.producers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, id: ProducerId) -> bool {
        self.producers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Whether `id` was removed and may not come back.
    #[must_use]
    pub fn is_retired(&self, id: ProducerId) -> bool {
        self.retired
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    /// Unregister a producer, retire its id, and drop it from its owner's set.
    pub fn remove(&self, id: ProducerId, owner: OwnerId) -> Option<SharedProducer> {
        let removed = {
            let mut producers = self.producers.write().unwrap_or_else(PoisonError::into_inner);
            // Retire under the arena lock so a concurrent insert sees either the
            // entry or the tombstone.
            self.retired
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id);
            producers.remove(&id)
        };
        let mut owners = self.owners.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(set) = owners.get_mut(&owner) {
            set.retain(|existing| *existing != id);
            if set.is_empty() {
                owners.remove(&owner);
            }
        }
        removed
    }

    /// Handles to every producer, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SharedProducer> {
        self.producers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn owner_ids(&self, owner: OwnerId) -> OwnerProducerSet {
        self.owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Handles to one owner's producers, ordered by id.
    #[must_use]
    pub fn for_owner(&self, owner: OwnerId) -> Vec<SharedProducer> {
        let mut ids = self.owner_ids(owner);
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.producers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration, returning the handles for a final save.
    /// Cleared producers are not retired; they may be loaded again.
    pub fn clear(&self) -> Vec<SharedProducer> {
        let drained = std::mem::take(
            &mut *self.producers.write().unwrap_or_else(PoisonError::into_inner),
        );
        self.owners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        drained.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProducerType;
    use crate::producer::Position;
    use crate::time::Timestamp;

    fn producer(id: u64, owner: u64) -> Producer {
        Producer::new(
            ProducerId(id),
            OwnerId(owner),
            &ProducerType::new("sand", "Sand", "sand", 1),
            Position::default(),
            Timestamp::ZERO,
        )
    }

    #[test]
    fn insert_indexes_owner_and_rejects_duplicates() {
        let registry = ProducerRegistry::new();
        assert!(registry.insert(producer(1, 10)).is_some());
        assert!(registry.insert(producer(2, 10)).is_some());
        assert!(registry.insert(producer(1, 11)).is_none());
        assert_eq!(registry.owner_ids(OwnerId(10)).as_slice(), &[ProducerId(1), ProducerId(2)]);
        assert!(registry.owner_ids(OwnerId(11)).is_empty());
    }

    #[test]
    fn loaded_ids_are_never_reissued() {
        let registry = ProducerRegistry::new();
        registry.insert(producer(41, 1));
        assert_eq!(registry.allocate_id(), ProducerId(42));
    }

    #[test]
    fn remove_cleans_owner_index() {
        let registry = ProducerRegistry::new();
        registry.insert(producer(5, 3));
        assert!(registry.remove(ProducerId(5), OwnerId(3)).is_some());
        assert!(registry.remove(ProducerId(5), OwnerId(3)).is_none());
        assert!(registry.for_owner(OwnerId(3)).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn removed_ids_cannot_be_registered_again() {
        let registry = ProducerRegistry::new();
        registry.insert(producer(7, 2));
        registry.remove(ProducerId(7), OwnerId(2));
        assert!(registry.is_retired(ProducerId(7)));
        assert!(registry.insert(producer(7, 2)).is_none());
        assert!(registry.owner_ids(OwnerId(2)).is_empty());
        assert!(!registry.contains(ProducerId(7)));
    }

    #[test]
    fn cleared_producers_can_be_loaded_again() {
        let registry = ProducerRegistry::new();
        registry.insert(producer(3, 1));
        assert_eq!(registry.clear().len(), 1);
        assert!(!registry.is_retired(ProducerId(3)));
        assert!(registry.insert(producer(3, 1)).is_some());
    }

    #[test]
    fn snapshot_is_ordered_by_id() {
        let registry = ProducerRegistry::new();
        for id in [9, 2, 5] {
            registry.insert(producer(id, 1));
        }
        let ids: Vec<u64> = registry
            .snapshot()
            .iter()
            .map(|shared| lock_producer(shared).id.0)
            .collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }
}
