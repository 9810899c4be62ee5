//! In-process collaborators for tests, simulations, and single-process hosts.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::producer::{OwnerId, Position, Producer, ProducerId};
use crate::reward::YieldBatch;
use crate::{
    Collaborators, Currency, EffectKind, OwnerNotice, Persistence, Presence, Presentation,
    WorldSink,
};

/// Set of owners considered online.
#[derive(Debug, Default)]
pub struct MemoryPresence {
    online: RwLock<HashSet<OwnerId>>,
}

impl MemoryPresence {
    pub fn set_online(&self, owner: OwnerId, online: bool) {
        let mut set = self.online.write().unwrap_or_else(PoisonError::into_inner);
        if online {
            set.insert(owner);
        } else {
            set.remove(&owner);
        }
    }
}

impl Presence for MemoryPresence {
    fn is_owner_online(&self, owner: OwnerId) -> bool {
        self.online
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&owner)
    }
}

/// Balance table. Charges can be switched off to model a ledger that
/// refuses after approving the balance check.
#[derive(Debug, Default)]
pub struct MemoryWallet {
    balances: Mutex<HashMap<OwnerId, u64>>,
    refuse_charges: AtomicBool,
}

impl MemoryWallet {
    pub fn credit(&self, owner: OwnerId, amount: u64) {
        let mut balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
        let balance = balances.entry(owner).or_default();
        *balance = balance.saturating_add(amount);
    }

    #[must_use]
    pub fn balance(&self, owner: OwnerId) -> u64 {
        self.balances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&owner)
            .copied()
            .unwrap_or(0)
    }

    pub fn refuse_charges(&self, refuse: bool) {
        self.refuse_charges.store(refuse, Ordering::Relaxed);
    }
}

impl Currency for MemoryWallet {
    fn has_funds(&self, owner: OwnerId, amount: u64) -> bool {
        self.balance(owner) >= amount
    }

    fn charge(&self, owner: OwnerId, amount: u64) -> bool {
        if self.refuse_charges.load(Ordering::Relaxed) {
            return false;
        }
        let mut balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
        match balances.get_mut(&owner) {
            Some(balance) if *balance >= amount => {
                *balance -= amount;
                true
            }
            _ => false,
        }
    }
}

/// Keyed record store with write counters.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<ProducerId, Producer>>,
    saves: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryStore {
    /// Seed a record as if a previous process had saved it.
    pub fn seed(&self, producer: Producer) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(producer.id, producer);
    }

    #[must_use]
    pub fn record(&self, id: ProducerId) -> Option<Producer> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::Relaxed)
    }
}

impl Persistence for MemoryStore {
    fn save_producer(&self, producer: &Producer) {
        self.saves.fetch_add(1, Ordering::Relaxed);
        self.seed(producer.clone());
    }

    fn load_producers_for_owner(&self, owner: OwnerId) -> Vec<Producer> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|producer| producer.owner == owner)
            .cloned()
            .collect()
    }

    fn delete_producer(&self, id: ProducerId) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// Records every effect and notice instead of drawing them.
#[derive(Debug, Default)]
pub struct RecordingPresentation {
    effects: Mutex<Vec<(Position, EffectKind)>>,
    notices: Mutex<Vec<(OwnerId, OwnerNotice)>>,
}

impl RecordingPresentation {
    #[must_use]
    pub fn effects(&self) -> Vec<(Position, EffectKind)> {
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<(OwnerId, OwnerNotice)> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn count(&self, matches: impl Fn(&EffectKind) -> bool) -> usize {
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, effect)| matches(effect))
            .count()
    }
}

impl Presentation for RecordingPresentation {
    fn show_feedback(&self, position: &Position, effect: EffectKind) {
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((position.clone(), effect));
    }

    fn notify_owner(&self, owner: OwnerId, notice: &OwnerNotice) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((owner, notice.clone()));
    }
}

/// World sink that keeps what would have been dropped at the producer.
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<(OwnerId, YieldBatch)>>,
}

impl MemorySink {
    #[must_use]
    pub fn delivered(&self) -> Vec<(OwnerId, YieldBatch)> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, batch)| batch.quantity)
            .sum()
    }
}

impl WorldSink for MemorySink {
    fn deliver_or_drop(&self, owner: OwnerId, _position: &Position, batch: YieldBatch) {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((owner, batch));
    }
}

/// Concrete handles to every in-memory collaborator, kept so callers can
/// inspect them after handing [`MemoryWorld::collaborators`] to an engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorld {
    pub presence: Arc<MemoryPresence>,
    pub wallet: Arc<MemoryWallet>,
    pub store: Arc<MemoryStore>,
    pub presentation: Arc<RecordingPresentation>,
    pub sink: Arc<MemorySink>,
}

impl MemoryWorld {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            presence: self.presence.clone(),
            currency: self.wallet.clone(),
            persistence: self.store.clone(),
            presentation: self.presentation.clone(),
            sink: self.sink.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ProducerType, ResourceKind};
    use crate::time::Timestamp;

    #[test]
    fn wallet_charges_only_what_it_holds() {
        let wallet = MemoryWallet::default();
        wallet.credit(OwnerId(1), 75);
        assert!(wallet.has_funds(OwnerId(1), 50));
        assert!(wallet.charge(OwnerId(1), 50));
        assert!(!wallet.charge(OwnerId(1), 50));
        assert_eq!(wallet.balance(OwnerId(1)), 25);
        assert!(!wallet.charge(OwnerId(2), 1));
    }

    #[test]
    fn refused_charges_leave_balance_alone() {
        let wallet = MemoryWallet::default();
        wallet.credit(OwnerId(1), 100);
        wallet.refuse_charges(true);
        assert!(wallet.has_funds(OwnerId(1), 50));
        assert!(!wallet.charge(OwnerId(1), 50));
        assert_eq!(wallet.balance(OwnerId(1)), 100);
    }

    #[test]
    fn store_filters_by_owner() {
        let store = MemoryStore::default();
        let sand = ProducerType::new("sand", "Sand", "sand", 1);
        for (id, owner) in [(1, 10), (2, 11), (3, 10)] {
            store.save_producer(&Producer::new(
                ProducerId(id),
                OwnerId(owner),
                &sand,
                Position::default(),
                Timestamp::ZERO,
            ));
        }
        let ids: Vec<u64> = store
            .load_producers_for_owner(OwnerId(10))
            .iter()
            .map(|producer| producer.id.0)
            .collect();
        assert_eq!(ids, vec![1, 3]);
        store.delete_producer(ProducerId(1));
        assert_eq!(store.len(), 2);
        assert_eq!((store.saves(), store.deletes()), (3, 1));
    }

    #[test]
    fn presence_toggles() {
        let presence = MemoryPresence::default();
        presence.set_online(OwnerId(4), true);
        assert!(presence.is_owner_online(OwnerId(4)));
        presence.set_online(OwnerId(4), false);
        assert!(!presence.is_owner_online(OwnerId(4)));
    }

    #[test]
    fn sink_totals_quantities() {
        let sink = MemorySink::default();
        let stone = ResourceKind::new("stone");
        sink.deliver_or_drop(OwnerId(1), &Position::default(), YieldBatch::new(stone.clone(), 3, false));
        sink.deliver_or_drop(OwnerId(1), &Position::default(), YieldBatch::new(stone, 4, true));
        assert_eq!(sink.total_quantity(), 7);
    }
}
