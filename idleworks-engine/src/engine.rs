//! Production engine facade: the operations a host game calls.
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

use crate::Collaborators;
use crate::catalog::{Catalog, ProducerTypeId};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::numbers::fill_ratio;
use crate::offline::{self, ReconciliationReport, Settlement};
use crate::producer::{OwnerId, Position, Producer, ProducerId};
use crate::registry::{ProducerRegistry, SharedProducer, lock_producer};
use crate::reward::YieldBatch;
use crate::rng::RngBundle;
use crate::scheduler::{self, TickReport};
use crate::time::Timestamp;
use crate::upgrade::{self, UpgradeReceipt};

/// Shared state every engine pass reads.
pub(crate) struct EngineContext {
    catalog: RwLock<Arc<Catalog>>,
    pub(crate) config: EngineConfig,
    pub(crate) services: Collaborators,
    pub(crate) rng: RngBundle,
}

impl EngineContext {
    /// Catalog in effect for the current pass.
    pub(crate) fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Fill level of one producer's storage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageStatus {
    pub used: usize,
    pub capacity: usize,
    pub fill_ratio: f64,
}

/// Idle production engine.
///
/// Every method takes `&self`; the engine is meant to be shared behind an
/// `Arc` between a fast tick driver, a slow reconciliation driver, and
/// request handlers. Per-producer mutation is serialized by a lock on each
/// producer. The drivers must not overlap themselves: one `tick` at a time
/// and one `run_reconciliation` at a time.
pub struct ProductionEngine {
    ctx: EngineContext,
    registry: ProducerRegistry,
}

impl std::fmt::Debug for ProductionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductionEngine")
            .field("config", &self.ctx.config)
            .field("catalog_types", &self.ctx.catalog().len())
            .field("producers", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl ProductionEngine {
    /// # Errors
    ///
    /// Returns [`EngineError::CatalogTierGap`] if the catalog was validated
    /// for fewer tiers than `config.max_tier`.
    pub fn new(
        config: EngineConfig,
        catalog: Arc<Catalog>,
        services: Collaborators,
    ) -> Result<Self, EngineError> {
        check_tier_coverage(&catalog, &config)?;
        let rng = RngBundle::from_seed(config.rng_seed);
        Ok(Self {
            ctx: EngineContext {
                catalog: RwLock::new(catalog),
                config,
                services,
                rng,
            },
            registry: ProducerRegistry::new(),
        })
    }

    /// Engine on the bundled configuration and catalog.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CatalogTierGap`] if the bundled configuration
    /// allows more tiers than the bundled catalog covers.
    pub fn with_defaults(services: Collaborators) -> Result<Self, EngineError> {
        Self::new(
            EngineConfig::load_from_static(),
            Arc::new(Catalog::bundled().clone()),
            services,
        )
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        self.ctx.catalog()
    }

    /// Swap in a new producer table. Passes already running finish on the
    /// old one; producers whose type disappeared are skipped until it returns.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CatalogTierGap`] and keeps the current table if
    /// the new one was validated for fewer tiers than the engine allows.
    pub fn replace_catalog(&self, catalog: Arc<Catalog>) -> Result<(), EngineError> {
        check_tier_coverage(&catalog, &self.ctx.config)?;
        info!("catalog replaced ({} types)", catalog.len());
        *self
            .ctx
            .catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner) = catalog;
        Ok(())
    }

    /// `(tick, offline)` RNG draw counts.
    #[must_use]
    pub fn rng_draws(&self) -> (u64, u64) {
        self.ctx.rng.draws()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Create a tier-1 producer whose first action is due one interval after `now`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownProducerType`] if the type is not in the catalog.
    pub fn place_producer(
        &self,
        owner: OwnerId,
        type_id: &ProducerTypeId,
        position: Position,
        now: Timestamp,
    ) -> Result<Producer, EngineError> {
        let catalog = self.ctx.catalog();
        let producer_type = catalog
            .get(type_id)
            .ok_or_else(|| EngineError::UnknownProducerType(type_id.clone()))?;
        let id = self.registry.allocate_id();
        let producer = Producer::new(id, owner, producer_type, position, now);
        self.ctx.services.persistence.save_producer(&producer);
        if self.registry.insert(producer.clone()).is_none() {
            warn!("{id} was already registered; keeping the existing entry");
        }
        info!("{owner} placed {id} ({type_id})");
        Ok(producer)
    }

    /// One scheduler pass: every due producer of an online owner fires once.
    pub fn tick(&self, now: Timestamp) -> TickReport {
        let producers = self.registry.snapshot();
        let report = scheduler::run_tick(&self.ctx, &producers, now);
        if report.fired > 0 {
            debug!(
                "tick at {now}: {} fired, {} overflowed",
                report.fired, report.overflowed
            );
        }
        report
    }

    /// One reconciliation pass over producers whose owners are offline.
    pub fn run_reconciliation(&self, now: Timestamp) -> ReconciliationReport {
        let producers = self.registry.snapshot();
        offline::run_reconciliation(&self.ctx, &producers, now)
    }

    /// Drain a producer's storage for its owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer is unknown, being removed, or owned
    /// by someone else.
    pub fn collect(&self, id: ProducerId, collector: OwnerId) -> Result<Vec<YieldBatch>, EngineError> {
        let shared = self.lookup(id)?;
        let mut producer = lock_producer(&shared);
        ensure_usable(&producer, collector)?;
        let batches = producer.storage_mut().drain();
        if !batches.is_empty() {
            self.ctx.services.persistence.save_producer(&producer);
        }
        debug!("{collector} collected {} batches from {id}", batches.len());
        Ok(batches)
    }

    /// Charge `payer` and raise the producer one tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer is unknown or unusable, already at
    /// the maximum tier, or the payer cannot or will not pay.
    pub fn upgrade(&self, id: ProducerId, payer: OwnerId) -> Result<UpgradeReceipt, EngineError> {
        let shared = self.lookup(id)?;
        let mut producer = lock_producer(&shared);
        upgrade::apply_upgrade(&self.ctx, &mut producer, payer)
    }

    /// Price of the next upgrade, or `None` at the maximum tier.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ProducerNotFound`] if the producer is unknown.
    pub fn upgrade_cost(&self, id: ProducerId) -> Result<Option<u64>, EngineError> {
        let shared = self.lookup(id)?;
        let tier = lock_producer(&shared).tier();
        if tier >= self.ctx.config.max_tier {
            return Ok(None);
        }
        Ok(Some(upgrade::upgrade_cost(
            self.ctx.config.base_upgrade_cost,
            tier,
        )))
    }

    /// Stop a producer immediately and forget it.
    ///
    /// The producer is deactivated under its own lock, so any pass that
    /// already holds a handle sees it inactive and leaves it alone. Whatever
    /// was still in storage is returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ProducerNotFound`] if the producer is unknown.
    pub fn remove_producer(&self, id: ProducerId) -> Result<Vec<YieldBatch>, EngineError> {
        let shared = self.lookup(id)?;
        let mut producer = lock_producer(&shared);
        if !producer.is_active() {
            return Err(EngineError::ProducerNotFound(id));
        }
        producer.deactivate();
        self.registry.remove(id, producer.owner);
        self.ctx.services.persistence.delete_producer(id);
        info!("{} removed {id}", producer.owner);
        Ok(producer.storage_mut().drain())
    }

    /// Settle an owner's absence the moment they come back online.
    ///
    /// Call after the presence collaborator reports the owner online. Each
    /// active producer receives the same capped catch-up as reconciliation;
    /// backlog beyond the cap is dropped so online ticking resumes on phase.
    pub fn owner_connected(&self, owner: OwnerId, now: Timestamp) -> Vec<Settlement> {
        let producers = self.registry.for_owner(owner);
        let settlements = offline::settle_on_connect(&self.ctx, owner, &producers, now);
        if !settlements.is_empty() {
            info!("{owner} reconnected; settled {} producers", settlements.len());
        }
        settlements
    }

    /// Register an owner's persisted producers that are not already loaded.
    /// Returns how many were registered.
    ///
    /// Records whose type is missing from the catalog are registered as-is;
    /// the passes skip them until the type comes back. A record of a producer
    /// removed from this engine is never registered, even if the load read it
    /// before the removal deleted it.
    pub fn load_owner(&self, owner: OwnerId) -> usize {
        let catalog = self.ctx.catalog();
        let mut loaded = 0;
        for mut producer in self.ctx.services.persistence.load_producers_for_owner(owner) {
            if producer.owner != owner || !producer.is_active() {
                continue;
            }
            if self.registry.contains(producer.id) || self.registry.is_retired(producer.id) {
                continue;
            }
            match catalog.get(&producer.type_id) {
                Some(producer_type) => producer.normalize(producer_type, self.ctx.config.max_tier),
                None => warn!(
                    "{} references unknown type `{}`; loading it idle",
                    producer.id, producer.type_id
                ),
            }
            if self.registry.insert(producer).is_some() {
                loaded += 1;
            }
        }
        if loaded > 0 {
            info!("{owner}: loaded {loaded} producers from persistence");
        }
        loaded
    }

    /// Set the bonus chance of one producer, clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ProducerNotFound`] if the producer is unknown.
    pub fn set_luck(&self, id: ProducerId, luck: f64) -> Result<(), EngineError> {
        let shared = self.lookup(id)?;
        let mut producer = lock_producer(&shared);
        producer.set_luck(luck);
        self.ctx.services.persistence.save_producer(&producer);
        Ok(())
    }

    /// Snapshot of one producer.
    #[must_use]
    pub fn producer(&self, id: ProducerId) -> Option<Producer> {
        self.registry
            .get(id)
            .map(|shared| lock_producer(&shared).clone())
    }

    /// Snapshots of an owner's producers, ordered by id.
    #[must_use]
    pub fn producers_for_owner(&self, owner: OwnerId) -> Vec<Producer> {
        self.registry
            .for_owner(owner)
            .iter()
            .map(|shared| lock_producer(shared).clone())
            .collect()
    }

    /// # Errors
    ///
    /// Returns [`EngineError::ProducerNotFound`] if the producer is unknown.
    pub fn storage_status(&self, id: ProducerId) -> Result<StorageStatus, EngineError> {
        let shared = self.lookup(id)?;
        let producer = lock_producer(&shared);
        let storage = producer.storage();
        Ok(StorageStatus {
            used: storage.used(),
            capacity: storage.capacity(),
            fill_ratio: fill_ratio(storage.used(), storage.capacity()),
        })
    }

    /// Persist every registered producer and empty the registry.
    /// Returns how many records were saved.
    pub fn shutdown(&self) -> usize {
        let producers = self.registry.clear();
        let mut saved = 0;
        for shared in &producers {
            let producer = lock_producer(shared);
            if producer.is_active() {
                self.ctx.services.persistence.save_producer(&producer);
                saved += 1;
            }
        }
        info!("engine shut down; saved {saved} producers");
        saved
    }

    fn lookup(&self, id: ProducerId) -> Result<SharedProducer, EngineError> {
        self.registry
            .get(id)
            .ok_or(EngineError::ProducerNotFound(id))
    }
}

fn check_tier_coverage(catalog: &Catalog, config: &EngineConfig) -> Result<(), EngineError> {
    if catalog.max_tier() < config.max_tier {
        return Err(EngineError::CatalogTierGap {
            validated: catalog.max_tier(),
            required: config.max_tier,
        });
    }
    Ok(())
}

fn ensure_usable(producer: &Producer, requester: OwnerId) -> Result<(), EngineError> {
    if !producer.is_active() {
        return Err(EngineError::Inactive(producer.id));
    }
    if producer.owner != requester {
        return Err(EngineError::OwnerMismatch {
            producer: producer.id,
            owner: requester,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ProducerType, TierScaling};
    use crate::memory::MemoryWorld;
    use crate::EffectKind;
    use std::time::Duration;

    const OWNER: OwnerId = OwnerId(1);

    fn fixture_catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::new(
                vec![
                    // 6 s at tier 1, 5 s at tier 2.
                    ProducerType::new("cobblestone", "Cobblestone", "cobblestone", 1),
                    ProducerType::new("ice", "Ice", "ice", 2)
                        .with_scaling(TierScaling::fixed(6, 2)),
                ],
                11,
            )
            .unwrap(),
        )
    }

    fn engine_with(world: &MemoryWorld) -> ProductionEngine {
        ProductionEngine::new(EngineConfig::default(), fixture_catalog(), world.collaborators())
            .unwrap()
    }

    fn place(engine: &ProductionEngine, type_id: &str) -> ProducerId {
        engine
            .place_producer(
                OWNER,
                &ProducerTypeId::new(type_id),
                Position::new("island", 0, 64, 0),
                Timestamp::ZERO,
            )
            .unwrap()
            .id
    }

    #[test]
    fn placement_rejects_unknown_types() {
        let world = MemoryWorld::new();
        let engine = engine_with(&world);
        let err = engine
            .place_producer(
                OWNER,
                &ProducerTypeId::new("bedrock"),
                Position::default(),
                Timestamp::ZERO,
            )
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownProducerType(ProducerTypeId::new("bedrock")));
        assert!(engine.is_empty());
    }

    #[test]
    fn placement_persists_and_is_queryable() {
        let world = MemoryWorld::new();
        let engine = engine_with(&world);
        let id = place(&engine, "cobblestone");
        assert_eq!(world.store.len(), 1);
        let snapshot = engine.producer(id).unwrap();
        assert_eq!(snapshot.tier(), 1);
        assert_eq!(engine.producers_for_owner(OWNER).len(), 1);
    }

    #[test]
    fn tick_fires_once_per_interval_for_online_owner() {
        let world = MemoryWorld::new();
        world.presence.set_online(OWNER, true);
        let engine = engine_with(&world);
        let id = place(&engine, "cobblestone");

        assert_eq!(engine.tick(Timestamp::from_secs(5)).fired, 0);
        assert_eq!(engine.tick(Timestamp::from_secs(6)).fired, 1);
        assert_eq!(engine.tick(Timestamp::from_secs(6)).fired, 0);
        let producer = engine.producer(id).unwrap();
        assert_eq!(producer.last_action(), Timestamp::from_secs(6));
        assert_eq!(producer.storage().used(), 1);
    }

    #[test]
    fn tick_ignores_offline_owners() {
        let world = MemoryWorld::new();
        let engine = engine_with(&world);
        place(&engine, "cobblestone");
        let report = engine.tick(Timestamp::from_secs(60));
        assert_eq!(report.fired, 0);
        assert_eq!(report.skipped_offline, 1);
    }

    #[test]
    fn reconciliation_skips_online_owners() {
        let world = MemoryWorld::new();
        world.presence.set_online(OWNER, true);
        let engine = engine_with(&world);
        place(&engine, "cobblestone");
        let report = engine.run_reconciliation(Timestamp::from_secs(600));
        assert_eq!(report.settled, 0);
        assert_eq!(report.skipped_online, 1);
    }

    #[test]
    fn collect_checks_owner_and_drains() {
        let world = MemoryWorld::new();
        world.presence.set_online(OWNER, true);
        let engine = engine_with(&world);
        let id = place(&engine, "cobblestone");
        engine.tick(Timestamp::from_secs(6));

        assert_eq!(
            engine.collect(id, OwnerId(2)).unwrap_err(),
            EngineError::OwnerMismatch {
                producer: id,
                owner: OwnerId(2)
            }
        );
        let batches = engine.collect(id, OWNER).unwrap();
        assert_eq!(batches.len(), 1);
        assert!(engine.collect(id, OWNER).unwrap().is_empty());
    }

    #[test]
    fn full_storage_routes_to_sink_while_online() {
        let world = MemoryWorld::new();
        world.presence.set_online(OWNER, true);
        let engine = engine_with(&world);
        let id = place(&engine, "ice");
        for step in 1..=3 {
            engine.tick(Timestamp::from_secs(10 * step));
        }
        assert_eq!(engine.storage_status(id).unwrap().used, 2);
        assert_eq!(world.sink.delivered().len(), 1);
        assert_eq!(world.presentation.count(|effect| *effect == EffectKind::Overflow), 1);
    }

    #[test]
    fn upgrade_cost_query_stops_at_max_tier() {
        let world = MemoryWorld::new();
        world.wallet.credit(OWNER, u64::MAX);
        let engine = engine_with(&world);
        let id = place(&engine, "cobblestone");
        assert_eq!(engine.upgrade_cost(id).unwrap(), Some(50));
        for _ in 1..11 {
            engine.upgrade(id, OWNER).unwrap();
        }
        assert_eq!(engine.upgrade_cost(id).unwrap(), None);
        assert_eq!(
            engine.upgrade(id, OWNER).unwrap_err(),
            EngineError::MaxTierReached { tier: 11 }
        );
    }

    #[test]
    fn remove_returns_storage_and_forgets_producer() {
        let world = MemoryWorld::new();
        world.presence.set_online(OWNER, true);
        let engine = engine_with(&world);
        let id = place(&engine, "cobblestone");
        engine.tick(Timestamp::from_secs(6));

        let leftovers = engine.remove_producer(id).unwrap();
        assert_eq!(leftovers.len(), 1);
        assert!(engine.producer(id).is_none());
        assert!(world.store.record(id).is_none());
        assert_eq!(
            engine.remove_producer(id).unwrap_err(),
            EngineError::ProducerNotFound(id)
        );
        assert_eq!(engine.tick(Timestamp::from_secs(60)).examined, 0);
    }

    #[test]
    fn shutdown_then_load_restores_state() {
        let world = MemoryWorld::new();
        world.presence.set_online(OWNER, true);
        let engine = engine_with(&world);
        let id = place(&engine, "cobblestone");
        engine.tick(Timestamp::from_secs(6));
        assert_eq!(engine.shutdown(), 1);
        assert!(engine.is_empty());

        let restarted = engine_with(&world);
        assert_eq!(restarted.load_owner(OWNER), 1);
        assert_eq!(restarted.load_owner(OWNER), 0);
        let producer = restarted.producer(id).unwrap();
        assert_eq!(producer.last_action(), Timestamp::from_secs(6));
        assert_eq!(producer.storage().used(), 1);
        let next = restarted
            .place_producer(OWNER, &ProducerTypeId::new("ice"), Position::default(), Timestamp::ZERO)
            .unwrap();
        assert!(next.id > id);
    }

    #[test]
    fn set_luck_one_always_bonuses() {
        let world = MemoryWorld::new();
        world.presence.set_online(OWNER, true);
        let engine = engine_with(&world);
        let id = place(&engine, "cobblestone");
        engine.set_luck(id, 1.0).unwrap();
        let report = engine.tick(Timestamp::from_secs(6));
        assert_eq!(report.bonus, 1);
        let batches = engine.collect(id, OWNER).unwrap();
        assert_eq!(batches[0].quantity, 2);
        assert!(batches[0].bonus);
    }

    #[test]
    fn interval_shrinks_after_upgrade_without_resetting_phase() {
        let world = MemoryWorld::new();
        world.presence.set_online(OWNER, true);
        world.wallet.credit(OWNER, 50);
        let engine = engine_with(&world);
        let id = place(&engine, "cobblestone");
        let receipt = engine.upgrade(id, OWNER).unwrap();
        assert_eq!(receipt.interval, Duration::from_secs(5));
        assert_eq!(engine.producer(id).unwrap().last_action(), Timestamp::ZERO);
        assert_eq!(engine.tick(Timestamp::from_secs(5)).fired, 1);
    }

    fn brittle_catalog() -> Arc<Catalog> {
        // Valid at tier 1 only: tier 2 acts faster than once per millisecond.
        let brittle = ProducerType::new("glass", "Glass", "glass", 1).with_scaling(TierScaling {
            base_actions_per_minute: 30_000,
            actions_per_minute_step: 30_001,
            base_capacity: 4,
            capacity_step: 0,
        });
        Arc::new(Catalog::new(vec![brittle], 1).unwrap())
    }

    #[test]
    fn construction_rejects_catalog_validated_below_max_tier() {
        let world = MemoryWorld::new();
        let err = ProductionEngine::new(EngineConfig::default(), brittle_catalog(), world.collaborators())
            .unwrap_err();
        assert_eq!(err, EngineError::CatalogTierGap { validated: 1, required: 11 });

        let single_tier = EngineConfig {
            max_tier: 1,
            ..EngineConfig::default()
        };
        let engine =
            ProductionEngine::new(single_tier, brittle_catalog(), world.collaborators()).unwrap();
        world.wallet.credit(OWNER, 1_000);
        let id = engine
            .place_producer(OWNER, &ProducerTypeId::new("glass"), Position::default(), Timestamp::ZERO)
            .unwrap()
            .id;
        assert_eq!(
            engine.upgrade(id, OWNER).unwrap_err(),
            EngineError::MaxTierReached { tier: 1 }
        );
        assert_eq!(world.wallet.balance(OWNER), 1_000);
    }

    #[test]
    fn catalog_swap_keeps_current_table_on_tier_gap() {
        let world = MemoryWorld::new();
        let engine = engine_with(&world);
        assert_eq!(
            engine.replace_catalog(brittle_catalog()).unwrap_err(),
            EngineError::CatalogTierGap { validated: 1, required: 11 }
        );
        assert!(engine.catalog().contains(&ProducerTypeId::new("cobblestone")));
        assert!(!engine.catalog().contains(&ProducerTypeId::new("glass")));
    }

    #[test]
    fn handles_taken_before_removal_see_inactive_producer() {
        let world = MemoryWorld::new();
        world.wallet.credit(OWNER, 50);
        let engine = engine_with(&world);
        let id = place(&engine, "cobblestone");
        let stale = engine.registry.get(id).unwrap();

        engine.remove_producer(id).unwrap();

        let mut producer = lock_producer(&stale);
        assert_eq!(ensure_usable(&producer, OWNER).unwrap_err(), EngineError::Inactive(id));
        assert_eq!(
            upgrade::apply_upgrade(&engine.ctx, &mut producer, OWNER).unwrap_err(),
            EngineError::Inactive(id)
        );
        assert_eq!(producer.tier(), 1);
        assert_eq!(world.wallet.balance(OWNER), 50);
        assert!(world.store.record(id).is_none());
    }
}
