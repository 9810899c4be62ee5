//! Online production: fire at most one due action per producer per tick.
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::EffectKind;
use crate::catalog::Catalog;
use crate::engine::EngineContext;
use crate::registry::{SharedProducer, lock_producer};
use crate::reward::compute_yield;
use crate::storage::DepositOutcome;
use crate::time::Timestamp;

/// Tally of one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub examined: usize,
    pub fired: usize,
    pub bonus: usize,
    pub overflowed: usize,
    pub skipped_offline: usize,
    pub skipped_inactive: usize,
    pub faults: usize,
}

impl TickReport {
    pub fn absorb(&mut self, other: &Self) {
        self.examined += other.examined;
        self.fired += other.fired;
        self.bonus += other.bonus;
        self.overflowed += other.overflowed;
        self.skipped_offline += other.skipped_offline;
        self.skipped_inactive += other.skipped_inactive;
        self.faults += other.faults;
    }
}

/// Run one pass over `producers`.
pub(crate) fn run_tick(ctx: &EngineContext, producers: &[SharedProducer], now: Timestamp) -> TickReport {
    let catalog = ctx.catalog();
    let mut report = TickReport::default();
    for shared in producers {
        report.examined += 1;
        tick_producer(ctx, &catalog, shared, now, &mut report);
    }
    report
}

/// Fire one action if the producer is due. Presence is read under the
/// producer lock so reconciliation cannot settle the same interval.
fn tick_producer(
    ctx: &EngineContext,
    catalog: &Catalog,
    shared: &SharedProducer,
    now: Timestamp,
    report: &mut TickReport,
) {
    let mut producer = lock_producer(shared);
    if !producer.is_active() {
        report.skipped_inactive += 1;
        return;
    }
    if !ctx.services.presence.is_owner_online(producer.owner) {
        report.skipped_offline += 1;
        return;
    }
    let Some(producer_type) = catalog.get(&producer.type_id) else {
        warn!(
            "{} references unknown type `{}`; skipping",
            producer.id, producer.type_id
        );
        report.faults += 1;
        return;
    };
    let interval = producer_type.scaling.interval(producer.tier());
    if interval.is_zero() {
        warn!("{} has no cadence at tier {}", producer.id, producer.tier());
        report.faults += 1;
        return;
    }
    if now.saturating_since(producer.last_action()) < interval {
        return;
    }

    let batch = {
        let mut rng = ctx.rng.tick();
        compute_yield(producer_type, producer.tier(), producer.luck(), &mut *rng)
    };
    producer.advance_phase(interval);
    report.fired += 1;

    let mut effect = EffectKind::Produced;
    if batch.bonus {
        report.bonus += 1;
        effect = EffectKind::Bonus;
    }
    debug!(
        "{} produced {} {} (bonus: {})",
        producer.id, batch.quantity, batch.resource, batch.bonus
    );

    if let DepositOutcome::Overflowed(batch) = producer.storage_mut().deposit(batch) {
        report.overflowed += 1;
        effect = EffectKind::Overflow;
        debug!("{} storage full; handing batch to the world", producer.id);
        ctx.services
            .sink
            .deliver_or_drop(producer.owner, &producer.position, batch);
    }
    ctx.services.presentation.show_feedback(&producer.position, effect);
    ctx.services.persistence.save_producer(&producer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_sums_every_counter() {
        let mut total = TickReport {
            examined: 2,
            fired: 1,
            ..TickReport::default()
        };
        total.absorb(&TickReport {
            examined: 3,
            fired: 2,
            bonus: 1,
            overflowed: 1,
            skipped_offline: 1,
            skipped_inactive: 0,
            faults: 1,
        });
        assert_eq!(total.examined, 5);
        assert_eq!(total.fired, 3);
        assert_eq!(total.bonus, 1);
        assert_eq!(total.faults, 1);
    }
}
