//! Offline catch-up: settle the intervals an absent owner missed in one batch.
//!
//! Both the periodic reconciliation pass and the login hand-off use
//! [`settle`]; they differ only in who is eligible and where overflow goes.
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::catalog::{ProducerType, ResourceKind};
use crate::engine::EngineContext;
use crate::producer::{OwnerId, Producer, ProducerId};
use crate::registry::{SharedProducer, lock_producer};
use crate::reward::compute_yield;
use crate::storage::DepositOutcome;
use crate::time::{Timestamp, interval_span, whole_intervals};
use crate::{EffectKind, OwnerNotice};

/// What one producer was credited for time it was not ticked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub producer: ProducerId,
    pub owner: OwnerId,
    pub resource: ResourceKind,
    pub actions: u64,
    pub quantity: u64,
    pub bonus: bool,
    pub capped: bool,
    pub overflowed: bool,
    /// Whole intervals dropped past the offline cap at login.
    #[serde(default)]
    pub forfeited: u64,
}

/// Tally of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub examined: usize,
    pub settled: usize,
    pub actions_granted: u64,
    pub capped: usize,
    pub overflowed: usize,
    pub skipped_online: usize,
    pub skipped_inactive: usize,
    pub faults: usize,
}

impl ReconciliationReport {
    pub fn absorb(&mut self, other: &Self) {
        self.examined += other.examined;
        self.settled += other.settled;
        self.actions_granted = self.actions_granted.saturating_add(other.actions_granted);
        self.capped += other.capped;
        self.overflowed += other.overflowed;
        self.skipped_online += other.skipped_online;
        self.skipped_inactive += other.skipped_inactive;
        self.faults += other.faults;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OverflowPolicy {
    /// Owner is away: a batch that does not fit is lost.
    Discard,
    /// Owner is present: hand the batch to the world sink.
    Deliver,
}

/// Credit the whole intervals elapsed since the last action, capped at the
/// configured offline window. One roll covers the entire batch.
///
/// Returns `None` when nothing is owed. The caller persists the record.
pub(crate) fn settle(
    ctx: &EngineContext,
    producer: &mut Producer,
    producer_type: &ProducerType,
    now: Timestamp,
    policy: OverflowPolicy,
) -> Option<Settlement> {
    let tier = producer.tier();
    let interval = producer_type.scaling.interval(tier);
    let missed = whole_intervals(now.saturating_since(producer.last_action()), interval);
    if missed == 0 {
        return None;
    }
    let cap = ctx
        .config
        .max_offline_actions(producer_type.scaling.actions_per_minute(tier));
    let actions = missed.min(cap);
    if actions == 0 {
        return None;
    }

    let batch = {
        let mut rng = ctx.rng.offline();
        compute_yield(producer_type, tier, producer.luck(), &mut *rng).scaled(actions)
    };
    producer.advance_phase(interval_span(interval, actions));

    let mut settlement = Settlement {
        producer: producer.id,
        owner: producer.owner,
        resource: batch.resource.clone(),
        actions,
        quantity: batch.quantity,
        bonus: batch.bonus,
        capped: missed > cap,
        overflowed: false,
        forfeited: 0,
    };
    if let DepositOutcome::Overflowed(batch) = producer.storage_mut().deposit(batch) {
        settlement.overflowed = true;
        match policy {
            OverflowPolicy::Discard => {
                debug!(
                    "{} storage full; discarding {} {} earned offline",
                    producer.id, batch.quantity, batch.resource
                );
            }
            OverflowPolicy::Deliver => {
                ctx.services
                    .sink
                    .deliver_or_drop(producer.owner, &producer.position, batch);
            }
        }
    }
    Some(settlement)
}

/// Periodic pass over producers whose owners are offline.
pub(crate) fn run_reconciliation(
    ctx: &EngineContext,
    producers: &[SharedProducer],
    now: Timestamp,
) -> ReconciliationReport {
    let catalog = ctx.catalog();
    let mut report = ReconciliationReport::default();
    for shared in producers {
        report.examined += 1;
        let mut producer = lock_producer(shared);
        if !producer.is_active() {
            report.skipped_inactive += 1;
            continue;
        }
        if ctx.services.presence.is_owner_online(producer.owner) {
            report.skipped_online += 1;
            continue;
        }
        let Some(producer_type) = catalog.get(&producer.type_id) else {
            warn!(
                "{} references unknown type `{}`; skipping reconciliation",
                producer.id, producer.type_id
            );
            report.faults += 1;
            continue;
        };
        let Some(settlement) = settle(ctx, &mut producer, producer_type, now, OverflowPolicy::Discard)
        else {
            continue;
        };
        report.settled += 1;
        report.actions_granted = report.actions_granted.saturating_add(settlement.actions);
        if settlement.capped {
            report.capped += 1;
        }
        if settlement.overflowed {
            report.overflowed += 1;
        }
        ctx.services.persistence.save_producer(&producer);
    }
    if report.settled > 0 {
        info!(
            "reconciled {} producers ({} actions, {} capped)",
            report.settled, report.actions_granted, report.capped
        );
    }
    report
}

/// Login hand-off: settle what the owner missed, drop any backlog beyond the
/// cap so the scheduler resumes on phase, and tell the owner what was earned.
pub(crate) fn settle_on_connect(
    ctx: &EngineContext,
    owner: OwnerId,
    producers: &[SharedProducer],
    now: Timestamp,
) -> Vec<Settlement> {
    let catalog = ctx.catalog();
    let mut settlements = Vec::new();
    for shared in producers {
        let mut producer = lock_producer(shared);
        if !producer.is_active() || producer.owner != owner {
            continue;
        }
        let Some(producer_type) = catalog.get(&producer.type_id) else {
            warn!(
                "{} references unknown type `{}`; skipping login settlement",
                producer.id, producer.type_id
            );
            continue;
        };
        let settled = settle(ctx, &mut producer, producer_type, now, OverflowPolicy::Deliver);
        let forfeited = forfeit_backlog(&mut producer, producer_type, now);
        if settled.is_none() && forfeited == 0 {
            continue;
        }
        ctx.services.persistence.save_producer(&producer);

        let Some(mut settlement) = settled else {
            debug!("{} forfeited {forfeited} intervals at login", producer.id);
            continue;
        };
        settlement.forfeited = forfeited;
        let notice = OwnerNotice {
            producer: producer.id,
            label: producer.display_label(producer_type),
            resource: settlement.resource.clone(),
            quantity: settlement.quantity,
            actions: settlement.actions,
        };
        let effect = if settlement.bonus {
            EffectKind::Bonus
        } else {
            EffectKind::Produced
        };
        ctx.services
            .presentation
            .show_feedback(&producer.position, effect);
        ctx.services.presentation.notify_owner(owner, &notice);
        settlements.push(settlement);
    }
    settlements
}

/// Re-anchor the phase so less than one interval is outstanding, keeping the
/// sub-interval remainder. Returns the number of whole intervals dropped.
fn forfeit_backlog(producer: &mut Producer, producer_type: &ProducerType, now: Timestamp) -> u64 {
    let interval = producer_type.scaling.interval(producer.tier());
    let elapsed = now.saturating_since(producer.last_action());
    let backlog = whole_intervals(elapsed, interval);
    if backlog == 0 {
        return 0;
    }
    let remainder = elapsed.saturating_sub(interval_span(interval, backlog));
    producer.rephase_to(now.saturating_sub(remainder));
    backlog
}
