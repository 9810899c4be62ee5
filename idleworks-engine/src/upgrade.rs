//! Paid tier promotion.
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::EffectKind;
use crate::engine::EngineContext;
use crate::error::EngineError;
use crate::producer::{OwnerId, Producer};

/// Cost to go from `tier` to `tier + 1`: `base_cost * 2^(tier-1)`, saturating.
#[must_use]
pub fn upgrade_cost(base_cost: u64, tier: u8) -> u64 {
    let doublings = u32::from(tier.saturating_sub(1));
    let factor = 1_u64.checked_shl(doublings).unwrap_or(u64::MAX);
    base_cost.saturating_mul(factor)
}

/// Result of a successful upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeReceipt {
    pub from_tier: u8,
    pub to_tier: u8,
    pub cost: u64,
    #[serde(with = "millis")]
    pub interval: Duration,
    pub capacity: usize,
    pub label: String,
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Charge `payer` and raise the producer one tier.
///
/// The charge happens before any state change; a refused charge leaves the
/// producer untouched. The phase is kept, so the next action fires one new
/// interval after the last one.
pub(crate) fn apply_upgrade(
    ctx: &EngineContext,
    producer: &mut Producer,
    payer: OwnerId,
) -> Result<UpgradeReceipt, EngineError> {
    if !producer.is_active() {
        return Err(EngineError::Inactive(producer.id));
    }
    if producer.owner != payer {
        return Err(EngineError::OwnerMismatch {
            producer: producer.id,
            owner: payer,
        });
    }
    let from_tier = producer.tier();
    if from_tier >= ctx.config.max_tier {
        return Err(EngineError::MaxTierReached { tier: from_tier });
    }
    let catalog = ctx.catalog();
    let producer_type = catalog
        .get(&producer.type_id)
        .ok_or_else(|| EngineError::UnknownProducerType(producer.type_id.clone()))?;

    let cost = upgrade_cost(ctx.config.base_upgrade_cost, from_tier);
    if !ctx.services.currency.has_funds(payer, cost) {
        debug!("{payer} short of {cost} for {}", producer.id);
        return Err(EngineError::InsufficientFunds {
            owner: payer,
            required: cost,
        });
    }
    if !ctx.services.currency.charge(payer, cost) {
        return Err(EngineError::ChargeRejected { amount: cost });
    }

    producer.promote(producer_type);
    let to_tier = producer.tier();
    let label = producer.display_label(producer_type);
    info!("{} upgraded to tier {to_tier} for {cost}", producer.id);

    ctx.services.persistence.save_producer(producer);
    ctx.services.presentation.show_feedback(
        &producer.position,
        EffectKind::TierUp {
            label: label.clone(),
        },
    );
    Ok(UpgradeReceipt {
        from_tier,
        to_tier,
        cost,
        interval: producer_type.scaling.interval(to_tier),
        capacity: producer.storage().capacity(),
        label,
    })
}
