//! Per-action yield calculation.
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::{ProducerType, ResourceKind};
use crate::constants::{
    BONUS_MULTIPLIER, MIN_TIER, YIELD_QUARTERS_BASE, YIELD_QUARTERS_PER_TIER,
};
use crate::numbers::clamp_probability;

/// One yielded batch of a resource. Pure value, no identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldBatch {
    pub resource: ResourceKind,
    pub quantity: u64,
    #[serde(default)]
    pub bonus: bool,
}

impl YieldBatch {
    #[must_use]
    pub const fn new(resource: ResourceKind, quantity: u64, bonus: bool) -> Self {
        Self {
            resource,
            quantity,
            bonus,
        }
    }

    /// Scale the batch to cover `actions` consecutive actions. The bonus
    /// flag carries over to the whole batch.
    #[must_use]
    pub fn scaled(mut self, actions: u64) -> Self {
        self.quantity = self.quantity.saturating_mul(actions);
        self
    }
}

/// Deterministic base quantity: `base * (1 + 0.25 * (tier - 1))`, floored.
#[must_use]
pub fn base_quantity(base_amount: u64, tier: u8) -> u64 {
    let extra_tiers = u64::from(tier.max(MIN_TIER) - MIN_TIER);
    let quarters = YIELD_QUARTERS_BASE + YIELD_QUARTERS_PER_TIER * extra_tiers;
    base_amount.saturating_mul(quarters) / YIELD_QUARTERS_BASE
}

/// Compute one action's yield.
///
/// With probability `luck` (clamped to `[0, 1]`) the quantity doubles and
/// the batch is flagged as a bonus. No draw is taken when luck is zero, so a
/// luckless producer leaves the random stream untouched.
pub fn compute_yield<R>(producer_type: &ProducerType, tier: u8, luck: f64, rng: &mut R) -> YieldBatch
where
    R: Rng + ?Sized,
{
    let mut quantity = base_quantity(producer_type.base_amount, tier);
    let chance = clamp_probability(luck);
    let bonus = chance > 0.0 && rng.gen_bool(chance);
    if bonus {
        quantity = quantity.saturating_mul(BONUS_MULTIPLIER);
    }
    YieldBatch::new(producer_type.resource.clone(), quantity, bonus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn iron() -> ProducerType {
        ProducerType::new("iron", "Iron", "iron_ore", 3)
    }

    #[test]
    fn base_quantity_floors_quarter_steps() {
        assert_eq!(base_quantity(1, 1), 1);
        assert_eq!(base_quantity(1, 4), 1);
        assert_eq!(base_quantity(1, 5), 2);
        assert_eq!(base_quantity(3, 2), 3);
        assert_eq!(base_quantity(3, 3), 4);
        assert_eq!(base_quantity(4, 11), 14);
    }

    #[test]
    fn zero_luck_never_bonuses_and_skips_the_draw() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let mut reference = ChaCha20Rng::seed_from_u64(7);
        for _ in 0..50 {
            let batch = compute_yield(&iron(), 1, 0.0, &mut rng);
            assert_eq!(batch.quantity, 3);
            assert!(!batch.bonus);
        }
        assert_eq!(rng.r#gen::<u64>(), reference.r#gen::<u64>());
    }

    #[test]
    fn full_luck_always_doubles() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        for _ in 0..20 {
            let batch = compute_yield(&iron(), 3, 1.7, &mut rng);
            assert_eq!(batch.quantity, 8);
            assert!(batch.bonus);
        }
    }

    #[test]
    fn same_seed_reproduces_rolls() {
        let roll = |seed| {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            (0..32)
                .map(|_| compute_yield(&iron(), 2, 0.5, &mut rng).bonus)
                .collect::<Vec<_>>()
        };
        assert_eq!(roll(99), roll(99));
        assert!(roll(99).iter().any(|b| *b));
        assert!(roll(99).iter().any(|b| !*b));
    }

    #[test]
    fn scaling_keeps_bonus_flag() {
        let batch = YieldBatch::new(ResourceKind::new("coal_ore"), 4, true).scaled(120);
        assert_eq!(batch.quantity, 480);
        assert!(batch.bonus);
    }
}
