//! Placed producer units and their identifiers.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::catalog::{ProducerType, ProducerTypeId};
use crate::constants::{MIN_TIER, PRODUCER_LABEL_SUFFIX, ROMAN_TIERS};
use crate::numbers::clamp_probability;
use crate::storage::StorageLedger;
use crate::time::Timestamp;

/// Engine-assigned producer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProducerId(pub u64);

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "producer#{}", self.0)
    }
}

/// Owning player identifier, issued by the host game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// World placement. Opaque to the engine; only handed back to collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    #[must_use]
    pub fn new(world: &str, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.to_string(),
            x,
            y,
            z,
        }
    }
}

/// One placed unit. Also the persisted record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub id: ProducerId,
    pub owner: OwnerId,
    pub type_id: ProducerTypeId,
    pub position: Position,
    tier: u8,
    last_action: Timestamp,
    #[serde(default = "default_active")]
    active: bool,
    storage: StorageLedger,
    #[serde(default)]
    luck: f64,
}

const fn default_active() -> bool {
    true
}

impl Producer {
    /// Fresh tier-1 producer with empty storage whose phase starts at `now`.
    #[must_use]
    pub fn new(
        id: ProducerId,
        owner: OwnerId,
        producer_type: &ProducerType,
        position: Position,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            owner,
            type_id: producer_type.id.clone(),
            position,
            tier: MIN_TIER,
            last_action: now,
            active: true,
            storage: StorageLedger::with_capacity(producer_type.scaling.capacity(MIN_TIER)),
            luck: 0.0,
        }
    }

    #[must_use]
    pub const fn tier(&self) -> u8 {
        self.tier
    }

    #[must_use]
    pub const fn last_action(&self) -> Timestamp {
        self.last_action
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Bonus chance in `[0, 1]`.
    #[must_use]
    pub const fn luck(&self) -> f64 {
        self.luck
    }

    pub fn set_luck(&mut self, luck: f64) {
        self.luck = clamp_probability(luck);
    }

    #[must_use]
    pub const fn storage(&self) -> &StorageLedger {
        &self.storage
    }

    pub(crate) const fn storage_mut(&mut self) -> &mut StorageLedger {
        &mut self.storage
    }

    /// Move the action phase forward. The phase never moves backward.
    pub(crate) fn advance_phase(&mut self, by: Duration) {
        self.last_action = self.last_action.saturating_add(by);
    }

    /// Re-anchor the phase at `at` if that is later than the current one.
    pub(crate) fn rephase_to(&mut self, at: Timestamp) {
        self.last_action = self.last_action.max(at);
    }

    /// Raise the tier by exactly one and grow storage to match.
    pub(crate) fn promote(&mut self, producer_type: &ProducerType) {
        self.tier = self.tier.saturating_add(1);
        self.storage
            .grow_to(producer_type.scaling.capacity(self.tier));
    }

    pub(crate) const fn deactivate(&mut self) {
        self.active = false;
    }

    /// Bring a record loaded from persistence back within engine invariants.
    pub(crate) fn normalize(&mut self, producer_type: &ProducerType, max_tier: u8) {
        self.tier = self.tier.clamp(MIN_TIER, max_tier.max(MIN_TIER));
        self.luck = clamp_probability(self.luck);
        self.storage
            .grow_to(producer_type.scaling.capacity(self.tier));
    }

    /// Name shown above the unit, e.g. `"Coal Minion IV"`.
    #[must_use]
    pub fn display_label(&self, producer_type: &ProducerType) -> String {
        let numeral = ROMAN_TIERS
            .get(usize::from(self.tier))
            .copied()
            .unwrap_or_else(|| ROMAN_TIERS[ROMAN_TIERS.len() - 1]);
        format!(
            "{} {PRODUCER_LABEL_SUFFIX} {numeral}",
            producer_type.display_name
        )
    }
}
