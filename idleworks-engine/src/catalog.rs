//! Static table of producer types.
//!
//! The catalog is immutable after load. Every tier table is validated up
//! front so the scheduler can divide by actions-per-minute without checks.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{
    DEFAULT_ACTIONS_PER_MINUTE_STEP, DEFAULT_BASE_ACTIONS_PER_MINUTE, DEFAULT_BASE_CAPACITY,
    DEFAULT_CAPACITY_STEP, DEFAULT_MAX_TIER, MILLIS_PER_MINUTE, MIN_TIER,
};

const DEFAULT_CATALOG_DATA: &str = include_str!("../data/catalog.json");

/// Identifier of a catalog entry, e.g. `"cobblestone"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProducerTypeId(pub String);

impl ProducerTypeId {
    #[must_use]
    pub fn new(value: &str) -> Self {
        Self(value.trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProducerTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of resource a producer yields, e.g. `"coal_ore"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(pub String);

impl ResourceKind {
    #[must_use]
    pub fn new(value: &str) -> Self {
        Self(value.trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tier-scaling rules for cadence and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierScaling {
    #[serde(default = "TierScaling::default_base_actions_per_minute")]
    pub base_actions_per_minute: u32,
    #[serde(default = "TierScaling::default_actions_per_minute_step")]
    pub actions_per_minute_step: u32,
    #[serde(default = "TierScaling::default_base_capacity")]
    pub base_capacity: u32,
    #[serde(default = "TierScaling::default_capacity_step")]
    pub capacity_step: u32,
}

impl TierScaling {
    const fn default_base_actions_per_minute() -> u32 {
        DEFAULT_BASE_ACTIONS_PER_MINUTE
    }

    const fn default_actions_per_minute_step() -> u32 {
        DEFAULT_ACTIONS_PER_MINUTE_STEP
    }

    const fn default_base_capacity() -> u32 {
        DEFAULT_BASE_CAPACITY
    }

    const fn default_capacity_step() -> u32 {
        DEFAULT_CAPACITY_STEP
    }

    /// Flat cadence with no growth, handy for fixtures.
    #[must_use]
    pub const fn fixed(actions_per_minute: u32, capacity: u32) -> Self {
        Self {
            base_actions_per_minute: actions_per_minute,
            actions_per_minute_step: 0,
            base_capacity: capacity,
            capacity_step: 0,
        }
    }

    /// Actions per minute at `tier` (tiers below 1 read as tier 1).
    #[must_use]
    pub fn actions_per_minute(&self, tier: u8) -> u32 {
        let steps = u32::from(tier.max(MIN_TIER) - MIN_TIER);
        self.base_actions_per_minute
            .saturating_add(self.actions_per_minute_step.saturating_mul(steps))
    }

    /// Time between two actions at `tier`. Zero only for unvalidated tables.
    #[must_use]
    pub fn interval(&self, tier: u8) -> Duration {
        let apm = u64::from(self.actions_per_minute(tier));
        if apm == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(MILLIS_PER_MINUTE / apm)
    }

    /// Storage capacity in batches at `tier`.
    #[must_use]
    pub fn capacity(&self, tier: u8) -> usize {
        let steps = u32::from(tier.max(MIN_TIER) - MIN_TIER);
        let slots = self
            .base_capacity
            .saturating_add(self.capacity_step.saturating_mul(steps));
        usize::try_from(slots).unwrap_or(usize::MAX)
    }
}

impl Default for TierScaling {
    fn default() -> Self {
        Self {
            base_actions_per_minute: Self::default_base_actions_per_minute(),
            actions_per_minute_step: Self::default_actions_per_minute_step(),
            base_capacity: Self::default_base_capacity(),
            capacity_step: Self::default_capacity_step(),
        }
    }
}

/// Immutable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerType {
    pub id: ProducerTypeId,
    pub display_name: String,
    pub resource: ResourceKind,
    pub base_amount: u64,
    #[serde(default)]
    pub scaling: TierScaling,
}

impl ProducerType {
    #[must_use]
    pub fn new(id: &str, display_name: &str, resource: &str, base_amount: u64) -> Self {
        Self {
            id: ProducerTypeId::new(id),
            display_name: display_name.to_string(),
            resource: ResourceKind::new(resource),
            base_amount,
            scaling: TierScaling::default(),
        }
    }

    #[must_use]
    pub const fn with_scaling(mut self, scaling: TierScaling) -> Self {
        self.scaling = scaling;
        self
    }
}

/// Errors raised when a catalog violates load-time invariants.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog JSON is malformed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("producer type `{0}` is defined more than once")]
    DuplicateType(ProducerTypeId),
    #[error("producer type `{0}` has an empty id or display name")]
    MissingName(ProducerTypeId),
    #[error("producer type `{0}` yields nothing (base_amount is 0)")]
    ZeroYield(ProducerTypeId),
    #[error("producer type `{id}` has no actions per minute at tier {tier}")]
    ZeroCadence { id: ProducerTypeId, tier: u8 },
    #[error("producer type `{id}` acts faster than once per millisecond at tier {tier}")]
    CadenceTooFast { id: ProducerTypeId, tier: u8 },
    #[error("producer type `{id}` has no storage capacity at tier {tier}")]
    ZeroCapacity { id: ProducerTypeId, tier: u8 },
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    producers: Vec<ProducerType>,
}

/// Validated producer type table.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    types: HashMap<ProducerTypeId, ProducerType>,
    order: Vec<ProducerTypeId>,
    max_tier: u8,
}

impl Catalog {
    /// Build a catalog, validating every tier in `[1, max_tier]`.
    ///
    /// # Errors
    ///
    /// Returns an error if ids collide, a type yields nothing, or any tier
    /// has zero cadence or zero capacity.
    pub fn new(entries: Vec<ProducerType>, max_tier: u8) -> Result<Self, CatalogError> {
        let mut catalog = Self {
            max_tier: max_tier.max(MIN_TIER),
            ..Self::default()
        };
        for entry in entries {
            validate_entry(&entry, max_tier)?;
            if catalog.types.contains_key(&entry.id) {
                return Err(CatalogError::DuplicateType(entry.id));
            }
            catalog.order.push(entry.id.clone());
            catalog.types.insert(entry.id.clone(), entry);
        }
        Ok(catalog)
    }

    /// Parse and validate a catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed or fails validation.
    pub fn from_json(json: &str, max_tier: u8) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.producers, max_tier)
    }

    /// The stock catalog shipped with the crate, parsed once.
    #[must_use]
    pub fn bundled() -> &'static Self {
        static CATALOG: OnceLock<Catalog> = OnceLock::new();
        CATALOG.get_or_init(|| {
            Self::from_json(DEFAULT_CATALOG_DATA, DEFAULT_MAX_TIER).unwrap_or_else(|err| {
                log::error!("bundled catalog rejected: {err}");
                Self {
                    max_tier: DEFAULT_MAX_TIER,
                    ..Self::default()
                }
            })
        })
    }

    /// Highest tier every entry was validated for.
    #[must_use]
    pub const fn max_tier(&self) -> u8 {
        self.max_tier
    }

    /// The same entries validated up to `max_tier` instead.
    ///
    /// # Errors
    ///
    /// Returns an error if some entry breaks down at a tier in `[1, max_tier]`.
    pub fn revalidate(&self, max_tier: u8) -> Result<Self, CatalogError> {
        Self::new(self.iter().cloned().collect(), max_tier)
    }

    #[must_use]
    pub fn get(&self, id: &ProducerTypeId) -> Option<&ProducerType> {
        self.types.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &ProducerTypeId) -> bool {
        self.types.contains_key(id)
    }

    /// Entries in load order.
    pub fn iter(&self) -> impl Iterator<Item = &ProducerType> {
        self.order.iter().filter_map(|id| self.types.get(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn validate_entry(entry: &ProducerType, max_tier: u8) -> Result<(), CatalogError> {
    if entry.id.as_str().is_empty() || entry.display_name.trim().is_empty() {
        return Err(CatalogError::MissingName(entry.id.clone()));
    }
    if entry.base_amount == 0 {
        return Err(CatalogError::ZeroYield(entry.id.clone()));
    }
    for tier in MIN_TIER..=max_tier.max(MIN_TIER) {
        if entry.scaling.actions_per_minute(tier) == 0 {
            return Err(CatalogError::ZeroCadence {
                id: entry.id.clone(),
                tier,
            });
        }
        if entry.scaling.interval(tier).is_zero() {
            return Err(CatalogError::CadenceTooFast {
                id: entry.id.clone(),
                tier,
            });
        }
        if entry.scaling.capacity(tier) == 0 {
            return Err(CatalogError::ZeroCapacity {
                id: entry.id.clone(),
                tier,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_catalog_carries_stock_types() {
        let catalog = Catalog::bundled();
        assert_eq!(catalog.len(), 35);
        let coal = catalog.get(&ProducerTypeId::new("coal")).unwrap();
        assert_eq!(coal.base_amount, 2);
        assert_eq!(coal.resource.as_str(), "coal_ore");
        assert_eq!(
            catalog.iter().next().map(|t| t.id.as_str()),
            Some("cobblestone")
        );
    }

    #[test]
    fn default_scaling_matches_stock_curve() {
        let scaling = TierScaling::default();
        assert_eq!(scaling.actions_per_minute(1), 10);
        assert_eq!(scaling.actions_per_minute(11), 30);
        assert_eq!(scaling.interval(1), Duration::from_secs(6));
        assert_eq!(scaling.interval(11), Duration::from_secs(2));
        assert_eq!(scaling.capacity(1), 9);
        assert_eq!(scaling.capacity(4), 18);
    }

    #[test]
    fn rejects_zero_cadence_table() {
        let broken = ProducerType::new("stall", "Stall", "dust", 1)
            .with_scaling(TierScaling::fixed(0, 4));
        let err = Catalog::new(vec![broken], 3).unwrap_err();
        assert!(matches!(err, CatalogError::ZeroCadence { tier: 1, .. }));
    }

    #[test]
    fn rejects_duplicates_and_zero_yield() {
        let a = ProducerType::new("sand", "Sand", "sand", 1);
        let b = ProducerType::new("SAND", "Sand Again", "sand", 1);
        assert!(matches!(
            Catalog::new(vec![a, b], 2),
            Err(CatalogError::DuplicateType(_))
        ));
        let empty = ProducerType::new("void", "Void", "nothing", 0);
        assert!(matches!(
            Catalog::new(vec![empty], 2),
            Err(CatalogError::ZeroYield(_))
        ));
    }

    #[test]
    fn from_json_fills_scaling_defaults() {
        let json = r#"{
            "producers": [
                { "id": "ice", "display_name": "Ice", "resource": "ice", "base_amount": 2,
                  "scaling": { "base_actions_per_minute": 60 } }
            ]
        }"#;
        let catalog = Catalog::from_json(json, 11).unwrap();
        let ice = catalog.get(&ProducerTypeId::new("ice")).unwrap();
        assert_eq!(ice.scaling.base_actions_per_minute, 60);
        assert_eq!(ice.scaling.actions_per_minute_step, 2);
        assert_eq!(ice.scaling.interval(1), Duration::from_secs(1));
    }

    #[test]
    fn remembers_validated_tier_and_revalidates_higher() {
        let brittle = ProducerType::new("glass", "Glass", "glass", 1).with_scaling(TierScaling {
            base_actions_per_minute: 30_000,
            actions_per_minute_step: 30_001,
            base_capacity: 4,
            capacity_step: 0,
        });
        let catalog = Catalog::new(vec![brittle], 1).unwrap();
        assert_eq!(catalog.max_tier(), 1);
        assert!(matches!(
            catalog.revalidate(2),
            Err(CatalogError::CadenceTooFast { tier: 2, .. })
        ));

        let stock = Catalog::bundled().revalidate(20).unwrap();
        assert_eq!(stock.max_tier(), 20);
        assert_eq!(stock.len(), Catalog::bundled().len());
        assert_eq!(Catalog::bundled().max_tier(), 11);
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            Catalog::from_json("{ nope", 11),
            Err(CatalogError::Parse(_))
        ));
    }
}
