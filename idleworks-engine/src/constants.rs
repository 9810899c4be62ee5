//! Centralized balance and timing constants for the production engine.
//!
//! These values define the deterministic math for producers. Data files may
//! override the configurable subset through `EngineConfig` and the catalog,
//! but the defaults live here so they are reviewed in version control.

// Cadence ------------------------------------------------------------------
/// Fast cadence at which a driving clock should call `tick`.
pub const DEFAULT_TICK_PERIOD_MS: u64 = 1_000;
/// Slow cadence at which a driving clock should call `run_reconciliation`.
pub const DEFAULT_RECONCILE_PERIOD_MS: u64 = 300_000;
pub const MILLIS_PER_MINUTE: u64 = 60_000;

// Offline catch-up ---------------------------------------------------------
/// Twelve hours of production.
pub const DEFAULT_MAX_OFFLINE_MINUTES: u64 = 720;

// Tiers and upgrades -------------------------------------------------------
pub const MIN_TIER: u8 = 1;
pub const DEFAULT_MAX_TIER: u8 = 11;
pub const DEFAULT_BASE_UPGRADE_COST: u64 = 50;

// Yield scaling ------------------------------------------------------------
/// Each tier above the first adds a quarter of the base amount. Expressed as
/// quarters so the floor is exact integer arithmetic.
pub(crate) const YIELD_QUARTERS_PER_TIER: u64 = 1;
pub(crate) const YIELD_QUARTERS_BASE: u64 = 4;
pub(crate) const BONUS_MULTIPLIER: u64 = 2;

// Tier scaling defaults ----------------------------------------------------
pub const DEFAULT_BASE_ACTIONS_PER_MINUTE: u32 = 10;
pub const DEFAULT_ACTIONS_PER_MINUTE_STEP: u32 = 2;
pub const DEFAULT_BASE_CAPACITY: u32 = 9;
pub const DEFAULT_CAPACITY_STEP: u32 = 3;

// Randomness ---------------------------------------------------------------
pub const DEFAULT_RNG_SEED: u64 = 1337;
pub(crate) const RNG_STREAM_TICK: &[u8] = b"tick";
pub(crate) const RNG_STREAM_OFFLINE: &[u8] = b"offline";

// Presentation -------------------------------------------------------------
pub(crate) const PRODUCER_LABEL_SUFFIX: &str = "Minion";
pub(crate) const ROMAN_TIERS: [&str; 12] = [
    "", "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI",
];
