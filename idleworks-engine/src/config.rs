//! Engine tuning loaded from JSON with per-field defaults.
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::constants::{
    DEFAULT_BASE_UPGRADE_COST, DEFAULT_MAX_OFFLINE_MINUTES, DEFAULT_MAX_TIER,
    DEFAULT_RECONCILE_PERIOD_MS, DEFAULT_RNG_SEED, DEFAULT_TICK_PERIOD_MS, MIN_TIER,
};

const DEFAULT_ENGINE_CONFIG_DATA: &str = include_str!("../data/engine.json");

/// Errors raised when engine configuration invariants are violated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be at least {min} (got {value})")]
    MinViolation {
        field: &'static str,
        min: u64,
        value: u64,
    },
    #[error("reconcile period {reconcile_ms}ms must not be shorter than tick period {tick_ms}ms")]
    CadenceOrder { tick_ms: u64, reconcile_ms: u64 },
    #[error("engine config JSON is malformed: {0}")]
    Parse(String),
}

/// Runtime configuration for the production engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "EngineConfig::default_tick_period_ms")]
    pub tick_period_ms: u64,
    #[serde(default = "EngineConfig::default_reconcile_period_ms")]
    pub reconcile_period_ms: u64,
    #[serde(default = "EngineConfig::default_max_offline_minutes")]
    pub max_offline_minutes: u64,
    #[serde(default = "EngineConfig::default_base_upgrade_cost")]
    pub base_upgrade_cost: u64,
    #[serde(default = "EngineConfig::default_max_tier")]
    pub max_tier: u8,
    #[serde(default = "EngineConfig::default_rng_seed")]
    pub rng_seed: u64,
}

impl EngineConfig {
    const fn default_tick_period_ms() -> u64 {
        DEFAULT_TICK_PERIOD_MS
    }

    const fn default_reconcile_period_ms() -> u64 {
        DEFAULT_RECONCILE_PERIOD_MS
    }

    const fn default_max_offline_minutes() -> u64 {
        DEFAULT_MAX_OFFLINE_MINUTES
    }

    const fn default_base_upgrade_cost() -> u64 {
        DEFAULT_BASE_UPGRADE_COST
    }

    const fn default_max_tier() -> u8 {
        DEFAULT_MAX_TIER
    }

    const fn default_rng_seed() -> u64 {
        DEFAULT_RNG_SEED
    }

    /// Configuration shipped with the crate.
    #[must_use]
    pub fn load_from_static() -> Self {
        serde_json::from_str(DEFAULT_ENGINE_CONFIG_DATA).unwrap_or_default()
    }

    /// Parse, sanitize, and validate a configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the values are invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut cfg: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        cfg.sanitize();
        cfg.validate()?;
        Ok(cfg)
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Clamp values that have an obvious safe reading.
    pub fn sanitize(&mut self) {
        if self.max_tier < MIN_TIER {
            self.max_tier = MIN_TIER;
        }
        if self.tick_period_ms == 0 {
            self.tick_period_ms = Self::default_tick_period_ms();
        }
        if self.reconcile_period_ms == 0 {
            self.reconcile_period_ms = Self::default_reconcile_period_ms();
        }
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period_ms == 0 {
            return Err(ConfigError::MinViolation {
                field: "tick_period_ms",
                min: 1,
                value: 0,
            });
        }
        if self.reconcile_period_ms < self.tick_period_ms {
            return Err(ConfigError::CadenceOrder {
                tick_ms: self.tick_period_ms,
                reconcile_ms: self.reconcile_period_ms,
            });
        }
        if self.max_tier < MIN_TIER {
            return Err(ConfigError::MinViolation {
                field: "max_tier",
                min: u64::from(MIN_TIER),
                value: u64::from(self.max_tier),
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    #[must_use]
    pub const fn reconcile_period(&self) -> Duration {
        Duration::from_millis(self.reconcile_period_ms)
    }

    /// Offline cap in actions for a producer acting `actions_per_minute`.
    #[must_use]
    pub const fn max_offline_actions(&self, actions_per_minute: u32) -> u64 {
        (actions_per_minute as u64).saturating_mul(self.max_offline_minutes)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: Self::default_tick_period_ms(),
            reconcile_period_ms: Self::default_reconcile_period_ms(),
            max_offline_minutes: Self::default_max_offline_minutes(),
            base_upgrade_cost: Self::default_base_upgrade_cost(),
            max_tier: Self::default_max_tier(),
            rng_seed: Self::default_rng_seed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_config_matches_defaults() {
        assert_eq!(EngineConfig::load_from_static(), EngineConfig::default());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = EngineConfig::from_json(r#"{ "max_offline_minutes": 60 }"#).unwrap();
        assert_eq!(cfg.max_offline_minutes, 60);
        assert_eq!(cfg.base_upgrade_cost, 50);
        assert_eq!(cfg.max_tier, 11);
        assert_eq!(cfg.max_offline_actions(10), 600);
    }

    #[test]
    fn sanitize_repairs_zero_values() {
        let cfg = EngineConfig::from_json(r#"{ "tick_period_ms": 0, "max_tier": 0 }"#).unwrap();
        assert_eq!(cfg.tick_period_ms, 1_000);
        assert_eq!(cfg.max_tier, 1);
    }

    #[test]
    fn rejects_reconcile_faster_than_tick() {
        let err =
            EngineConfig::from_json(r#"{ "tick_period_ms": 5000, "reconcile_period_ms": 1000 }"#)
                .unwrap_err();
        assert_eq!(
            err,
            ConfigError::CadenceOrder {
                tick_ms: 5_000,
                reconcile_ms: 1_000
            }
        );
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            EngineConfig::from_json("[]"),
            Err(ConfigError::Parse(_))
        ));
    }
}
