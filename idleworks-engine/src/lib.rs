//! Idleworks Production Engine
//!
//! Platform-agnostic timing core for idle producer units: per-producer
//! cadence while owners are online, capped catch-up for the time they were
//! away, bounded storage, and paid tier upgrades. Everything outside that
//! core (world, economy, storage backends, UI) is reached through the
//! collaborator traits below.

pub mod catalog;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod memory;
pub mod numbers;
pub mod offline;
pub mod producer;
pub mod registry;
pub mod reward;
pub mod rng;
pub mod scheduler;
pub mod storage;
pub mod time;
pub mod upgrade;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogError, ProducerType, ProducerTypeId, ResourceKind, TierScaling};
pub use config::{ConfigError, EngineConfig};
pub use engine::{ProductionEngine, StorageStatus};
pub use error::EngineError;
pub use offline::{ReconciliationReport, Settlement};
pub use producer::{OwnerId, Position, Producer, ProducerId};
pub use reward::{YieldBatch, base_quantity, compute_yield};
pub use rng::{CountingRng, RngBundle};
pub use scheduler::TickReport;
pub use storage::{DepositOutcome, StorageLedger};
pub use time::Timestamp;
pub use upgrade::{UpgradeReceipt, upgrade_cost};

/// Answers whether an owner currently has a live session.
///
/// This is the sole arbitration signal between the online scheduler and
/// offline reconciliation.
pub trait Presence: Send + Sync {
    fn is_owner_online(&self, owner: OwnerId) -> bool;
}

/// Economy ledger used to pay for upgrades.
pub trait Currency: Send + Sync {
    fn has_funds(&self, owner: OwnerId, amount: u64) -> bool;

    /// Deduct `amount`. Returns false when the ledger refuses the charge.
    fn charge(&self, owner: OwnerId, amount: u64) -> bool;
}

/// Fire-and-forget storage for producer records.
///
/// Implementations log their own failures; the engine never retries.
pub trait Persistence: Send + Sync {
    fn save_producer(&self, producer: &Producer);

    fn load_producers_for_owner(&self, owner: OwnerId) -> Vec<Producer>;

    fn delete_producer(&self, id: ProducerId);
}

/// Visual and textual feedback surfaces. Never blocks the engine.
pub trait Presentation: Send + Sync {
    fn show_feedback(&self, position: &Position, effect: EffectKind);

    /// Tell an owner what their producers gathered while they were away.
    fn notify_owner(&self, _owner: OwnerId, _notice: &OwnerNotice) {}
}

/// Destination for yields that did not fit in storage while the owner was online.
pub trait WorldSink: Send + Sync {
    fn deliver_or_drop(&self, owner: OwnerId, position: &Position, batch: YieldBatch);
}

/// Feedback effect emitted at a producer's position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Produced,
    Bonus,
    Overflow,
    TierUp { label: String },
}

/// Summary delivered to an owner when they reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerNotice {
    pub producer: ProducerId,
    pub label: String,
    pub resource: ResourceKind,
    pub quantity: u64,
    pub actions: u64,
}

impl OwnerNotice {
    /// Human-readable line, e.g. "Your Coal Minion I collected 240 coal_ore while you were away!".
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "Your {} collected {} {} while you were away!",
            self.label, self.quantity, self.resource
        )
    }
}

/// Bundle of collaborator handles shared by every engine operation.
#[derive(Clone)]
pub struct Collaborators {
    pub presence: Arc<dyn Presence>,
    pub currency: Arc<dyn Currency>,
    pub persistence: Arc<dyn Persistence>,
    pub presentation: Arc<dyn Presentation>,
    pub sink: Arc<dyn WorldSink>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_message_names_label_and_resource() {
        let notice = OwnerNotice {
            producer: ProducerId(3),
            label: "Coal Minion II".to_string(),
            resource: ResourceKind::new("coal_ore"),
            quantity: 240,
            actions: 120,
        };
        assert_eq!(
            notice.message(),
            "Your Coal Minion II collected 240 coal_ore while you were away!"
        );
    }

    #[test]
    fn effect_kind_serializes_snake_case() {
        let json = serde_json::to_string(&EffectKind::TierUp {
            label: "Ice Minion III".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"tier_up":{"label":"Ice Minion III"}}"#);
        assert_eq!(
            serde_json::to_string(&EffectKind::Overflow).unwrap(),
            r#""overflow""#
        );
    }
}
