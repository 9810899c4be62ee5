use thiserror::Error;

use crate::catalog::ProducerTypeId;
use crate::producer::{OwnerId, ProducerId};

/// Failures surfaced by owner-driven engine operations.
///
/// Storage overflow is deliberately absent: it is reported through
/// `DepositOutcome` and handled by the overflow policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("owner {owner} cannot afford {required} for this upgrade")]
    InsufficientFunds { owner: OwnerId, required: u64 },
    #[error("producer is already at the maximum tier {tier}")]
    MaxTierReached { tier: u8 },
    #[error("producer {0} does not exist")]
    ProducerNotFound(ProducerId),
    #[error("owner {owner} does not own producer {producer}")]
    OwnerMismatch { producer: ProducerId, owner: OwnerId },
    #[error("producer type `{0}` is not in the catalog")]
    UnknownProducerType(ProducerTypeId),
    #[error("currency refused a charge of {amount}")]
    ChargeRejected { amount: u64 },
    #[error("producer {0} is being removed")]
    Inactive(ProducerId),
    #[error("catalog is only validated up to tier {validated}, but producers may reach tier {required}")]
    CatalogTierGap { validated: u8, required: u8 },
}
