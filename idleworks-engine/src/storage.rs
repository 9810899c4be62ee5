//! Bounded per-producer output buffer.
use serde::{Deserialize, Serialize};

use crate::numbers::fill_ratio;
use crate::reward::YieldBatch;

/// Result of a deposit attempt. An overflow hands the batch back so the
/// caller can apply its overflow policy.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum DepositOutcome {
    Accepted,
    Overflowed(YieldBatch),
}

impl DepositOutcome {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Ordered batches with a hard capacity, counted in batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLedger {
    capacity: usize,
    #[serde(default)]
    batches: Vec<YieldBatch>,
}

impl StorageLedger {
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            batches: Vec::new(),
        }
    }

    /// Append `batch` if there is room.
    pub fn deposit(&mut self, batch: YieldBatch) -> DepositOutcome {
        if self.batches.len() >= self.capacity {
            return DepositOutcome::Overflowed(batch);
        }
        self.batches.push(batch);
        DepositOutcome::Accepted
    }

    /// Empty the buffer, returning batches in insertion order.
    pub fn drain(&mut self) -> Vec<YieldBatch> {
        std::mem::take(&mut self.batches)
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn used(&self) -> usize {
        self.batches.len()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.batches.len() >= self.capacity
    }

    #[must_use]
    pub fn fill_ratio(&self) -> f64 {
        fill_ratio(self.used(), self.capacity)
    }

    /// Read-only view of stored batches.
    #[must_use]
    pub fn batches(&self) -> &[YieldBatch] {
        &self.batches
    }

    /// Raise capacity; never shrinks so stored batches are never lost.
    pub fn grow_to(&mut self, capacity: usize) {
        self.capacity = self.capacity.max(capacity);
    }
}
