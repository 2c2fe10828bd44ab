use crate::oracle::OracleError;
use alloy_primitives::{Address, U256};

/// Errors surfaced by slot discovery and balance overwrites.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    /// Every candidate in `0..max_slot` was probed without a match.
    #[error("no balance mapping slot found for {contract} in 0..{max_slot}")]
    SlotNotFound { contract: Address, max_slot: u64 },

    /// Rolling back a probe failed; node state can no longer be trusted.
    #[error("failed to roll back probe of slot {slot}: {source}")]
    Isolation {
        slot: u64,
        #[source]
        source: OracleError,
    },

    /// The probed owner already holds the marker value, so a hit could not
    /// be told apart from the existing balance.
    #[error("balance of {owner} already equals the probe marker {marker}")]
    MarkerCollision { owner: Address, marker: U256 },

    /// The balance read back after the final write is not the one written.
    #[error("balance of {owner} is {observed} after writing {expected}")]
    VerificationFailed {
        owner: Address,
        expected: U256,
        observed: U256,
    },

    /// Node or call failure outside the per-candidate probes.
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

impl SlotError {
    /// True when the search ran to completion and simply found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SlotError::SlotNotFound { .. })
    }
}
