//! Balance and owner overwrites on a test node.

use crate::error::SlotError;
use crate::finder::SlotFinder;
use crate::oracle::{OracleError, StorageOracle};
use crate::slots::{address_word, mapping_storage_key, storage_word};
use alloy_primitives::{Address, B256, U256};
use tracing::{info, warn};

/// Sets an ERC20 balance by locating the balances mapping first, then
/// writing the holder's entry directly.
pub struct BalanceSetter<'a, O> {
    finder: SlotFinder<'a, O>,
}

impl<'a, O: StorageOracle> BalanceSetter<'a, O> {
    pub fn new(oracle: &'a O) -> Self {
        Self {
            finder: SlotFinder::new(oracle),
        }
    }

    /// Use a pre-configured finder (bound, marker).
    pub fn with_finder(finder: SlotFinder<'a, O>) -> Self {
        Self { finder }
    }

    pub fn finder(&self) -> &SlotFinder<'a, O> {
        &self.finder
    }

    /// Make `balanceOf(owner)` on `contract` return `desired`.
    ///
    /// The mapping slot is discovered by probing with `owner` itself, so
    /// discovery and the final write always derive keys from the same
    /// holder. Returns the discovered slot index. Nothing is written unless
    /// a slot was verified.
    pub async fn set_balance(
        &self,
        contract: Address,
        owner: Address,
        desired: U256,
    ) -> Result<u64, SlotError> {
        let slot = self
            .finder
            .find_slot(contract, owner)
            .await?
            .ok_or(SlotError::SlotNotFound {
                contract,
                max_slot: self.finder.max_slot(),
            })?;

        let key = mapping_storage_key(owner, slot);
        self.finder
            .oracle()
            .write_storage(contract, key, storage_word(desired))
            .await?;

        info!(
            contract = %contract,
            owner = %owner,
            slot,
            balance = %desired,
            "balance overwritten"
        );
        Ok(slot)
    }

    /// [`set_balance`](Self::set_balance) followed by a read-back of
    /// `balanceOf(owner)`.
    pub async fn set_balance_verified(
        &self,
        contract: Address,
        owner: Address,
        desired: U256,
    ) -> Result<u64, SlotError> {
        let slot = self.set_balance(contract, owner, desired).await?;
        let observed = self.finder.oracle().read_balance(contract, owner).await?;
        if observed != desired {
            warn!(
                contract = %contract,
                owner = %owner,
                expected = %desired,
                observed = %observed,
                "balance read-back mismatch"
            );
            return Err(SlotError::VerificationFailed {
                owner,
                expected: desired,
                observed,
            });
        }
        Ok(slot)
    }
}

/// Store `value` left-padded into a known storage slot, e.g. an `owner`
/// variable declared first in the contract (slot 0).
pub async fn set_address_slot<O: StorageOracle>(
    oracle: &O,
    contract: Address,
    slot: B256,
    value: Address,
) -> Result<(), OracleError> {
    oracle
        .write_storage(contract, slot, address_word(value))
        .await?;
    info!(contract = %contract, slot = %slot, value = %value, "address slot overwritten");
    Ok(())
}
