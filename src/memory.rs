//! In-process storage oracle.
//!
//! Models just enough of a test node to exercise the slot search without a
//! running Anvil: raw per-contract storage, snapshot/revert with test-node
//! semantics, and mock ERC20 contracts whose `balanceOf` reads a
//! `mapping(address => uint256)` declared at a configurable slot.

use crate::oracle::{OracleError, Snapshot, StorageOracle};
use crate::slots::{mapping_storage_key, storage_word};
use alloy_primitives::{Address, B256, U256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct NodeState {
    /// contract → (key → non-zero word)
    storage: HashMap<Address, HashMap<B256, B256>>,
    /// Deployed mock tokens: contract → balance mapping slot.
    /// `None` means `balanceOf` ignores storage and always returns zero.
    tokens: HashMap<Address, Option<u64>>,
}

#[derive(Debug, Default)]
struct Inner {
    state: NodeState,
    /// Saved states, oldest first.
    snapshots: Vec<(u64, NodeState)>,
    next_snapshot_id: u64,
}

/// Mutable in-memory EVM node with mock ERC20 contracts.
#[derive(Debug, Default)]
pub struct InMemoryNode {
    inner: Mutex<Inner>,
}

impl InMemoryNode {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        // State is plain data; a panic elsewhere cannot leave it half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a mock ERC20 at `contract` with its balances mapping at
    /// `balance_slot`.
    pub fn deploy_token(&self, contract: Address, balance_slot: Option<u64>) {
        self.inner().state.tokens.insert(contract, balance_slot);
    }

    /// Credit `owner` with `amount` through the token's own mapping layout.
    pub fn mint(&self, contract: Address, owner: Address, amount: U256) -> Result<(), OracleError> {
        let mut inner = self.inner();
        let slot = match inner.state.tokens.get(&contract) {
            Some(Some(slot)) => *slot,
            Some(None) => {
                return Err(OracleError::Call(format!(
                    "token {contract:#x} has no balance mapping"
                )))
            }
            None => return Err(OracleError::Call(format!("no contract at {contract:#x}"))),
        };
        let key = mapping_storage_key(owner, slot);
        let current = read_word(&inner.state, contract, key);
        let updated = U256::from_be_bytes(current.0).saturating_add(amount);
        write_word(&mut inner.state, contract, key, storage_word(updated));
        Ok(())
    }

    /// `balanceOf(owner)` as the mock contract computes it.
    pub fn balance_of(&self, contract: Address, owner: Address) -> Result<U256, OracleError> {
        let inner = self.inner();
        match inner.state.tokens.get(&contract) {
            Some(Some(slot)) => {
                let word = read_word(&inner.state, contract, mapping_storage_key(owner, *slot));
                Ok(U256::from_be_bytes(word.0))
            }
            Some(None) => Ok(U256::ZERO),
            None => Err(OracleError::Call(format!("no contract at {contract:#x}"))),
        }
    }

    /// Raw storage word; zero when never written.
    pub fn storage_at(&self, contract: Address, key: B256) -> B256 {
        read_word(&self.inner().state, contract, key)
    }

    /// All non-zero storage words of `contract`.
    pub fn storage_of(&self, contract: Address) -> HashMap<B256, B256> {
        self.inner()
            .state
            .storage
            .get(&contract)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of non-zero storage words held by `contract`.
    pub fn storage_len(&self, contract: Address) -> usize {
        self.inner()
            .state
            .storage
            .get(&contract)
            .map_or(0, HashMap::len)
    }

    /// Number of snapshots that can still be reverted to.
    pub fn live_snapshots(&self) -> usize {
        self.inner().snapshots.len()
    }
}

fn read_word(state: &NodeState, contract: Address, key: B256) -> B256 {
    state
        .storage
        .get(&contract)
        .and_then(|slots| slots.get(&key))
        .copied()
        .unwrap_or(B256::ZERO)
}

fn write_word(state: &mut NodeState, contract: Address, key: B256, value: B256) {
    let slots = state.storage.entry(contract).or_default();
    if value == B256::ZERO {
        slots.remove(&key);
    } else {
        slots.insert(key, value);
    }
    if slots.is_empty() {
        state.storage.remove(&contract);
    }
}

fn parse_snapshot_id(id: &str) -> Option<u64> {
    u64::from_str_radix(id.strip_prefix("0x")?, 16).ok()
}

impl StorageOracle for InMemoryNode {
    async fn read_balance(&self, contract: Address, owner: Address) -> Result<U256, OracleError> {
        self.balance_of(contract, owner)
    }

    async fn write_storage(
        &self,
        contract: Address,
        key: B256,
        value: B256,
    ) -> Result<(), OracleError> {
        write_word(&mut self.inner().state, contract, key, value);
        Ok(())
    }

    async fn snapshot(&self) -> Result<Snapshot, OracleError> {
        let mut inner = self.inner();
        let id = inner.next_snapshot_id;
        inner.next_snapshot_id += 1;
        let state = inner.state.clone();
        inner.snapshots.push((id, state));
        debug!(id, "in-memory snapshot taken");
        Ok(Snapshot::new(format!("{id:#x}")))
    }

    /// Restores the snapshot and drops it together with every later one.
    async fn revert(&self, snapshot: Snapshot) -> Result<(), OracleError> {
        let mut inner = self.inner();
        let position = parse_snapshot_id(snapshot.id())
            .and_then(|id| inner.snapshots.iter().position(|(saved, _)| *saved == id))
            .ok_or_else(|| OracleError::Node(format!("unknown snapshot {snapshot}")))?;
        let (_, state) = inner.snapshots.swap_remove(position);
        inner.snapshots.truncate(position);
        inner.state = state;
        Ok(())
    }
}
