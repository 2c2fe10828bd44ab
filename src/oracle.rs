//! Storage oracle abstraction over an EVM test node.
//!
//! The slot search only needs four primitives from the node: raw storage
//! writes, snapshot/revert, and a `balanceOf` read used as the observation.
//! Wire-format details (hex padding, RPC method names) stay in the
//! implementations; everything here deals in typed 32-byte words.

use alloy_primitives::{Address, B256, U256};
use std::fmt;
use std::future::Future;

/// Failure reported by a [`StorageOracle`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// The read-only `balanceOf` call failed: missing accessor, node-side
    /// revert, undecodable return data or unreachable node.
    #[error("balanceOf call failed: {0}")]
    Call(String),
    /// A snapshot, revert or storage write RPC failed.
    #[error("node request failed: {0}")]
    Node(String),
}

/// Checkpoint of the entire node state.
///
/// Not `Clone`: [`StorageOracle::revert`] consumes it, and test nodes drop a
/// snapshot (and every later one) once it has been reverted to.
#[derive(Debug, PartialEq, Eq)]
pub struct Snapshot {
    id: String,
}

impl Snapshot {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Node-assigned identifier, passed back verbatim on revert.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Mutable EVM node the slot search runs against.
///
/// Callers must hold exclusive access to the node for the duration of a
/// search; snapshots are not reentrant.
pub trait StorageOracle {
    /// `balanceOf(owner)` on `contract`.
    fn read_balance(
        &self,
        contract: Address,
        owner: Address,
    ) -> impl Future<Output = Result<U256, OracleError>> + Send;

    /// Overwrite one raw storage slot of `contract`, bypassing contract logic.
    fn write_storage(
        &self,
        contract: Address,
        key: B256,
        value: B256,
    ) -> impl Future<Output = Result<(), OracleError>> + Send;

    /// Capture the full node state.
    fn snapshot(&self) -> impl Future<Output = Result<Snapshot, OracleError>> + Send;

    /// Restore the state captured by `snapshot`.
    fn revert(&self, snapshot: Snapshot) -> impl Future<Output = Result<(), OracleError>> + Send;
}
