// ERC20 Balance Slot Finder Library
//
// Locates the storage slot of an ERC20 balances mapping on a test node by
// probing, then overwrites balances through it.

pub mod config;
pub mod error;
pub mod finder;
pub mod memory;
pub mod oracle;
pub mod rpc;
pub mod setter;
pub mod slots;

// Re-export commonly used items
pub use error::SlotError;
pub use finder::{ProbeOutcome, ProbeRecord, SlotFinder, SlotSearch};
pub use memory::InMemoryNode;
pub use oracle::{OracleError, Snapshot, StorageOracle};
pub use rpc::{NodeKind, TestNodeClient, UnknownNodeKind};
pub use setter::{set_address_slot, BalanceSetter};
pub use slots::{mapping_storage_key, storage_word, DEFAULT_MAX_SLOT, PROBE_MARKER};
