//! Brute-force discovery of an ERC20 balance mapping slot.
//!
//! For each candidate slot index the finder snapshots the node, writes the
//! probe marker to `keccak256(abi.encode(owner, slot))`, reads `balanceOf`
//! back and reverts. The first candidate where the marker shows up through
//! the contract's own accessor is the mapping slot.

use crate::error::SlotError;
use crate::oracle::{OracleError, StorageOracle};
use crate::slots::{mapping_storage_key, storage_word, DEFAULT_MAX_SLOT, PROBE_MARKER};
use alloy_primitives::{Address, U256};
use tracing::{debug, info};

/// Result of probing a single candidate slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// `balanceOf` returned the marker.
    Match,
    /// `balanceOf` returned something else.
    Mismatch { observed: U256 },
    /// The marker write was rejected.
    WriteFailed(OracleError),
    /// `balanceOf` failed after the write.
    ReadFailed(OracleError),
}

impl ProbeOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, ProbeOutcome::Match)
    }
}

/// Outcome of one candidate slot within a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRecord {
    pub slot: u64,
    pub outcome: ProbeOutcome,
}

/// Every probe of one search, in order, and the slot it settled on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotSearch {
    pub slot: Option<u64>,
    pub probes: Vec<ProbeRecord>,
}

impl SlotSearch {
    /// Probes whose write or read step errored.
    pub fn failed_probes(&self) -> impl Iterator<Item = &ProbeRecord> {
        self.probes.iter().filter(|record| {
            matches!(
                record.outcome,
                ProbeOutcome::WriteFailed(_) | ProbeOutcome::ReadFailed(_)
            )
        })
    }
}

/// Linear scan over candidate mapping slots `0..max_slot`.
pub struct SlotFinder<'a, O> {
    oracle: &'a O,
    max_slot: u64,
    marker: U256,
}

impl<'a, O: StorageOracle> SlotFinder<'a, O> {
    pub fn new(oracle: &'a O) -> Self {
        Self {
            oracle,
            max_slot: DEFAULT_MAX_SLOT,
            marker: PROBE_MARKER,
        }
    }

    /// Exclusive upper bound on candidate slot indices.
    pub fn with_max_slot(mut self, max_slot: u64) -> Self {
        self.max_slot = max_slot;
        self
    }

    /// Sentinel written to each candidate, [`PROBE_MARKER`] by default.
    pub fn with_marker(mut self, marker: U256) -> Self {
        self.marker = marker;
        self
    }

    /// Exclusive upper bound in use.
    pub fn max_slot(&self) -> u64 {
        self.max_slot
    }

    /// Sentinel value in use.
    pub fn marker(&self) -> U256 {
        self.marker
    }

    /// Node the finder reads from and writes to.
    pub fn oracle(&self) -> &'a O {
        self.oracle
    }

    /// Index of the `mapping(address => uint256)` backing `balanceOf`, or
    /// `None` if no candidate below `max_slot` matched.
    pub async fn find_slot(
        &self,
        contract: Address,
        probe_owner: Address,
    ) -> Result<Option<u64>, SlotError> {
        Ok(self.search(contract, probe_owner).await?.slot)
    }

    /// Same as [`find_slot`](Self::find_slot), keeping the outcome of every
    /// probe.
    pub async fn search(
        &self,
        contract: Address,
        probe_owner: Address,
    ) -> Result<SlotSearch, SlotError> {
        let baseline = self.oracle.read_balance(contract, probe_owner).await?;
        if baseline == self.marker {
            return Err(SlotError::MarkerCollision {
                owner: probe_owner,
                marker: self.marker,
            });
        }

        let mut search = SlotSearch::default();
        for slot in 0..self.max_slot {
            let outcome = self.probe(contract, probe_owner, slot).await?;
            match &outcome {
                ProbeOutcome::Match => {}
                ProbeOutcome::Mismatch { observed } => {
                    debug!(contract = %contract, slot, observed = %observed, "probe mismatch");
                }
                ProbeOutcome::WriteFailed(e) | ProbeOutcome::ReadFailed(e) => {
                    debug!(contract = %contract, slot, error = %e, "probe failed, skipping slot");
                }
            }

            let found = outcome.is_match();
            search.probes.push(ProbeRecord { slot, outcome });
            if found {
                info!(
                    contract = %contract,
                    slot,
                    probes = search.probes.len(),
                    "found balance mapping slot"
                );
                search.slot = Some(slot);
                return Ok(search);
            }
        }

        info!(
            contract = %contract,
            max_slot = self.max_slot,
            failed = search.failed_probes().count(),
            "no balance mapping slot found"
        );
        Ok(search)
    }

    /// Test a single candidate inside its own snapshot.
    ///
    /// The node is reverted whatever the candidate outcome; only a failed
    /// snapshot or revert is an error.
    pub async fn probe(
        &self,
        contract: Address,
        owner: Address,
        slot: u64,
    ) -> Result<ProbeOutcome, SlotError> {
        let snapshot = self.oracle.snapshot().await?;
        let outcome = self.check_candidate(contract, owner, slot).await;
        self.oracle
            .revert(snapshot)
            .await
            .map_err(|source| SlotError::Isolation { slot, source })?;
        Ok(outcome)
    }

    async fn check_candidate(&self, contract: Address, owner: Address, slot: u64) -> ProbeOutcome {
        let key = mapping_storage_key(owner, slot);
        if let Err(e) = self
            .oracle
            .write_storage(contract, key, storage_word(self.marker))
            .await
        {
            return ProbeOutcome::WriteFailed(e);
        }

        match self.oracle.read_balance(contract, owner).await {
            Ok(observed) if observed == self.marker => ProbeOutcome::Match,
            Ok(observed) => ProbeOutcome::Mismatch { observed },
            Err(e) => ProbeOutcome::ReadFailed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryNode;
    use alloy_primitives::address;

    const TOKEN: Address = address!("dAC17F958D2ee523a2206206994597C13D831ec7");
    const HOLDER: Address = address!("436f795B64E23E6cE7792af4923A68AFD3967952");

    #[tokio::test]
    async fn finds_slot_2() {
        let node = InMemoryNode::new();
        node.deploy_token(TOKEN, Some(2));

        let finder = SlotFinder::new(&node);
        assert_eq!(finder.find_slot(TOKEN, HOLDER).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn finds_slot_0_for_zero_address() {
        let node = InMemoryNode::new();
        node.deploy_token(TOKEN, Some(0));

        let finder = SlotFinder::new(&node);
        assert_eq!(finder.find_slot(TOKEN, Address::ZERO).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn slot_at_bound_is_not_found() {
        let node = InMemoryNode::new();
        node.deploy_token(TOKEN, Some(10));

        let finder = SlotFinder::new(&node).with_max_slot(10);
        let search = finder.search(TOKEN, HOLDER).await.unwrap();
        assert_eq!(search.slot, None);
        assert_eq!(search.probes.len(), 10);

        let finder = SlotFinder::new(&node).with_max_slot(11);
        assert_eq!(finder.find_slot(TOKEN, HOLDER).await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn search_stops_at_first_match() {
        let node = InMemoryNode::new();
        node.deploy_token(TOKEN, Some(3));

        let search = SlotFinder::new(&node).search(TOKEN, HOLDER).await.unwrap();
        assert_eq!(search.slot, Some(3));
        let slots: Vec<u64> = search.probes.iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
        assert!(search.probes[..3]
            .iter()
            .all(|r| r.outcome == ProbeOutcome::Mismatch { observed: U256::ZERO }));
    }

    #[tokio::test]
    async fn probe_leaves_no_trace() {
        let node = InMemoryNode::new();
        node.deploy_token(TOKEN, Some(5));
        node.mint(TOKEN, HOLDER, U256::from(42u64)).unwrap();
        let before = node.storage_of(TOKEN);

        let finder = SlotFinder::new(&node);
        assert_eq!(finder.probe(TOKEN, HOLDER, 5).await.unwrap(), ProbeOutcome::Match);
        assert_eq!(
            finder.probe(TOKEN, HOLDER, 4).await.unwrap(),
            ProbeOutcome::Mismatch { observed: U256::from(42u64) }
        );
        assert_eq!(node.storage_of(TOKEN), before);
        assert_eq!(node.live_snapshots(), 0);
    }

    #[tokio::test]
    async fn existing_marker_balance_is_rejected() {
        let node = InMemoryNode::new();
        node.deploy_token(TOKEN, Some(1));
        node.mint(TOKEN, HOLDER, PROBE_MARKER).unwrap();

        let err = SlotFinder::new(&node).find_slot(TOKEN, HOLDER).await.unwrap_err();
        assert!(matches!(err, SlotError::MarkerCollision { .. }));

        // A different marker sidesteps the collision.
        let finder = SlotFinder::new(&node).with_marker(U256::from(0x1234_5678u64));
        assert_eq!(finder.find_slot(TOKEN, HOLDER).await.unwrap(), Some(1));
    }

    #[test]
    fn builder_settings_are_reported() {
        let node = InMemoryNode::new();
        let finder = SlotFinder::new(&node);
        assert_eq!(finder.max_slot(), DEFAULT_MAX_SLOT);
        assert_eq!(finder.marker(), PROBE_MARKER);

        let finder = finder.with_max_slot(7).with_marker(U256::from(1u64));
        assert_eq!(finder.max_slot(), 7);
        assert_eq!(finder.marker(), U256::from(1u64));
        assert!(std::ptr::eq(finder.oracle(), &node));
    }

    #[tokio::test]
    async fn missing_contract_fails_before_probing() {
        let node = InMemoryNode::new();
        let err = SlotFinder::new(&node).find_slot(TOKEN, HOLDER).await.unwrap_err();
        assert!(matches!(err, SlotError::Oracle(OracleError::Call(_))));
        assert!(node.storage_of(TOKEN).is_empty());
    }
}
