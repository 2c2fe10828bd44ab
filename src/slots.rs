//! ERC20 balance storage key derivation.
//!
//! Standard Solidity `mapping(address => uint256)` declared at slot N stores
//! `balances[holder]` at `keccak256(abi.encode(holder, N))`: the holder
//! left-padded to 32 bytes, followed by N left-padded to 32 bytes.

use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::SolValue;

/// Sentinel written during probing. Chosen to be unlikely as a real balance.
pub const PROBE_MARKER: U256 = U256::from_limbs([0xDEAD_BEEF, 0, 0, 0]);

/// Upper bound (exclusive) on the mapping slot indices tried by default.
pub const DEFAULT_MAX_SLOT: u64 = 100;

/// `keccak256(abi.encode(owner, slot_index))`
pub fn mapping_storage_key(owner: Address, slot_index: u64) -> B256 {
    let encoded = (owner, U256::from(slot_index)).abi_encode();
    keccak256(&encoded)
}

/// Full 32-byte big-endian word for a numeric storage value.
pub fn storage_word(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

/// Address left-padded into a 32-byte storage word.
pub fn address_word(address: Address) -> B256 {
    address.into_word()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    #[test]
    fn zero_address_slot_0_matches_known_key() {
        // keccak256(bytes32(0) ++ bytes32(0))
        let key = mapping_storage_key(Address::ZERO, 0);
        assert_eq!(
            key,
            b256!("ad3228b676f7d3cd4284a5443f17f1962b36e491b30a40b2405849e597ba5fb5")
        );
    }

    #[test]
    fn key_is_holder_then_slot() {
        let holder = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let mut preimage = [0u8; 64];
        preimage[12..32].copy_from_slice(holder.as_slice());
        preimage[63] = 2;
        assert_eq!(mapping_storage_key(holder, 2), keccak256(preimage));
    }

    #[test]
    fn different_slots_give_different_keys() {
        let holder = address!("436f795B64E23E6cE7792af4923A68AFD3967952");
        let keys: std::collections::HashSet<B256> =
            (0..DEFAULT_MAX_SLOT).map(|slot| mapping_storage_key(holder, slot)).collect();
        assert_eq!(keys.len(), DEFAULT_MAX_SLOT as usize);
    }

    #[test]
    fn storage_word_is_left_padded() {
        let word = storage_word(PROBE_MARKER);
        assert!(word[..28].iter().all(|b| *b == 0));
        assert_eq!(&word[28..], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn address_word_is_left_padded() {
        let owner = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let word = address_word(owner);
        assert!(word[..12].iter().all(|b| *b == 0));
        assert_eq!(&word[12..], owner.as_slice());
    }
}
