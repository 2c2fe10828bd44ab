//! Environment-driven configuration for the binary.

use crate::rpc::NodeKind;
use crate::slots::{storage_word, DEFAULT_MAX_SLOT};
use alloy_primitives::{Address, B256, U256};
use eyre::{eyre, Result, WrapErr};

pub const DEFAULT_NODE_URL: &str = "http://127.0.0.1:8545";

/// Overwrite of a single address-valued slot, e.g. a token's `owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerOverride {
    pub slot: B256,
    pub new_owner: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub node_url: String,
    pub node_kind: NodeKind,
    pub max_slot: u64,
    pub token: Address,
    pub holder: Address,
    pub target_balance: U256,
    pub owner_override: Option<OwnerOverride>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| eyre!("{key} env var required"));

        let node_url = var("NODE_URL").unwrap_or_else(|| DEFAULT_NODE_URL.to_string());

        let node_kind = match var("NODE_KIND") {
            Some(kind) => kind.parse()?,
            None => NodeKind::default(),
        };

        let max_slot = match var("MAX_SLOT") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .wrap_err_with(|| format!("invalid MAX_SLOT: {raw}"))?,
            None => DEFAULT_MAX_SLOT,
        };

        let token = parse_address("TOKEN_ADDRESS", &required("TOKEN_ADDRESS")?)?;
        let holder = parse_address("HOLDER_ADDRESS", &required("HOLDER_ADDRESS")?)?;
        let target_balance = parse_u256(&required("TARGET_BALANCE")?)
            .wrap_err("invalid TARGET_BALANCE")?;

        let owner_override = match (var("OWNER_SLOT"), var("NEW_OWNER")) {
            (Some(slot), Some(owner)) => Some(OwnerOverride {
                slot: storage_word(parse_u256(&slot).wrap_err("invalid OWNER_SLOT")?),
                new_owner: parse_address("NEW_OWNER", &owner)?,
            }),
            (None, None) => None,
            _ => return Err(eyre!("OWNER_SLOT and NEW_OWNER must be set together")),
        };

        Ok(Self {
            node_url,
            node_kind,
            max_slot,
            token,
            holder,
            target_balance,
            owner_override,
        })
    }
}

fn parse_address(key: &str, raw: &str) -> Result<Address> {
    raw.trim()
        .parse()
        .map_err(|e| eyre!("invalid {key}: {e}"))
}

/// Decimal, or hex with a `0x` prefix.
fn parse_u256(raw: &str) -> Result<U256> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(raw, 10),
    };
    parsed.map_err(|e| eyre!("'{raw}': {e}"))
}
