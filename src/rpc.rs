//! JSON-RPC storage oracle for local test nodes (Anvil, Hardhat).
//!
//! Both nodes expose `evm_snapshot` / `evm_revert` and a `*_setStorageAt`
//! cheat method. The storage key must be sent as minimal hex with no leading
//! zeros (Hardhat rejects a padded key), while the value must be the full
//! 32-byte padded word.

use crate::oracle::{OracleError, Snapshot, StorageOracle};
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{sol, SolCall, SolValue};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

sol! {
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
    }
}

/// Which test node flavour is on the other end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    #[default]
    Anvil,
    Hardhat,
}

impl NodeKind {
    fn set_storage_method(self) -> &'static str {
        match self {
            NodeKind::Anvil => "anvil_setStorageAt",
            NodeKind::Hardhat => "hardhat_setStorageAt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown node kind '{0}' (expected anvil or hardhat)")]
pub struct UnknownNodeKind(pub String);

impl FromStr for NodeKind {
    type Err = UnknownNodeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anvil" | "foundry" => Ok(NodeKind::Anvil),
            "hardhat" => Ok(NodeKind::Hardhat),
            _ => Err(UnknownNodeKind(s.to_string())),
        }
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize, Debug)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, thiserror::Error)]
enum RpcError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message} (code {code})")]
    Rpc { code: i64, message: String },
    #[error("unexpected response: {0}")]
    Malformed(String),
}

/// Test node client speaking plain JSON-RPC over HTTP.
#[derive(Clone)]
pub struct TestNodeClient {
    url: String,
    kind: NodeKind,
    client: reqwest::Client,
    id: Arc<AtomicU64>,
}

impl TestNodeClient {
    pub fn new(url: &str, kind: NodeKind) -> Self {
        Self {
            url: url.to_string(),
            kind,
            client: reqwest::Client::new(),
            id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, RpcError> {
        let id = self.id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        debug!(method, %id, "RPC request");

        let body: JsonRpcResponse = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = body.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result
            .ok_or_else(|| RpcError::Malformed(format!("{method} response has no result")))
    }

    /// `eth_chainId`
    pub async fn chain_id(&self) -> Result<u64, OracleError> {
        let result = self
            .call("eth_chainId", serde_json::json!([]))
            .await
            .map_err(node_error("eth_chainId"))?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| OracleError::Node("eth_chainId result is not a string".into()))?;
        u64::from_str_radix(hex_str.trim_start_matches("0x"), 16)
            .map_err(|e| OracleError::Node(format!("invalid chain id {hex_str}: {e}")))
    }

    /// `eth_getStorageAt` at the latest block.
    pub async fn storage_at(&self, contract: Address, key: B256) -> Result<B256, OracleError> {
        let result = self
            .call(
                "eth_getStorageAt",
                serde_json::json!([format!("{contract:#x}"), padded_hex(key), "latest"]),
            )
            .await
            .map_err(node_error("eth_getStorageAt"))?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| OracleError::Node("eth_getStorageAt result is not a string".into()))?;
        parse_word(hex_str).map_err(OracleError::Node)
    }
}

fn node_error(method: &'static str) -> impl Fn(RpcError) -> OracleError {
    move |e| OracleError::Node(format!("{method}: {e}"))
}

/// `0x`-prefixed hex of the key as a number: `0x0`, `0x1f`, never padded.
fn minimal_hex(key: B256) -> String {
    format!("0x{:x}", U256::from_be_bytes(key.0))
}

/// `0x`-prefixed 64-digit hex of the whole word.
fn padded_hex(word: B256) -> String {
    format!("0x{}", hex::encode(word))
}

fn set_storage_params(contract: Address, key: B256, value: B256) -> serde_json::Value {
    serde_json::json!([format!("{contract:#x}"), minimal_hex(key), padded_hex(value)])
}

fn parse_word(s: &str) -> Result<B256, String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.len() > 64 {
        return Err(format!("word wider than 32 bytes: {s}"));
    }
    let padded = format!("{digits:0>64}");
    let mut word = [0u8; 32];
    hex::decode_to_slice(&padded, &mut word).map_err(|e| format!("invalid hex word {s}: {e}"))?;
    Ok(B256::from(word))
}

fn decode_balance(s: &str) -> Result<U256, String> {
    let data = hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| format!("invalid hex return data: {e}"))?;
    U256::abi_decode(&data).map_err(|e| format!("cannot decode balanceOf return {s}: {e}"))
}

impl StorageOracle for TestNodeClient {
    async fn read_balance(&self, contract: Address, owner: Address) -> Result<U256, OracleError> {
        let data = IERC20::balanceOfCall { account: owner }.abi_encode();
        let result = self
            .call(
                "eth_call",
                serde_json::json!([
                    {
                        "to": format!("{contract:#x}"),
                        "data": format!("0x{}", hex::encode(data)),
                    },
                    "latest"
                ]),
            )
            .await
            .map_err(|e| OracleError::Call(e.to_string()))?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| OracleError::Call("eth_call result is not a string".into()))?;
        decode_balance(hex_str).map_err(OracleError::Call)
    }

    async fn write_storage(
        &self,
        contract: Address,
        key: B256,
        value: B256,
    ) -> Result<(), OracleError> {
        let method = self.kind.set_storage_method();
        self.call(method, set_storage_params(contract, key, value))
            .await
            .map_err(|e| OracleError::Node(format!("{method}: {e}")))?;
        Ok(())
    }

    async fn snapshot(&self) -> Result<Snapshot, OracleError> {
        let result = self
            .call("evm_snapshot", serde_json::json!([]))
            .await
            .map_err(node_error("evm_snapshot"))?;
        let id = result
            .as_str()
            .ok_or_else(|| OracleError::Node(format!("evm_snapshot returned {result}")))?;
        Ok(Snapshot::new(id))
    }

    async fn revert(&self, snapshot: Snapshot) -> Result<(), OracleError> {
        let result = self
            .call("evm_revert", serde_json::json!([snapshot.id()]))
            .await
            .map_err(node_error("evm_revert"))?;
        match result.as_bool() {
            Some(true) => Ok(()),
            _ => Err(OracleError::Node(format!(
                "evm_revert to snapshot {snapshot} returned {result}"
            ))),
        }
    }
}
