// Live test node checks
//
// Runs against an Anvil/Hardhat fork at NODE_URL (default 127.0.0.1:8545).
// Skipped when no node answers or the fork's chain has no known token.

use alloy_primitives::{address, Address, U256};
use balance_slot_finder::config::DEFAULT_NODE_URL;
use balance_slot_finder::{BalanceSetter, NodeKind, SlotFinder, StorageOracle, TestNodeClient};

const HOLDER: Address = address!("436f795B64E23E6cE7792af4923A68AFD3967952");

/// Well-known ERC20 per forked chain.
fn token_for_chain(chain_id: u64) -> Option<Address> {
    match chain_id {
        // USDC
        1 => Some(address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48")),
        // USDT on Polygon
        137 => Some(address!("c2132D05D31c914a87C6611C10748AEb04B58e8F")),
        _ => None,
    }
}

async fn connect() -> Option<(TestNodeClient, Address)> {
    let url = std::env::var("NODE_URL").unwrap_or_else(|_| DEFAULT_NODE_URL.to_string());
    let kind: NodeKind = std::env::var("NODE_KIND")
        .ok()
        .and_then(|kind| kind.parse().ok())
        .unwrap_or_default();
    let client = TestNodeClient::new(&url, kind);

    let chain_id = match client.chain_id().await {
        Ok(id) => id,
        Err(_) => {
            println!("Skipping test - no test node at {url}");
            return None;
        }
    };
    match token_for_chain(chain_id) {
        Some(token) => Some((client, token)),
        None => {
            println!("Skipping test - no known token on chain {chain_id}");
            None
        }
    }
}

#[tokio::test]
async fn set_balance_on_forked_token() {
    let Some((client, token)) = connect().await else {
        return;
    };

    // Leave the fork as we found it.
    let outer = client.snapshot().await.unwrap();

    let slot = BalanceSetter::new(&client)
        .set_balance_verified(token, HOLDER, U256::from(100u64))
        .await
        .unwrap();
    println!("Found balance mapping slot {slot} for {token}");
    assert_eq!(client.read_balance(token, HOLDER).await.unwrap(), U256::from(100u64));

    client.revert(outer).await.unwrap();
}

#[tokio::test]
async fn forked_search_is_idempotent_and_isolated() {
    let Some((client, token)) = connect().await else {
        return;
    };

    let before = client.read_balance(token, HOLDER).await.unwrap();
    let finder = SlotFinder::new(&client);
    let first = finder.find_slot(token, HOLDER).await.unwrap();
    let second = finder.find_slot(token, HOLDER).await.unwrap();

    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(client.read_balance(token, HOLDER).await.unwrap(), before);
}
