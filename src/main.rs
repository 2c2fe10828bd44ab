// ERC20 Balance Slot Finder
//
// Points at a local Anvil/Hardhat node (usually a mainnet fork):
// 1. Finds the storage slot of the token's balances mapping by probing
// 2. Overwrites the holder's balance and reads it back
// 3. Optionally overwrites an address slot such as the token owner
//
// Configuration comes from the environment, see `config.rs`.

use balance_slot_finder::config::Config;
use balance_slot_finder::{set_address_slot, BalanceSetter, SlotFinder, TestNodeClient};
use tracing::info;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        node_url = %config.node_url,
        node_kind = ?config.node_kind,
        token = %config.token,
        holder = %config.holder,
        max_slot = config.max_slot,
        "balance slot finder config"
    );

    let client = TestNodeClient::new(&config.node_url, config.node_kind);
    let chain_id = client.chain_id().await?;
    info!(chain_id, "connected to test node");

    let finder = SlotFinder::new(&client).with_max_slot(config.max_slot);
    let setter = BalanceSetter::with_finder(finder);
    let slot = setter
        .set_balance_verified(config.token, config.holder, config.target_balance)
        .await?;
    info!(
        slot,
        balance = %config.target_balance,
        "holder balance set and verified"
    );

    if let Some(owner) = &config.owner_override {
        set_address_slot(&client, config.token, owner.slot, owner.new_owner).await?;
        let stored = client.storage_at(config.token, owner.slot).await?;
        info!(slot = %owner.slot, stored = %stored, "owner slot overwritten");
    }

    Ok(())
}
