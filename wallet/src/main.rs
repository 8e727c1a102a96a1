use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wallet::db::SqliteCache;
use wallet::errors::{Result, WalletError};
use wallet::prover::EchoProver;
use wallet::{InMemoryLedger, ShieldedClient, WalletConfig};
use zk_ledger::constants::SIGNATURE_LEN;
use zk_ledger::Address;

/// Stand-in for a wallet signature over the key derivation message.
fn demo_signature(fill: u8) -> [u8; SIGNATURE_LEN] {
    let mut sig = [fill; SIGNATURE_LEN];
    sig[SIGNATURE_LEN - 1] = 0x1b;
    sig
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| WalletError::Input(format!("log filter: {e}")))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = WalletConfig::from_env()?;
    let ledger = Arc::new(InMemoryLedger::new());
    let token = Address([0x11; 20]);
    let account = Address([0x22; 20]);
    ledger.fund(account, token, 1_000).await;

    let mut alice = ShieldedClient::open(
        ledger.clone(),
        EchoProver::new(),
        SqliteCache::connect(&config.cache_url).await?,
        config.clone(),
        &demo_signature(0xa1),
    )
    .await?;
    let mut bob = ShieldedClient::open(
        ledger.clone(),
        EchoProver::new(),
        SqliteCache::connect(&config.cache_url).await?,
        config.clone(),
        &demo_signature(0xb0),
    )
    .await?;

    alice.entry(token, 100, account).await?;
    alice.deposit(token, 50, account).await?;
    bob.entry(token, 0, account).await?;
    alice.send(token, 30, bob.public_key()).await?;
    bob.absorb(token).await?;
    bob.withdraw(token, 10, account).await?;

    tracing::info!(
        alice = %alice.balance(&token),
        bob = %bob.balance(&token),
        public = %ledger.public_balance(account, token).await,
        pool = %ledger.pool_balance(token).await,
        "demo finished"
    );

    Ok(())
}
