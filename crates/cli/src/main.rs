//! In-memory Basalt dev node: boots a genesis with pre-funded accounts,
//! produces blocks on a timer and logs what it seals. Ctrl-C stops it.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use basalt_config::{ChainConfig, GenesisConfig, DEFAULT_DEV_ACCOUNT_COUNT};
use basalt_core::{ContractRuntime, InMemoryStaking, Node};
use basalt_types::U256;

#[derive(Debug, Parser)]
#[command(name = "basalt-node", version, about = "Basalt in-memory dev node")]
struct Cli {
    /// Chain id the node validates transactions against.
    #[arg(long, env = "BASALT_CHAIN_ID", default_value_t = 31_337)]
    chain_id: u32,

    /// Milliseconds between produced blocks.
    #[arg(long, env = "BASALT_BLOCK_TIME_MS", default_value_t = 1_000)]
    block_time_ms: u32,

    /// Gas budget per block.
    #[arg(long, default_value_t = 30_000_000)]
    block_gas_limit: u64,

    /// Number of pre-funded dev accounts to generate.
    #[arg(long, default_value_t = DEFAULT_DEV_ACCOUNT_COUNT)]
    dev_accounts: u32,

    /// Minimum validator stake, in base units.
    #[arg(long, default_value_t = 1_000_000)]
    min_validator_stake: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ChainConfig::default()
        .with_chain_id(cli.chain_id)
        .with_block_time_ms(cli.block_time_ms)
        .with_block_gas_limit(cli.block_gas_limit);

    let (genesis, keypairs) =
        GenesisConfig::dev(chrono::Utc::now().timestamp_millis(), cli.dev_accounts);
    let staking = Arc::new(InMemoryStaking::new(U256::from(cli.min_validator_stake)));

    // Dev proposer is the first generated account.
    let proposer = keypairs
        .first()
        .map(|keypair| keypair.address())
        .context("at least one dev account is generated")?;

    let mut node = Node::new(
        config,
        &genesis,
        Arc::new(ContractRuntime::with_builtins()),
        Some(staking),
        proposer,
    )?;

    tracing::info!(
        chain_id = cli.chain_id,
        block_time_ms = cli.block_time_ms,
        "starting basalt dev node"
    );
    for (index, keypair) in keypairs.iter().enumerate() {
        tracing::info!(
            account = index,
            address = %keypair.address(),
            public_key = %keypair.public_key(),
            "dev account funded"
        );
    }

    let mut blocks = node
        .add_block_listener()
        .context("listener is available before start")?;
    let handle = node.start().context("producer starts exactly once")?;

    let logger = tokio::spawn(async move {
        while let Some(block) = blocks.recv().await {
            if !block.transactions.is_empty() {
                tracing::info!(
                    number = block.header.number,
                    hash = %block.hash,
                    txs = block.transactions.len(),
                    gas_used = block.header.gas_used,
                    base_fee = %block.header.base_fee,
                    "sealed block"
                );
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    handle.stop().await;
    logger.abort();
    Ok(())
}
