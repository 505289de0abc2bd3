//! Node facade wiring the core together: canonical state, chain, mempool
//! and the block production loop, plus the transaction submit path.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;

use basalt_config::{ChainConfig, GenesisConfig};
use basalt_types::{Account, Address, Block, Hash256, Receipt, Transaction, U256};

use crate::blockchain::Blockchain;
use crate::builder::BlockBuilder;
use crate::executor::Executor;
use crate::fee::BaseFeeCalculator;
use crate::gas::GasTable;
use crate::genesis::build_genesis;
use crate::mempool::{Mempool, PoolConfig, PoolError};
use crate::producer::{BlockProducer, ProducerHandle};
use crate::runtime::ContractRuntime;
use crate::staking::StakingState;
use crate::state::{InMemoryState, ReadState};
use crate::validator::validate_transaction;

/// Submission refusal: either the validator said no or the pool did.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] basalt_types::TxError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// An assembled node. Construction seeds genesis; [`Node::start`] spawns the
/// production loop.
pub struct Node {
    config: ChainConfig,
    chain: Blockchain,
    mempool: Mempool,
    state: Arc<RwLock<InMemoryState>>,
    producer: Option<BlockProducer>,
}

impl Node {
    pub fn new(
        config: ChainConfig,
        genesis: &GenesisConfig,
        runtime: Arc<ContractRuntime>,
        staking: Option<Arc<dyn StakingState>>,
        proposer: Address,
    ) -> anyhow::Result<Self> {
        let (state, genesis_block) = build_genesis(&config, genesis);
        let chain = Blockchain::new(config.clone());
        chain
            .add_block(genesis_block, None)
            .map_err(|err| anyhow::anyhow!("failed to seed genesis: {err}"))?;

        let mut executor = Executor::new(GasTable::for_chain(&config), runtime);
        if let Some(staking) = staking {
            executor = executor.with_staking(staking);
        }
        let builder = BlockBuilder::new(config.clone(), executor);
        let state = Arc::new(RwLock::new(state));
        let mempool = Mempool::new(PoolConfig::default());
        let producer = BlockProducer::new(
            chain.clone(),
            mempool.clone(),
            Arc::clone(&state),
            builder,
            proposer,
            Duration::from_millis(u64::from(config.block_time_ms)),
        );

        Ok(Self {
            config,
            chain,
            mempool,
            state,
            producer: Some(producer),
        })
    }

    /// Validates against the canonical state and the next block's base fee,
    /// then admits into the pool. Refusals surface the validator error.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Hash256, SubmitError> {
        let state = self.state.read().expect("state lock is poisoned").clone();
        validate_transaction(&tx, &state, self.next_base_fee(), &self.config)?;
        let hash = self.mempool.add(tx)?;
        Ok(hash)
    }

    /// Base fee the next block will charge, derived from the current tip.
    pub fn next_base_fee(&self) -> U256 {
        match self.chain.latest() {
            Some(tip) => BaseFeeCalculator::next_base_fee(&tip.header, &self.config),
            None => self.config.initial_base_fee,
        }
    }

    /// Spawns block production. Subsequent calls return `None`.
    pub fn start(&mut self) -> Option<ProducerHandle> {
        self.producer.take().map(BlockProducer::spawn)
    }

    /// Subscribes to produced blocks; only available before [`Node::start`].
    pub fn add_block_listener(&self) -> Option<mpsc::UnboundedReceiver<Arc<Block>>> {
        self.producer
            .as_ref()
            .map(BlockProducer::add_block_listener)
    }

    pub fn add_tx_listener(&self) -> mpsc::UnboundedReceiver<Arc<Transaction>> {
        self.mempool.add_tx_listener()
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn latest_block(&self) -> Option<Arc<Block>> {
        self.chain.latest()
    }

    pub fn receipt(&self, tx_hash: &Hash256) -> Option<Receipt> {
        self.chain.receipt(tx_hash)
    }

    pub fn account(&self, address: &Address) -> Option<Account> {
        self.state
            .read()
            .expect("state lock is poisoned")
            .account(address)
    }

    pub fn balance(&self, address: &Address) -> U256 {
        self.account(address)
            .map(|account| account.balance)
            .unwrap_or(U256::ZERO)
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.account(address).map(|account| account.nonce).unwrap_or(0)
    }
}
