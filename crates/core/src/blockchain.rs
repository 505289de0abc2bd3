//! Canonical chain manager: append with invariant checks, hash/number
//! indices, tip tracking and retention eviction.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use basalt_config::ChainConfig;
use basalt_types::{Block, ChainError, Hash256, Receipt};

/// Number of recent block bodies kept in memory besides genesis. Older
/// bodies are evicted; a persistence collaborator keeps them durable.
pub const BLOCK_RETENTION: u64 = 10_000;

struct ChainInner {
    blocks: HashMap<Hash256, Arc<Block>>,
    hashes: HashMap<u64, Hash256>,
    /// Transaction hash → containing block hash, for receipt lookups.
    tx_index: HashMap<Hash256, Hash256>,
    tip: Option<Arc<Block>>,
}

/// Thread-safe chain view. Clones share the underlying chain.
#[derive(Clone)]
pub struct Blockchain {
    config: ChainConfig,
    inner: Arc<RwLock<ChainInner>>,
}

impl Blockchain {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            inner: Arc::new(RwLock::new(ChainInner {
                blocks: HashMap::new(),
                hashes: HashMap::new(),
                tx_index: HashMap::new(),
                tip: None,
            })),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, ChainInner> {
        self.inner.read().expect("Blockchain lock is poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChainInner> {
        self.inner.write().expect("Blockchain lock is poisoned")
    }

    /// Appends `block` to the canonical chain after checking the tip
    /// invariants. When `computed_state_root` is given it must match the
    /// header. On success the tip advances and old bodies are evicted.
    pub fn add_block(
        &self,
        block: Block,
        computed_state_root: Option<Hash256>,
    ) -> Result<Arc<Block>, ChainError> {
        let mut inner = self.write();

        match &inner.tip {
            Some(tip) => {
                if block.header.parent_hash != tip.hash {
                    return Err(ChainError::ParentHashMismatch {
                        expected: tip.hash,
                        actual: block.header.parent_hash,
                    });
                }
                if block.header.number != tip.header.number + 1 {
                    return Err(ChainError::NumberMismatch {
                        expected: tip.header.number + 1,
                        actual: block.header.number,
                    });
                }
                if block.header.timestamp <= tip.header.timestamp {
                    return Err(ChainError::NonMonotonicTimestamp {
                        tip: tip.header.timestamp,
                        actual: block.header.timestamp,
                    });
                }
            }
            None => {
                if block.header.number != 0 {
                    return Err(ChainError::NumberMismatch {
                        expected: 0,
                        actual: block.header.number,
                    });
                }
            }
        }

        if !block.is_genesis() {
            if block.header.chain_id != self.config.chain_id {
                return Err(ChainError::ChainIdMismatch {
                    expected: self.config.chain_id,
                    actual: block.header.chain_id,
                });
            }
            if block.header.gas_used > block.header.gas_limit {
                return Err(ChainError::GasUsedExceedsLimit {
                    gas_used: block.header.gas_used,
                    gas_limit: block.header.gas_limit,
                });
            }
            if block.header.extra_data.len() > self.config.max_extra_data_bytes as usize {
                return Err(ChainError::ExtraDataTooLarge {
                    size: block.header.extra_data.len(),
                    limit: self.config.max_extra_data_bytes as usize,
                });
            }
        }

        if let Some(computed) = computed_state_root {
            if computed != block.header.state_root {
                return Err(ChainError::StateRootMismatch {
                    computed,
                    header: block.header.state_root,
                });
            }
        }

        let block = Arc::new(block);
        inner.hashes.insert(block.header.number, block.hash);
        for tx in &block.transactions {
            inner.tx_index.insert(tx.hash(), block.hash);
        }
        inner.blocks.insert(block.hash, Arc::clone(&block));
        inner.tip = Some(Arc::clone(&block));

        tracing::info!(
            number = block.header.number,
            hash = %block.hash,
            txs = block.transactions.len(),
            gas_used = block.header.gas_used,
            "appended block"
        );

        Self::evict(&mut inner, block.header.number);
        Ok(block)
    }

    /// Drops bodies older than the retention window, always keeping genesis.
    /// Walks down from the cutoff and stops at the first gap, so sequential
    /// appends evict in amortized constant time.
    fn evict(inner: &mut ChainInner, tip_number: u64) {
        let cutoff = tip_number.saturating_sub(BLOCK_RETENTION).max(1);
        let mut number = cutoff - 1;
        while number >= 1 {
            let Some(hash) = inner.hashes.remove(&number) else {
                break;
            };
            if let Some(block) = inner.blocks.remove(&hash) {
                for tx in &block.transactions {
                    inner.tx_index.remove(&tx.hash());
                }
                tracing::trace!(number, hash = %hash, "evicted block body");
            }
            number -= 1;
        }
    }

    /// Seeds the chain from a recovered genesis and latest block without
    /// replaying anything in between; the caller restores state separately.
    pub fn resume_from_block(&self, genesis: Block, latest: Block) -> Result<(), ChainError> {
        let mut inner = self.write();
        if genesis.header.number != 0 {
            return Err(ChainError::NumberMismatch {
                expected: 0,
                actual: genesis.header.number,
            });
        }
        if latest.header.chain_id != self.config.chain_id {
            return Err(ChainError::ChainIdMismatch {
                expected: self.config.chain_id,
                actual: latest.header.chain_id,
            });
        }

        let genesis = Arc::new(genesis);
        let latest = if latest.header.number == 0 {
            Arc::clone(&genesis)
        } else {
            Arc::new(latest)
        };

        inner.hashes.insert(0, genesis.hash);
        inner.blocks.insert(genesis.hash, Arc::clone(&genesis));
        inner.hashes.insert(latest.header.number, latest.hash);
        for tx in &latest.transactions {
            inner.tx_index.insert(tx.hash(), latest.hash);
        }
        inner.blocks.insert(latest.hash, Arc::clone(&latest));
        inner.tip = Some(Arc::clone(&latest));

        tracing::info!(
            number = latest.header.number,
            hash = %latest.hash,
            "resumed chain from stored blocks"
        );
        Ok(())
    }

    pub fn latest(&self) -> Option<Arc<Block>> {
        self.read().tip.clone()
    }

    /// Current height; at least genesis is present on a started chain.
    pub fn height(&self) -> Option<u64> {
        self.read().tip.as_ref().map(|tip| tip.header.number)
    }

    pub fn block_by_hash(&self, hash: &Hash256) -> Option<Arc<Block>> {
        self.read().blocks.get(hash).cloned()
    }

    pub fn block_by_number(&self, number: u64) -> Option<Arc<Block>> {
        let inner = self.read();
        let hash = inner.hashes.get(&number)?;
        inner.blocks.get(hash).cloned()
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.read().blocks.contains_key(hash)
    }

    /// Receipt of a confirmed transaction, if its block is still retained.
    pub fn receipt(&self, tx_hash: &Hash256) -> Option<Receipt> {
        let inner = self.read();
        let block_hash = inner.tx_index.get(tx_hash)?;
        let block = inner.blocks.get(block_hash)?;
        block
            .receipts
            .iter()
            .find(|receipt| receipt.transaction_hash == *tx_hash)
            .cloned()
    }
}
