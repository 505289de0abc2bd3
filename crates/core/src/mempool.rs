//! Transaction pool: admission, fee-ranked ordering, eviction, nonce-aware
//! batching for block production and stale pruning.
//!
//! One mutex guards the pool's ordered set and indices. The comparator in
//! [`PoolKey`] is the only source of truth for ordering. `on added`
//! subscribers are notified after the lock is released so gossip callbacks
//! can never invert lock order with the pool.

use std::collections::{BTreeSet, BinaryHeap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use basalt_types::{Address, Hash256, Transaction, U256};

use crate::state::ReadState;

/// Per-sender cap on pooled transactions.
pub const PER_SENDER_LIMIT: usize = 64;
/// Default total pool capacity.
pub const DEFAULT_POOL_CAPACITY: usize = 4_096;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub capacity: usize,
    pub per_sender_limit: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
            per_sender_limit: PER_SENDER_LIMIT,
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("transaction {0} is already pooled")]
    AlreadyKnown(Hash256),
    #[error("sender {sender} reached the pool limit of {limit} transactions")]
    SenderQuota { sender: Address, limit: usize },
    #[error("pool is full and fee {fee} does not beat the floor {floor}")]
    Underpriced { fee: U256, floor: U256 },
}

/// Total-order key: highest effective max fee first, then highest priority
/// fee, then lowest nonce, hash as the final tie break.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PoolKey {
    fee: U256,
    tip: U256,
    nonce: u64,
    hash: Hash256,
}

impl PoolKey {
    fn of(tx: &Transaction) -> Self {
        Self {
            fee: tx.effective_max_fee(),
            tip: tx.max_priority_fee_per_gas(),
            nonce: tx.nonce(),
            hash: tx.hash(),
        }
    }
}

impl Ord for PoolKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .fee
            .cmp(&self.fee)
            .then_with(|| other.tip.cmp(&self.tip))
            .then_with(|| self.nonce.cmp(&other.nonce))
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for PoolKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct PoolInner {
    /// Iteration order is best-first per [`PoolKey`].
    ordered: BTreeSet<PoolKey>,
    txs: HashMap<Hash256, Arc<Transaction>>,
    /// Per-sender nonce-sorted view used for batching and quota accounting.
    /// Same-nonce entries (admission-time replacements) coexist here.
    by_sender: HashMap<Address, BTreeSet<(u64, Hash256)>>,
}

impl PoolInner {
    fn remove(&mut self, hash: &Hash256) -> Option<Arc<Transaction>> {
        let tx = self.txs.remove(hash)?;
        self.ordered.remove(&PoolKey::of(&tx));
        if let Some(per_sender) = self.by_sender.get_mut(&tx.sender()) {
            per_sender.remove(&(tx.nonce(), *hash));
            if per_sender.is_empty() {
                self.by_sender.remove(&tx.sender());
            }
        }
        Some(tx)
    }
}

/// Shared, thread-safe transaction pool.
#[derive(Clone)]
pub struct Mempool {
    inner: Arc<Mutex<PoolInner>>,
    listeners: Arc<Mutex<Vec<mpsc::UnboundedSender<Arc<Transaction>>>>>,
    config: PoolConfig,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl Mempool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner::default())),
            listeners: Arc::new(Mutex::new(Vec::new())),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().expect("Mempool lock is poisoned")
    }

    /// Admits a transaction. Idempotent by hash; enforces the per-sender
    /// quota and, when full, evicts the lowest-fee entry only for a strictly
    /// better fee. Listeners fire after the lock is dropped.
    pub fn add(&self, tx: Transaction) -> Result<Hash256, PoolError> {
        let tx = Arc::new(tx);
        let hash = tx.hash();
        {
            let mut inner = self.lock();
            if inner.txs.contains_key(&hash) {
                return Err(PoolError::AlreadyKnown(hash));
            }
            let sender_count = inner
                .by_sender
                .get(&tx.sender())
                .map(BTreeSet::len)
                .unwrap_or(0);
            if sender_count >= self.config.per_sender_limit {
                return Err(PoolError::SenderQuota {
                    sender: tx.sender(),
                    limit: self.config.per_sender_limit,
                });
            }
            if inner.txs.len() >= self.config.capacity {
                // The last ordered entry is the least desirable one.
                let floor = inner
                    .ordered
                    .iter()
                    .next_back()
                    .expect("full pool has a last entry")
                    .clone();
                if tx.effective_max_fee() <= floor.fee {
                    return Err(PoolError::Underpriced {
                        fee: tx.effective_max_fee(),
                        floor: floor.fee,
                    });
                }
                let evicted = floor.hash;
                inner.remove(&evicted);
                tracing::debug!(evicted = %evicted, admitted = %hash, "pool full, evicting lowest fee entry");
            }

            inner.ordered.insert(PoolKey::of(&tx));
            inner
                .by_sender
                .entry(tx.sender())
                .or_default()
                .insert((tx.nonce(), hash));
            inner.txs.insert(hash, Arc::clone(&tx));
        }

        self.notify_added(&tx);
        tracing::trace!(hash = %hash, sender = %tx.sender(), nonce = tx.nonce(), "transaction admitted");
        Ok(hash)
    }

    /// Subscribes to admissions. Invoked outside the pool lock.
    pub fn add_tx_listener(&self) -> mpsc::UnboundedReceiver<Arc<Transaction>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .expect("Mempool listeners lock is poisoned")
            .push(sender);
        receiver
    }

    fn notify_added(&self, tx: &Arc<Transaction>) {
        let mut listeners = self
            .listeners
            .lock()
            .expect("Mempool listeners lock is poisoned");
        listeners.retain(|listener| listener.send(Arc::clone(tx)).is_ok());
    }

    /// Selects up to `max_count` executable transactions: per sender, the
    /// longest contiguous nonce run starting at the account's next nonce;
    /// across senders, queue heads interleaved by highest effective max fee.
    pub fn get_pending(&self, max_count: usize, state: &dyn ReadState) -> Vec<Arc<Transaction>> {
        let inner = self.lock();

        let mut queues: Vec<VecDeque<Arc<Transaction>>> = Vec::new();
        for (sender, by_nonce) in &inner.by_sender {
            let mut expected = state
                .account(sender)
                .map(|account| account.nonce)
                .unwrap_or(0);
            let mut queue = VecDeque::new();
            for (nonce, hash) in by_nonce {
                if *nonce < expected {
                    // Stale entry (or a same-nonce duplicate of one already
                    // taken), waiting for prune.
                    continue;
                }
                if *nonce != expected {
                    // Later nonces are not admissible until the gap fills.
                    break;
                }
                queue.push_back(Arc::clone(&inner.txs[hash]));
                expected += 1;
            }
            if !queue.is_empty() {
                queues.push(queue);
            }
        }

        let mut heads: BinaryHeap<QueueHead> = queues
            .iter()
            .enumerate()
            .map(|(index, queue)| QueueHead::of(index, &queue[0]))
            .collect();

        let mut selected = Vec::new();
        while selected.len() < max_count {
            let Some(head) = heads.pop() else {
                break;
            };
            let queue = &mut queues[head.queue];
            let tx = queue.pop_front().expect("head tracks a non-empty queue");
            selected.push(tx);
            if let Some(next) = queue.front() {
                heads.push(QueueHead::of(head.queue, next));
            }
        }
        selected
    }

    /// Drops entries whose nonce is already used on chain or whose fee no
    /// longer meets the market.
    pub fn prune_stale(&self, state: &dyn ReadState, base_fee: U256) {
        let mut inner = self.lock();
        let stale: Vec<Hash256> = inner
            .txs
            .values()
            .filter(|tx| {
                let on_chain_nonce = state
                    .account(&tx.sender())
                    .map(|account| account.nonce)
                    .unwrap_or(0);
                tx.nonce() < on_chain_nonce || tx.effective_max_fee() < base_fee
            })
            .map(|tx| tx.hash())
            .collect();
        if !stale.is_empty() {
            tracing::debug!(count = stale.len(), "pruning stale pool entries");
        }
        for hash in stale {
            inner.remove(&hash);
        }
    }

    /// Bulk removal of transactions confirmed in a block.
    pub fn remove_confirmed<'a>(&self, hashes: impl IntoIterator<Item = &'a Hash256>) {
        let mut inner = self.lock();
        for hash in hashes {
            inner.remove(hash);
        }
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.lock().txs.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.lock().txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().txs.is_empty()
    }
}

/// Max-heap entry over queue heads; ties broken by lowest hash for
/// determinism.
#[derive(PartialEq, Eq)]
struct QueueHead {
    fee: U256,
    hash: Hash256,
    queue: usize,
}

impl QueueHead {
    fn of(queue: usize, tx: &Transaction) -> Self {
        Self {
            fee: tx.effective_max_fee(),
            hash: tx.hash(),
            queue,
        }
    }
}

impl Ord for QueueHead {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fee
            .cmp(&other.fee)
            .then_with(|| other.hash.cmp(&self.hash))
    }
}

impl PartialOrd for QueueHead {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
