//! Timer-driven block production: on every tick the canonical state is
//! forked, pending transactions are drained from the pool and the built
//! block is appended. A failed append discards the fork; the canonical
//! state never sees a failed proposal.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use basalt_types::{Address, Block};

use crate::blockchain::Blockchain;
use crate::builder::BlockBuilder;
use crate::mempool::Mempool;
use crate::state::InMemoryState;

type BlockListeners = Arc<Mutex<Vec<mpsc::UnboundedSender<Arc<Block>>>>>;

pub struct BlockProducer {
    chain: Blockchain,
    mempool: Mempool,
    state: Arc<RwLock<InMemoryState>>,
    builder: BlockBuilder,
    proposer: Address,
    block_time: Duration,
    listeners: BlockListeners,
}

impl BlockProducer {
    pub fn new(
        chain: Blockchain,
        mempool: Mempool,
        state: Arc<RwLock<InMemoryState>>,
        builder: BlockBuilder,
        proposer: Address,
        block_time: Duration,
    ) -> Self {
        Self {
            chain,
            mempool,
            state,
            builder,
            proposer,
            block_time,
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribes to produced blocks. Fired outside any lock.
    pub fn add_block_listener(&self) -> mpsc::UnboundedReceiver<Arc<Block>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .expect("BlockProducer listeners lock is poisoned")
            .push(sender);
        receiver
    }

    /// Spawns the production task. The returned handle stops it
    /// cooperatively.
    pub fn spawn(self) -> ProducerHandle {
        let (stop_sender, stop_receiver) = oneshot::channel();
        let join = tokio::spawn(self.run(stop_receiver));
        ProducerHandle {
            stop: Some(stop_sender),
            join,
        }
    }

    async fn run(self, mut stop: oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval(self.block_time);
        // Avoid burst catch-up after a long tick.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            block_time_ms = self.block_time.as_millis() as u64,
            proposer = %self.proposer,
            "block production started"
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.produce_block() {
                        tracing::error!(%err, "failed to produce block; proposal discarded");
                    }
                }
                _ = &mut stop => {
                    tracing::info!("block production stopping");
                    return;
                }
            }
        }
    }

    /// One production round: fork, drain, build, append, commit-or-discard.
    /// Public so tests and manual-mine tooling can drive it without the
    /// timer.
    pub fn produce_block(&self) -> anyhow::Result<Option<Arc<Block>>> {
        let Some(parent) = self.chain.latest() else {
            tracing::warn!("no genesis block yet; skipping production tick");
            return Ok(None);
        };

        // Speculative execution happens on a fork; readers keep seeing the
        // canonical state.
        let canonical = self
            .state
            .read()
            .expect("state lock is poisoned")
            .clone();
        let mut proposal_state = canonical.fork();

        let pending = self.mempool.get_pending(
            self.builder.config().max_tx_per_block as usize,
            &proposal_state,
        );
        // Fast ticks must still satisfy the strictly-increasing timestamp
        // rule.
        let timestamp = chrono::Utc::now()
            .timestamp_millis()
            .max(parent.header.timestamp + 1);

        let block = self.builder.build(
            &pending,
            &mut proposal_state,
            &parent,
            self.proposer,
            timestamp,
        );
        let state_root = block.header.state_root;

        match self.chain.add_block(block, Some(state_root)) {
            Ok(block) => {
                {
                    let mut canonical = self.state.write().expect("state lock is poisoned");
                    canonical.commit_fork(proposal_state);
                }
                let confirmed: Vec<_> =
                    block.transactions.iter().map(|tx| tx.hash()).collect();
                self.mempool.remove_confirmed(confirmed.iter());
                {
                    let canonical = self.state.read().expect("state lock is poisoned");
                    self.mempool.prune_stale(&*canonical, block.header.base_fee);
                }
                self.notify_produced(&block);
                Ok(Some(block))
            }
            Err(err) => {
                // The fork is dropped here; nothing of the proposal leaks.
                drop(proposal_state);
                Err(err.into())
            }
        }
    }

    fn notify_produced(&self, block: &Arc<Block>) {
        let mut listeners = self
            .listeners
            .lock()
            .expect("BlockProducer listeners lock is poisoned");
        listeners.retain(|listener| listener.send(Arc::clone(block)).is_ok());
    }
}

/// Handle over a spawned producer task.
pub struct ProducerHandle {
    stop: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl ProducerHandle {
    /// Signals the task to stop and awaits its exit.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(err) = (&mut self.join).await {
            tracing::error!(%err, "block production task panicked");
        }
    }
}
