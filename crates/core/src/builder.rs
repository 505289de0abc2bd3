//! Deterministic block builder: base-fee update, transaction selection with
//! live revalidation, execution, root computation and header assembly.

use std::sync::Arc;

use basalt_config::ChainConfig;
use basalt_types::{Address, Block, BlockHeader, Hash256, Transaction, PROTOCOL_VERSION};

use crate::executor::{BlockEnv, Executor};
use crate::fee::BaseFeeCalculator;
use crate::merkle::merkle_root;
use crate::state::StateDatabase;
use crate::validator::validate_transaction;

pub struct BlockBuilder {
    config: ChainConfig,
    executor: Executor,
}

impl BlockBuilder {
    pub fn new(config: ChainConfig, executor: Executor) -> Self {
        Self { config, executor }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Builds the next block on top of `parent` by executing `pending`
    /// against `state`. Deterministic given its inputs and `timestamp`.
    ///
    /// Transactions are revalidated against the live state right before
    /// execution; the mempool may have admitted them against a snapshot that
    /// has since moved. Selection stops at the transaction-count cap, and a
    /// transaction whose gas limit no longer fits the block's remaining gas
    /// ends selection for the block.
    pub fn build(
        &self,
        pending: &[Arc<Transaction>],
        state: &mut dyn StateDatabase,
        parent: &Block,
        proposer: Address,
        timestamp: i64,
    ) -> Block {
        let base_fee = BaseFeeCalculator::next_base_fee(&parent.header, &self.config);
        let number = parent.header.number + 1;

        // Receipts carry this hash until the roots are known.
        let preliminary = BlockHeader {
            number,
            parent_hash: parent.hash,
            state_root: Hash256::ZERO,
            transactions_root: Hash256::ZERO,
            receipts_root: Hash256::ZERO,
            timestamp,
            proposer,
            chain_id: self.config.chain_id,
            gas_used: 0,
            gas_limit: self.config.block_gas_limit,
            base_fee,
            protocol_version: PROTOCOL_VERSION,
            extra_data: Vec::new(),
        };
        let env = BlockEnv {
            number,
            timestamp,
            base_fee,
            chain_id: self.config.chain_id,
            gas_limit: self.config.block_gas_limit,
            block_hash: preliminary.hash(),
        };

        let mut transactions: Vec<Transaction> = Vec::new();
        let mut receipts = Vec::new();
        let mut gas_used: u64 = 0;

        for tx in pending {
            if transactions.len() >= self.config.max_tx_per_block as usize {
                break;
            }
            if gas_used.saturating_add(tx.gas_limit()) > self.config.block_gas_limit {
                break;
            }
            // Defense in depth: the pool validated against a snapshot that
            // may be stale by now.
            if let Err(err) = validate_transaction(tx, state, base_fee, &self.config) {
                tracing::debug!(tx = %tx.hash(), %err, "dropping transaction at build time");
                continue;
            }
            let receipt = self
                .executor
                .execute(tx, state, &env, transactions.len() as u32);
            gas_used += receipt.gas_used;
            receipts.push(receipt);
            transactions.push((**tx).clone());
        }

        let transactions_root = merkle_root(
            &transactions
                .iter()
                .map(|tx| tx.hash())
                .collect::<Vec<Hash256>>(),
        );
        let receipts_root = merkle_root(
            &receipts
                .iter()
                .map(|receipt| receipt.receipt_hash())
                .collect::<Vec<Hash256>>(),
        );
        let state_root = state.compute_state_root();

        let header = BlockHeader {
            state_root,
            transactions_root,
            receipts_root,
            gas_used,
            ..preliminary
        };
        let final_hash = header.hash();
        // The preliminary stamp is replaced now that the header is sealed.
        for receipt in &mut receipts {
            receipt.block_hash = final_hash;
        }

        tracing::debug!(
            number,
            txs = transactions.len(),
            gas_used,
            base_fee = %base_fee,
            "built block"
        );
        Block::new(header, transactions, receipts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_types::{
        Account, ErrorCode, Keypair, TransactionBuilder, TxType, U256,
    };

    use crate::gas::GasTable;
    use crate::runtime::ContractRuntime;
    use crate::state::{InMemoryState, ReadState};

    fn config() -> ChainConfig {
        ChainConfig {
            chain_id: 1,
            min_gas_price: U256::from(1u64),
            min_base_fee: U256::ZERO,
            initial_base_fee: U256::ZERO,
            ..ChainConfig::default()
        }
    }

    fn builder_with(config: ChainConfig) -> BlockBuilder {
        let executor = Executor::new(
            GasTable::for_chain(&config),
            Arc::new(ContractRuntime::new()),
        );
        BlockBuilder::new(config, executor)
    }

    fn builder() -> BlockBuilder {
        builder_with(config())
    }

    fn keypair(seed: u8) -> Keypair {
        Keypair::from_seed([seed; 32])
    }

    fn genesis(state: &InMemoryState) -> Block {
        Block::new(
            BlockHeader {
                number: 0,
                parent_hash: Hash256::ZERO,
                state_root: state.compute_state_root(),
                transactions_root: Hash256::ZERO,
                receipts_root: Hash256::ZERO,
                timestamp: 1_000,
                proposer: Address::ZERO,
                chain_id: 1,
                gas_used: 0,
                gas_limit: 30_000_000,
                base_fee: U256::ZERO,
                protocol_version: PROTOCOL_VERSION,
                extra_data: Vec::new(),
            },
            vec![],
            vec![],
        )
    }

    fn transfer(keypair: &Keypair, nonce: u64, value: u64) -> Arc<Transaction> {
        Arc::new(
            TransactionBuilder::new(TxType::Transfer, 1)
                .to(Address::new([9u8; 20]))
                .nonce(nonce)
                .value(U256::from(value))
                .gas_limit(21_000)
                .legacy_gas_price(U256::from(1u64))
                .sign(keypair),
        )
    }

    #[test]
    fn empty_block_has_zero_roots_and_parent_state() {
        let mut state = InMemoryState::new();
        state.set_account(
            Address::new([1u8; 20]),
            Account::with_balance(U256::from(1u64)),
        );
        let parent = genesis(&state);
        let expected_root = state.compute_state_root();

        let block = builder().build(&[], &mut state, &parent, Address::ZERO, 2_000);

        assert_eq!(block.header.number, 1);
        assert_eq!(block.header.parent_hash, parent.hash);
        assert!(block.transactions.is_empty());
        assert_eq!(block.header.transactions_root, Hash256::ZERO);
        assert_eq!(block.header.receipts_root, Hash256::ZERO);
        assert_eq!(block.header.state_root, expected_root);
        assert_eq!(block.header.gas_used, 0);
    }

    #[test]
    fn single_transfer_block_executes_and_roots() {
        let keypair = keypair(1);
        let mut state = InMemoryState::new();
        state.set_account(
            keypair.address(),
            Account::with_balance(U256::from(1_000_000u64)),
        );
        let parent = genesis(&state);
        let tx = transfer(&keypair, 0, 100);

        let block = builder().build(
            &[Arc::clone(&tx)],
            &mut state,
            &parent,
            Address::ZERO,
            2_000,
        );

        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.receipts.len(), 1);
        // Single leaf passes through unchanged.
        assert_eq!(block.header.transactions_root, tx.hash());
        assert_eq!(block.header.receipts_root, block.receipts[0].receipt_hash());
        assert_eq!(block.header.gas_used, 21_000);
        assert_eq!(block.header.state_root, state.compute_state_root());
        assert_eq!(
            state.account(&Address::new([9u8; 20])).unwrap().balance,
            U256::from(100u64)
        );
    }

    #[test]
    fn receipts_are_stamped_with_final_block_hash() {
        let keypair = keypair(1);
        let mut state = InMemoryState::new();
        state.set_account(
            keypair.address(),
            Account::with_balance(U256::from(1_000_000u64)),
        );
        let parent = genesis(&state);

        let block = builder().build(
            &[transfer(&keypair, 0, 100)],
            &mut state,
            &parent,
            Address::ZERO,
            2_000,
        );

        for receipt in &block.receipts {
            assert_eq!(receipt.block_hash, block.hash);
        }
        assert_eq!(block.hash, block.header.hash());
    }

    #[test]
    fn invalid_transactions_are_dropped_at_build_time() {
        let keypair = keypair(1);
        let mut state = InMemoryState::new();
        state.set_account(
            keypair.address(),
            Account::with_balance(U256::from(1_000_000u64)),
        );
        let parent = genesis(&state);

        // Nonce 5 does not match the account's next nonce.
        let stale = transfer(&keypair, 5, 100);
        let good = transfer(&keypair, 0, 100);

        let block = builder().build(
            &[stale, Arc::clone(&good)],
            &mut state,
            &parent,
            Address::ZERO,
            2_000,
        );

        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].hash(), good.hash());
        assert!(block.receipts[0].success);
        assert_eq!(block.receipts[0].error_code, ErrorCode::Success);
    }

    #[test]
    fn respects_transaction_count_cap() {
        let mut config = config();
        config.max_tx_per_block = 2;
        let keypair = keypair(1);
        let mut state = InMemoryState::new();
        state.set_account(
            keypair.address(),
            Account::with_balance(U256::from(10_000_000u64)),
        );
        let parent = genesis(&state);

        let pending: Vec<Arc<Transaction>> =
            (0..4).map(|nonce| transfer(&keypair, nonce, 1)).collect();
        let block = builder_with(config).build(&pending, &mut state, &parent, Address::ZERO, 2_000);

        assert_eq!(block.transactions.len(), 2);
    }

    #[test]
    fn stops_when_gas_limit_would_be_exceeded() {
        let mut config = config();
        // Room for exactly two transfers' gas limits.
        config.block_gas_limit = 45_000;
        let keypair = keypair(1);
        let mut state = InMemoryState::new();
        state.set_account(
            keypair.address(),
            Account::with_balance(U256::from(10_000_000u64)),
        );
        let parent = genesis(&state);

        let pending: Vec<Arc<Transaction>> =
            (0..3).map(|nonce| transfer(&keypair, nonce, 1)).collect();
        let block = builder_with(config).build(&pending, &mut state, &parent, Address::ZERO, 2_000);

        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.header.gas_used, 42_000);
    }

    #[test]
    fn transaction_indices_follow_selection_order() {
        let a = keypair(1);
        let b = keypair(2);
        let mut state = InMemoryState::new();
        for kp in [&a, &b] {
            state.set_account(
                kp.address(),
                Account::with_balance(U256::from(1_000_000u64)),
            );
        }
        let parent = genesis(&state);

        let block = builder().build(
            &[transfer(&a, 0, 1), transfer(&b, 0, 1)],
            &mut state,
            &parent,
            Address::ZERO,
            2_000,
        );

        assert_eq!(block.receipts[0].transaction_index, 0);
        assert_eq!(block.receipts[1].transaction_index, 1);
        assert_eq!(
            block.receipts[0].transaction_hash,
            block.transactions[0].hash()
        );
    }
}
