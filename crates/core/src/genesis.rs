//! Genesis construction: the initial state and block 0.

use basalt_config::{ChainConfig, GenesisConfig};
use basalt_types::{Account, Block, BlockHeader, Hash256, PROTOCOL_VERSION};

use crate::state::{InMemoryState, StateDatabase};

/// Builds the genesis state and block from configuration. Funded accounts
/// and system contracts land in state before the root is computed; block 0
/// has zero transaction and receipt roots and the configured initial base
/// fee.
pub fn build_genesis(chain: &ChainConfig, genesis: &GenesisConfig) -> (InMemoryState, Block) {
    let mut state = InMemoryState::new();
    for account in &genesis.accounts {
        state.set_account(
            account.address,
            Account {
                nonce: 0,
                balance: account.balance,
                storage_root: Hash256::ZERO,
                code_hash: Hash256::ZERO,
                account_type: account.account_type,
                compliance_hash: Hash256::ZERO,
            },
        );
    }

    let header = BlockHeader {
        number: 0,
        parent_hash: Hash256::ZERO,
        state_root: state.compute_state_root(),
        transactions_root: Hash256::ZERO,
        receipts_root: Hash256::ZERO,
        timestamp: genesis.timestamp_ms,
        proposer: basalt_types::Address::ZERO,
        chain_id: chain.chain_id,
        gas_used: 0,
        gas_limit: chain.block_gas_limit,
        base_fee: chain.initial_base_fee,
        protocol_version: PROTOCOL_VERSION,
        extra_data: genesis.extra_data.clone(),
    };
    let block = Block::new(header, vec![], vec![]);

    tracing::info!(
        hash = %block.hash,
        accounts = genesis.accounts.len(),
        chain_id = chain.chain_id,
        "built genesis block"
    );
    (state, block)
}

/// Genesis with no funded accounts, mainly for tests.
pub fn empty_genesis(chain: &ChainConfig) -> (InMemoryState, Block) {
    build_genesis(chain, &GenesisConfig::default())
}
