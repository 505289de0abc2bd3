//! Chain and genesis configuration for a Basalt node.

mod constants;
mod genesis;

pub use constants::*;
pub use genesis::{dev_keypairs, GenesisAccount, GenesisConfig};

use serde::{Deserialize, Serialize};

use basalt_types::U256;

/// Recognized chain parameters. Every field has a sensible dev-node default;
/// production deployments override via configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: u32,
    pub block_gas_limit: u64,
    pub block_time_ms: u32,
    pub max_tx_per_block: u32,
    pub max_tx_data_bytes: u32,
    pub max_extra_data_bytes: u32,
    pub min_gas_price: U256,
    /// Fixed cost of a plain value transfer.
    pub transfer_gas_cost: u64,
    pub initial_base_fee: U256,
    pub min_base_fee: U256,
    /// `gas_target = block_gas_limit / base_fee_target_ratio`.
    pub base_fee_target_ratio: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            block_gas_limit: DEFAULT_BLOCK_GAS_LIMIT,
            block_time_ms: DEFAULT_BLOCK_TIME_MS,
            max_tx_per_block: DEFAULT_MAX_TX_PER_BLOCK,
            max_tx_data_bytes: DEFAULT_MAX_TX_DATA_BYTES,
            max_extra_data_bytes: DEFAULT_MAX_EXTRA_DATA_BYTES,
            min_gas_price: U256::from(DEFAULT_MIN_GAS_PRICE),
            transfer_gas_cost: DEFAULT_TRANSFER_GAS_COST,
            initial_base_fee: U256::from(DEFAULT_INITIAL_BASE_FEE),
            min_base_fee: U256::from(DEFAULT_MIN_BASE_FEE),
            base_fee_target_ratio: DEFAULT_BASE_FEE_TARGET_RATIO,
        }
    }
}

impl ChainConfig {
    /// Gas target the base-fee formula tracks.
    pub fn gas_target(&self) -> u64 {
        self.block_gas_limit / self.base_fee_target_ratio.max(1)
    }

    pub fn with_chain_id(mut self, chain_id: u32) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_block_time_ms(mut self, block_time_ms: u32) -> Self {
        self.block_time_ms = block_time_ms;
        self
    }

    pub fn with_block_gas_limit(mut self, block_gas_limit: u64) -> Self {
        self.block_gas_limit = block_gas_limit;
        self
    }
}
