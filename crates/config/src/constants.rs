//! Default chain parameters for a local dev node.

pub const DEFAULT_CHAIN_ID: u32 = 31_337;
pub const DEFAULT_BLOCK_GAS_LIMIT: u64 = 30_000_000;
pub const DEFAULT_BLOCK_TIME_MS: u32 = 1_000;
pub const DEFAULT_MAX_TX_PER_BLOCK: u32 = 1_000;
pub const DEFAULT_MAX_TX_DATA_BYTES: u32 = 128 * 1024;
pub const DEFAULT_MAX_EXTRA_DATA_BYTES: u32 = 32;
pub const DEFAULT_MIN_GAS_PRICE: u64 = 1;
pub const DEFAULT_TRANSFER_GAS_COST: u64 = 21_000;
pub const DEFAULT_INITIAL_BASE_FEE: u64 = 1_000_000;
pub const DEFAULT_MIN_BASE_FEE: u64 = 7;
pub const DEFAULT_BASE_FEE_TARGET_RATIO: u64 = 2;

/// Funding given to each generated dev account, in base units.
pub const DEFAULT_DEV_ACCOUNT_BALANCE: u128 = 1_000_000_000_000_000_000_000;
/// Number of pre-funded accounts a dev node starts with.
pub const DEFAULT_DEV_ACCOUNT_COUNT: u32 = 8;
