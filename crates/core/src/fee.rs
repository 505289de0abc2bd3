//! EIP-1559 style base-fee update: track a gas target, nudge the fee by at
//! most 1/8 per block, never drop below the configured floor.

use basalt_config::ChainConfig;
use basalt_types::{BlockHeader, U256};

/// Per-block change is bounded by `base_fee / BASE_FEE_CHANGE_DENOMINATOR`.
pub const BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;

pub struct BaseFeeCalculator;

impl BaseFeeCalculator {
    /// Base fee for the block following `parent`. Unchanged at target,
    /// raised by ⌈base · Δ / target / 8⌉ above it, lowered symmetrically
    /// below it, clamped at `min_base_fee`.
    pub fn next_base_fee(parent: &BlockHeader, config: &ChainConfig) -> U256 {
        let target = parent.gas_limit / config.base_fee_target_ratio.max(1);
        if target == 0 {
            return parent.base_fee.max(config.min_base_fee);
        }

        let base_fee = parent.base_fee;
        let next = if parent.gas_used > target {
            let delta = Self::change(base_fee, parent.gas_used - target, target);
            base_fee.saturating_add(delta)
        } else if parent.gas_used < target {
            let delta = Self::change(base_fee, target - parent.gas_used, target);
            base_fee.saturating_sub(delta)
        } else {
            base_fee
        };
        next.max(config.min_base_fee)
    }

    /// ⌈base_fee · diff / target / 8⌉ in full 256-bit precision.
    fn change(base_fee: U256, diff: u64, target: u64) -> U256 {
        let numerator = base_fee.saturating_mul(U256::from(diff));
        let denominator = U256::from(target).saturating_mul(U256::from(BASE_FEE_CHANGE_DENOMINATOR));
        let quotient = numerator / denominator;
        if numerator % denominator == U256::ZERO {
            quotient
        } else {
            quotient + U256::from(1u64)
        }
    }
}
