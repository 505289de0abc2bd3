//! Pay-as-you-go gas accounting: a per-transaction meter with refund
//! tracking, and the cost table for host operations.

use basalt_config::ChainConfig;

/// Intrinsic floor every transaction's gas limit must cover.
pub const TX_BASE_GAS: u64 = 21_000;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("out of gas: needed {needed} more with {used} of {limit} used")]
pub struct OutOfGas {
    pub needed: u64,
    pub used: u64,
    pub limit: u64,
}

/// Meters a single transaction. Refunds accumulate separately and are
/// applied once at the end, capped at half of the gas consumed.
#[derive(Debug, Clone)]
pub struct GasMeter {
    limit: u64,
    used: u64,
    refund: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: 0,
            refund: 0,
        }
    }

    /// Consumes `amount` gas. Fails without mutating when the limit would be
    /// crossed.
    pub fn consume(&mut self, amount: u64) -> Result<(), OutOfGas> {
        let used = self.used.checked_add(amount).ok_or(OutOfGas {
            needed: amount,
            used: self.used,
            limit: self.limit,
        })?;
        if used > self.limit {
            return Err(OutOfGas {
                needed: amount,
                used: self.used,
                limit: self.limit,
            });
        }
        self.used = used;
        Ok(())
    }

    pub fn add_refund(&mut self, amount: u64) {
        self.refund = self.refund.saturating_add(amount);
    }

    pub fn gas_limit(&self) -> u64 {
        self.limit
    }

    pub fn gas_used(&self) -> u64 {
        self.used
    }

    pub fn gas_remaining(&self) -> u64 {
        self.limit - self.used
    }

    pub fn refund(&self) -> u64 {
        self.refund
    }

    /// Gas charged to the sender: consumption minus the refund, which never
    /// exceeds half of what was consumed.
    pub fn effective_gas_used(&self) -> u64 {
        self.used - self.refund.min(self.used / 2)
    }
}

/// Cost table for transaction intrinsics and host operations. Values are
/// chain-parameterizable through [`GasTable::for_chain`].
#[derive(Debug, Clone)]
pub struct GasTable {
    pub tx_base: u64,
    pub transfer: u64,
    pub storage_read: u64,
    pub storage_write: u64,
    pub storage_write_new: u64,
    pub storage_delete: u64,
    pub storage_delete_refund: u64,
    pub hash_base: u64,
    pub hash_word: u64,
    pub ed25519_verify: u64,
    pub context_read: u64,
    pub balance_read: u64,
    pub log_base: u64,
    pub log_topic: u64,
    pub log_data_byte: u64,
    pub call: u64,
    pub calldata_nonzero_byte: u64,
    pub calldata_zero_byte: u64,
}

impl Default for GasTable {
    fn default() -> Self {
        Self {
            tx_base: TX_BASE_GAS,
            transfer: 21_000,
            storage_read: 200,
            storage_write: 5_000,
            storage_write_new: 20_000,
            storage_delete: 5_000,
            storage_delete_refund: 4_800,
            hash_base: 30,
            hash_word: 6,
            ed25519_verify: 3_000,
            context_read: 2,
            balance_read: 400,
            log_base: 375,
            log_topic: 375,
            log_data_byte: 8,
            call: 2_600,
            calldata_nonzero_byte: 16,
            calldata_zero_byte: 4,
        }
    }
}

impl GasTable {
    pub fn for_chain(config: &ChainConfig) -> Self {
        Self {
            transfer: config.transfer_gas_cost,
            ..Self::default()
        }
    }

    /// Intrinsic cost of transaction calldata.
    pub fn calldata_gas(&self, data: &[u8]) -> u64 {
        let zero_bytes = data.iter().filter(|byte| **byte == 0).count() as u64;
        let nonzero_bytes = data.len() as u64 - zero_bytes;
        zero_bytes * self.calldata_zero_byte + nonzero_bytes * self.calldata_nonzero_byte
    }

    /// Cost of hashing `len` bytes: base plus a per-32-byte-word charge. The
    /// length is promoted to u64 before multiplying so large inputs cannot
    /// wrap.
    pub fn hash_gas(&self, len: usize) -> u64 {
        let words = (len as u64).div_ceil(32);
        self.hash_base + self.hash_word * words
    }

    /// Cost of emitting an event with `topics` topics and `data_len` bytes of
    /// payload.
    pub fn log_gas(&self, topics: usize, data_len: usize) -> u64 {
        self.log_base + self.log_topic * topics as u64 + self.log_data_byte * data_len as u64
    }
}
