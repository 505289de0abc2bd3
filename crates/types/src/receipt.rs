//! Execution receipts: the authoritative record of a transaction's effect on
//! state. Receipts are the only artifact the executor produces; no error
//! escapes it.

use crate::error::ErrorCode;
use crate::primitives::{blake3_hash, Address, Hash256, U256};

/// Event emitted by a contract during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub contract: Address,
    pub event_signature: Hash256,
    pub topics: Vec<Hash256>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: Hash256,
    /// Stamped with the preliminary header hash during building; rewritten to
    /// the final hash once roots are known.
    pub block_hash: Hash256,
    pub block_number: u64,
    pub transaction_index: u32,
    pub from: Address,
    pub to: Address,
    /// Effective gas, after the refund was applied.
    pub gas_used: u64,
    pub success: bool,
    pub error_code: ErrorCode,
    /// State root computed after any mutation this transaction performed.
    pub post_state_root: Hash256,
    pub effective_gas_price: U256,
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Incremental BLAKE3 over `contract ‖ event_signature ‖ data` of each
    /// log in order; zero when there are none.
    pub fn logs_hash(&self) -> Hash256 {
        if self.logs.is_empty() {
            return Hash256::ZERO;
        }
        let mut hasher = blake3::Hasher::new();
        for log in &self.logs {
            hasher.update(log.contract.as_bytes());
            hasher.update(log.event_signature.as_bytes());
            hasher.update(&log.data);
        }
        Hash256::new(*hasher.finalize().as_bytes())
    }

    /// Leaf digest used for the receipts merkle root:
    /// BLAKE3(success ‖ gas_used LE ‖ tx_hash ‖ logs_hash).
    pub fn receipt_hash(&self) -> Hash256 {
        let mut buf = Vec::with_capacity(1 + 8 + 32 + 32);
        buf.push(self.success as u8);
        buf.extend_from_slice(&self.gas_used.to_le_bytes());
        buf.extend_from_slice(self.transaction_hash.as_bytes());
        buf.extend_from_slice(self.logs_hash().as_bytes());
        blake3_hash(&buf)
    }
}
