//! Block headers and blocks. The header serializes to a fixed little-endian
//! layout (§ wire format) and hashes with BLAKE3; a block caches its header
//! hash at construction time.

use crate::primitives::{blake3_hash, Address, Hash256, U256};
use crate::receipt::Receipt;
use crate::transaction::Transaction;
use crate::wire::write_varint;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub parent_hash: Hash256,
    pub state_root: Hash256,
    pub transactions_root: Hash256,
    pub receipts_root: Hash256,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub proposer: Address,
    pub chain_id: u32,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub base_fee: U256,
    pub protocol_version: u32,
    /// Length-bounded by chain configuration.
    pub extra_data: Vec<u8>,
}

impl BlockHeader {
    /// Canonical serialization: number ‖ parent ‖ state_root ‖ txs_root ‖
    /// receipts_root ‖ timestamp ‖ proposer ‖ chain_id ‖ gas_used ‖
    /// gas_limit ‖ base_fee ‖ protocol_version ‖ varint(|extra|) ‖ extra.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(208 + self.extra_data.len());
        buf.extend_from_slice(&self.number.to_le_bytes());
        buf.extend_from_slice(self.parent_hash.as_bytes());
        buf.extend_from_slice(self.state_root.as_bytes());
        buf.extend_from_slice(self.transactions_root.as_bytes());
        buf.extend_from_slice(self.receipts_root.as_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(self.proposer.as_bytes());
        buf.extend_from_slice(&self.chain_id.to_le_bytes());
        buf.extend_from_slice(&self.gas_used.to_le_bytes());
        buf.extend_from_slice(&self.gas_limit.to_le_bytes());
        buf.extend_from_slice(&self.base_fee.to_le_bytes::<32>());
        buf.extend_from_slice(&self.protocol_version.to_le_bytes());
        write_varint(&mut buf, self.extra_data.len() as u64);
        buf.extend_from_slice(&self.extra_data);
        buf
    }

    pub fn hash(&self) -> Hash256 {
        blake3_hash(&self.encode())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    /// Cached `header.hash()`, computed once at construction.
    pub hash: Hash256,
    pub transactions: Vec<Transaction>,
    pub receipts: Vec<Receipt>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>, receipts: Vec<Receipt>) -> Self {
        let hash = header.hash();
        Self {
            header,
            hash,
            transactions,
            receipts,
        }
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn is_genesis(&self) -> bool {
        self.header.number == 0
    }
}
