//! Bit-exact wire helpers: the LEB128 varint used for length prefixes and
//! the bridge withdrawal format.

use crate::primitives::{blake3_hash, Address, Hash256, U256};

pub const WITHDRAWAL_VERSION: u8 = 0x02;
/// version + chain_id + contract + nonce + recipient + amount + state_root.
pub const WITHDRAWAL_ENCODED_LEN: usize = 1 + 4 + 20 + 8 + 20 + 32 + 32;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("varint is truncated")]
    TruncatedVarint,
    #[error("varint does not fit in 64 bits")]
    VarintOverflow,
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("unsupported version byte {0:#04x}")]
    UnsupportedVersion(u8),
}

/// Appends `value` to `buf` as an unsigned LEB128 varint.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Reads an unsigned LEB128 varint from the front of `bytes`, returning the
/// value and the number of bytes consumed.
pub fn read_varint(bytes: &[u8]) -> Result<(u64, usize), WireError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (index, byte) in bytes.iter().enumerate() {
        let chunk = u64::from(byte & 0x7f);
        if shift >= 64 || (shift == 63 && chunk > 1) {
            return Err(WireError::VarintOverflow);
        }
        value |= chunk << shift;
        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }
        shift += 7;
    }
    Err(WireError::TruncatedVarint)
}

/// Withdrawal recorded by the bridge contract, hashed into the chain state
/// so the counterpart chain can verify it against a state root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Withdrawal {
    pub chain_id: u32,
    pub contract: Address,
    pub nonce: u64,
    pub recipient: Address,
    pub amount: U256,
    pub state_root: Hash256,
}

impl Withdrawal {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(WITHDRAWAL_ENCODED_LEN);
        buf.push(WITHDRAWAL_VERSION);
        buf.extend_from_slice(&self.chain_id.to_le_bytes());
        buf.extend_from_slice(self.contract.as_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(self.recipient.as_bytes());
        buf.extend_from_slice(&self.amount.to_le_bytes::<32>());
        buf.extend_from_slice(self.state_root.as_bytes());
        buf
    }

    /// Strict decode: the buffer must be exactly [`WITHDRAWAL_ENCODED_LEN`]
    /// bytes and carry the current version byte.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() != WITHDRAWAL_ENCODED_LEN {
            return Err(WireError::InvalidLength {
                expected: WITHDRAWAL_ENCODED_LEN,
                actual: bytes.len(),
            });
        }
        if bytes[0] != WITHDRAWAL_VERSION {
            return Err(WireError::UnsupportedVersion(bytes[0]));
        }
        let chain_id = u32::from_le_bytes(bytes[1..5].try_into().expect("fixed width"));
        let contract = Address::from_slice(&bytes[5..25]).expect("fixed width");
        let nonce = u64::from_le_bytes(bytes[25..33].try_into().expect("fixed width"));
        let recipient = Address::from_slice(&bytes[33..53]).expect("fixed width");
        let amount: [u8; 32] = bytes[53..85].try_into().expect("fixed width");
        let amount = U256::from_le_bytes::<32>(amount);
        let state_root = Hash256::from_slice(&bytes[85..117]).expect("fixed width");
        Ok(Self {
            chain_id,
            contract,
            nonce,
            recipient,
            amount,
            state_root,
        })
    }

    pub fn hash(&self) -> Hash256 {
        blake3_hash(&self.encode())
    }
}
