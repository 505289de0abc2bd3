//! Core domain types shared across the Basalt execution core: primitive
//! identifiers and numerics, Ed25519 key material, accounts, transactions,
//! receipts, blocks and the stable error codes exposed on receipts.

pub mod account;
pub mod block;
pub mod crypto;
pub mod error;
pub mod primitives;
pub mod receipt;
pub mod transaction;
pub mod wire;

pub use account::{Account, AccountType};
pub use block::{Block, BlockHeader, PROTOCOL_VERSION};
pub use crypto::{Keypair, PublicKey, Signature};
pub use error::{ChainError, ErrorCode, TxError};
pub use primitives::{blake3_hash, keccak256, Address, Hash256, U256};
pub use receipt::{Log, Receipt};
pub use transaction::{
    ComplianceProof, Transaction, TransactionBuilder, TransactionParts, TxType,
};
