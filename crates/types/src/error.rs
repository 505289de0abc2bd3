//! Stable error kinds exposed on receipts and admission failures, plus the
//! typed errors that carry context internally and map down to those kinds.

use serde::{Deserialize, Serialize};

use crate::primitives::{Address, Hash256, U256};

/// Stable error kind. The variant set is part of the public protocol surface:
/// receipts and admission refusals expose exactly these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ErrorCode {
    #[default]
    #[error("success")]
    Success,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid chain id")]
    InvalidChainId,
    #[error("invalid nonce")]
    InvalidNonce,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("insufficient gas")]
    InsufficientGas,
    #[error("gas limit exceeded")]
    GasLimitExceeded,
    #[error("data too large")]
    DataTooLarge,
    #[error("invalid parent hash")]
    InvalidParentHash,
    #[error("invalid block number")]
    InvalidBlockNumber,
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("invalid state root")]
    InvalidStateRoot,
    #[error("invalid transaction type")]
    InvalidTransactionType,
    #[error("contract not found")]
    ContractNotFound,
    #[error("contract deploy failed")]
    ContractDeployFailed,
    #[error("contract call failed")]
    ContractCallFailed,
    #[error("contract reverted")]
    ContractReverted,
    #[error("out of gas")]
    OutOfGas,
    #[error("cpu time limit exceeded")]
    CpuTimeLimitExceeded,
    #[error("memory limit exceeded")]
    MemoryLimitExceeded,
    #[error("staking not available")]
    StakingNotAvailable,
    #[error("stake below minimum")]
    StakeBelowMinimum,
    #[error("validator not registered")]
    ValidatorNotRegistered,
    #[error("validator already registered")]
    ValidatorAlreadyRegistered,
}

impl ErrorCode {
    pub fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }
}

/// Transaction admission failure. Produced by the validation pipeline shared
/// between the submit path, the mempool and the block builder.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("signature does not verify against the sender public key")]
    InvalidSignature,
    #[error("sender {actual} does not match address {derived} derived from the public key")]
    SenderMismatch { derived: Address, actual: Address },
    #[error("transaction chain id {actual} does not match chain {expected}")]
    ChainIdMismatch { expected: u32, actual: u32 },
    #[error("transaction nonce {actual} does not match next account nonce {expected}")]
    NonceMismatch { expected: u64, actual: u64 },
    #[error("balance {available} cannot cover value plus max fee ({required})")]
    InsufficientBalance { required: U256, available: U256 },
    #[error("value plus max fee overflows")]
    FeeOverflow,
    #[error("gas limit {gas_limit} below intrinsic minimum {minimum}")]
    GasLimitTooLow { gas_limit: u64, minimum: u64 },
    #[error("gas limit {gas_limit} exceeds block gas limit {maximum}")]
    GasLimitTooHigh { gas_limit: u64, maximum: u64 },
    #[error("max priority fee {tip} exceeds max fee {cap}")]
    TipAboveCap { tip: U256, cap: U256 },
    #[error("max fee {cap} below current base fee {base_fee}")]
    FeeBelowBaseFee { cap: U256, base_fee: U256 },
    #[error("gas price {price} below chain minimum {minimum}")]
    GasPriceTooLow { price: U256, minimum: U256 },
    #[error("transaction data is {size} bytes, limit is {limit}")]
    DataTooLarge { size: usize, limit: usize },
}

impl TxError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TxError::InvalidSignature | TxError::SenderMismatch { .. } => {
                ErrorCode::InvalidSignature
            }
            TxError::ChainIdMismatch { .. } => ErrorCode::InvalidChainId,
            TxError::NonceMismatch { .. } => ErrorCode::InvalidNonce,
            TxError::InsufficientBalance { .. } | TxError::FeeOverflow => {
                ErrorCode::InsufficientBalance
            }
            TxError::GasLimitTooLow { .. }
            | TxError::TipAboveCap { .. }
            | TxError::FeeBelowBaseFee { .. }
            | TxError::GasPriceTooLow { .. } => ErrorCode::InsufficientGas,
            TxError::GasLimitTooHigh { .. } => ErrorCode::GasLimitExceeded,
            TxError::DataTooLarge { .. } => ErrorCode::DataTooLarge,
        }
    }
}

/// Chain append failure. Fatal to the proposal that produced the block, never
/// to the node.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("parent hash {actual} does not match chain tip {expected}")]
    ParentHashMismatch { expected: Hash256, actual: Hash256 },
    #[error("block number {actual}, expected {expected}")]
    NumberMismatch { expected: u64, actual: u64 },
    #[error("block timestamp {actual} is not greater than tip timestamp {tip}")]
    NonMonotonicTimestamp { tip: i64, actual: i64 },
    #[error("block chain id {actual} does not match chain {expected}")]
    ChainIdMismatch { expected: u32, actual: u32 },
    #[error("block gas used {gas_used} exceeds gas limit {gas_limit}")]
    GasUsedExceedsLimit { gas_used: u64, gas_limit: u64 },
    #[error("extra data is {size} bytes, limit is {limit}")]
    ExtraDataTooLarge { size: usize, limit: usize },
    #[error("computed state root {computed} disagrees with header {header}")]
    StateRootMismatch { computed: Hash256, header: Hash256 },
}

impl ChainError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ChainError::ParentHashMismatch { .. } => ErrorCode::InvalidParentHash,
            ChainError::NumberMismatch { .. } => ErrorCode::InvalidBlockNumber,
            ChainError::NonMonotonicTimestamp { .. } => ErrorCode::InvalidTimestamp,
            ChainError::ChainIdMismatch { .. } => ErrorCode::InvalidChainId,
            ChainError::GasUsedExceedsLimit { .. } => ErrorCode::GasLimitExceeded,
            ChainError::ExtraDataTooLarge { .. } => ErrorCode::DataTooLarge,
            ChainError::StateRootMismatch { .. } => ErrorCode::InvalidStateRoot,
        }
    }
}
