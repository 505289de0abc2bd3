//! Admission pipeline shared by the submit path, the mempool and the block
//! builder: seven ordered checks, first failure wins.

use basalt_config::ChainConfig;
use basalt_types::{Transaction, TxError, U256};

use crate::gas::TX_BASE_GAS;
use crate::state::ReadState;

/// Validates `tx` against a read-only state snapshot and the base fee the
/// transaction would execute under. Pure for fixed inputs; reads each piece
/// of state exactly once.
pub fn validate_transaction(
    tx: &Transaction,
    state: &dyn ReadState,
    base_fee: U256,
    config: &ChainConfig,
) -> Result<(), TxError> {
    // 1. The signature must verify against the carried public key.
    if !tx.verify_signature() {
        return Err(TxError::InvalidSignature);
    }

    // 2. The sender must be the address bound to that key.
    let derived = tx.sender_public_key().derive_address();
    if derived != tx.sender() {
        return Err(TxError::SenderMismatch {
            derived,
            actual: tx.sender(),
        });
    }

    // 3. Replay protection across chains.
    if tx.chain_id() != config.chain_id {
        return Err(TxError::ChainIdMismatch {
            expected: config.chain_id,
            actual: tx.chain_id(),
        });
    }

    // 4. Nonce must be exactly the account's next. Missing account ⇒ 0.
    let account = state.account(&tx.sender()).unwrap_or_default();
    if tx.nonce() != account.nonce {
        return Err(TxError::NonceMismatch {
            expected: account.nonce,
            actual: tx.nonce(),
        });
    }

    // 5. Balance must cover value plus the worst-case fee, in checked math.
    let max_fee = tx
        .effective_max_fee()
        .checked_mul(U256::from(tx.gas_limit()))
        .ok_or(TxError::FeeOverflow)?;
    let required = tx.value().checked_add(max_fee).ok_or(TxError::FeeOverflow)?;
    if account.balance < required {
        return Err(TxError::InsufficientBalance {
            required,
            available: account.balance,
        });
    }

    // 6. Gas-limit band and fee sanity.
    if tx.gas_limit() < TX_BASE_GAS {
        return Err(TxError::GasLimitTooLow {
            gas_limit: tx.gas_limit(),
            minimum: TX_BASE_GAS,
        });
    }
    if tx.gas_limit() > config.block_gas_limit {
        return Err(TxError::GasLimitTooHigh {
            gas_limit: tx.gas_limit(),
            maximum: config.block_gas_limit,
        });
    }
    if tx.is_eip1559() {
        if tx.max_priority_fee_per_gas() > tx.max_fee_per_gas() {
            return Err(TxError::TipAboveCap {
                tip: tx.max_priority_fee_per_gas(),
                cap: tx.max_fee_per_gas(),
            });
        }
        if base_fee > U256::ZERO && tx.max_fee_per_gas() < base_fee {
            return Err(TxError::FeeBelowBaseFee {
                cap: tx.max_fee_per_gas(),
                base_fee,
            });
        }
    } else {
        if tx.legacy_gas_price() < config.min_gas_price {
            return Err(TxError::GasPriceTooLow {
                price: tx.legacy_gas_price(),
                minimum: config.min_gas_price,
            });
        }
        if base_fee > U256::ZERO && tx.legacy_gas_price() < base_fee {
            return Err(TxError::FeeBelowBaseFee {
                cap: tx.legacy_gas_price(),
                base_fee,
            });
        }
    }

    // 7. Data size bound.
    if tx.data().len() > config.max_tx_data_bytes as usize {
        return Err(TxError::DataTooLarge {
            size: tx.data().len(),
            limit: config.max_tx_data_bytes as usize,
        });
    }

    Ok(())
}
