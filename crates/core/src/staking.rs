//! Optional staking collaborator. The executor delegates the staking
//! transaction types here; a node without a staking module configured
//! answers them with `StakingNotAvailable` receipts.

use std::collections::HashMap;
use std::sync::Mutex;

use basalt_types::{Address, ErrorCode, U256};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum StakingError {
    #[error("stake {stake} below minimum {minimum}")]
    BelowMinimum { stake: U256, minimum: U256 },
    #[error("validator {0} is not registered")]
    NotRegistered(Address),
    #[error("validator {0} is already registered")]
    AlreadyRegistered(Address),
    #[error("unstake amount {amount} exceeds self stake {stake}")]
    ExceedsStake { amount: U256, stake: U256 },
}

impl StakingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StakingError::BelowMinimum { .. } => ErrorCode::StakeBelowMinimum,
            StakingError::NotRegistered(_) => ErrorCode::ValidatorNotRegistered,
            StakingError::AlreadyRegistered(_) => ErrorCode::ValidatorAlreadyRegistered,
            StakingError::ExceedsStake { .. } => ErrorCode::InsufficientBalance,
        }
    }
}

/// State interface of the staking module. Purely a ledger; concurrency is
/// whatever the implementation needs internally.
pub trait StakingState: Send + Sync {
    fn min_validator_stake(&self) -> U256;

    fn register_validator(
        &self,
        validator: Address,
        stake: U256,
        block_number: u64,
        endpoint: Option<String>,
    ) -> Result<(), StakingError>;

    fn get_self_stake(&self, validator: &Address) -> Option<U256>;

    /// Moves `amount` out of the validator's active stake into the
    /// non-refundable unbonding queue.
    fn initiate_unstake(
        &self,
        validator: Address,
        amount: U256,
        block_number: u64,
    ) -> Result<(), StakingError>;

    fn add_stake(&self, validator: Address, amount: U256) -> Result<(), StakingError>;
}

#[derive(Debug, Clone)]
struct ValidatorEntry {
    stake: U256,
    endpoint: Option<String>,
    registered_at: u64,
}

#[derive(Debug, Clone)]
pub struct UnbondingEntry {
    pub validator: Address,
    pub amount: U256,
    pub initiated_at: u64,
}

#[derive(Debug, Default)]
struct StakingLedger {
    validators: HashMap<Address, ValidatorEntry>,
    unbonding: Vec<UnbondingEntry>,
}

/// Reference in-memory staking ledger used by tests and the dev node.
#[derive(Debug)]
pub struct InMemoryStaking {
    min_stake: U256,
    ledger: Mutex<StakingLedger>,
}

impl InMemoryStaking {
    pub fn new(min_stake: U256) -> Self {
        Self {
            min_stake,
            ledger: Mutex::new(StakingLedger::default()),
        }
    }

    pub fn unbonding_queue(&self) -> Vec<UnbondingEntry> {
        self.ledger
            .lock()
            .expect("InMemoryStaking lock is poisoned")
            .unbonding
            .clone()
    }

    /// Stake, endpoint and registration block of a validator, if registered.
    pub fn validator_info(&self, validator: &Address) -> Option<(U256, Option<String>, u64)> {
        self.lock()
            .validators
            .get(validator)
            .map(|entry| (entry.stake, entry.endpoint.clone(), entry.registered_at))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StakingLedger> {
        self.ledger.lock().expect("InMemoryStaking lock is poisoned")
    }
}

impl StakingState for InMemoryStaking {
    fn min_validator_stake(&self) -> U256 {
        self.min_stake
    }

    fn register_validator(
        &self,
        validator: Address,
        stake: U256,
        block_number: u64,
        endpoint: Option<String>,
    ) -> Result<(), StakingError> {
        if stake < self.min_stake {
            return Err(StakingError::BelowMinimum {
                stake,
                minimum: self.min_stake,
            });
        }
        let mut ledger = self.lock();
        if ledger.validators.contains_key(&validator) {
            return Err(StakingError::AlreadyRegistered(validator));
        }
        ledger.validators.insert(
            validator,
            ValidatorEntry {
                stake,
                endpoint,
                registered_at: block_number,
            },
        );
        Ok(())
    }

    fn get_self_stake(&self, validator: &Address) -> Option<U256> {
        self.lock().validators.get(validator).map(|entry| entry.stake)
    }

    fn initiate_unstake(
        &self,
        validator: Address,
        amount: U256,
        block_number: u64,
    ) -> Result<(), StakingError> {
        let mut ledger = self.lock();
        let entry = ledger
            .validators
            .get_mut(&validator)
            .ok_or(StakingError::NotRegistered(validator))?;
        if amount > entry.stake {
            return Err(StakingError::ExceedsStake {
                amount,
                stake: entry.stake,
            });
        }
        entry.stake -= amount;
        ledger.unbonding.push(UnbondingEntry {
            validator,
            amount,
            initiated_at: block_number,
        });
        Ok(())
    }

    fn add_stake(&self, validator: Address, amount: U256) -> Result<(), StakingError> {
        let mut ledger = self.lock();
        let entry = ledger
            .validators
            .get_mut(&validator)
            .ok_or(StakingError::NotRegistered(validator))?;
        entry.stake = entry.stake.saturating_add(amount);
        Ok(())
    }
}
