//! Account records keyed by [`Address`] in the state database. A missing
//! account is equivalent to [`Account::default`] (zero balance, zero nonce).

use serde::{Deserialize, Serialize};

use crate::primitives::{Hash256, U256};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    #[default]
    ExternallyOwned,
    Contract,
    /// Deployed at genesis at a well-known address; distinguished from user
    /// contracts only by type.
    SystemContract,
}

impl AccountType {
    pub const fn as_byte(&self) -> u8 {
        match self {
            AccountType::ExternallyOwned => 0,
            AccountType::Contract => 1,
            AccountType::SystemContract => 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub nonce: u64,
    pub balance: U256,
    /// Maintained by the state database; opaque to the executor.
    pub storage_root: Hash256,
    /// Zero for externally owned accounts.
    pub code_hash: Hash256,
    pub account_type: AccountType,
    /// Opaque to the core; carried for the compliance layer above.
    pub compliance_hash: Hash256,
}

impl Account {
    pub fn with_balance(balance: U256) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    pub fn is_contract(&self) -> bool {
        matches!(
            self.account_type,
            AccountType::Contract | AccountType::SystemContract
        )
    }
}
