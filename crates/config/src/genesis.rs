//! Genesis description: the accounts and metadata baked into block 0.

use serde::{Deserialize, Serialize};

use basalt_types::{blake3_hash, AccountType, Address, Keypair, U256};

use crate::constants::{DEFAULT_DEV_ACCOUNT_BALANCE, DEFAULT_DEV_ACCOUNT_COUNT};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    pub balance: U256,
    #[serde(default)]
    pub account_type: AccountType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Unix milliseconds stamped on block 0.
    pub timestamp_ms: i64,
    pub accounts: Vec<GenesisAccount>,
    pub extra_data: Vec<u8>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            timestamp_ms: 0,
            accounts: Vec::new(),
            extra_data: Vec::new(),
        }
    }
}

impl GenesisConfig {
    /// Genesis with `count` deterministically seeded, pre-funded dev
    /// accounts. Returns the config together with the matching keypairs so
    /// callers can print or use them.
    pub fn dev(timestamp_ms: i64, count: u32) -> (Self, Vec<Keypair>) {
        let keypairs = dev_keypairs(count);
        let accounts = keypairs
            .iter()
            .map(|keypair| GenesisAccount {
                address: keypair.address(),
                balance: U256::from(DEFAULT_DEV_ACCOUNT_BALANCE),
                account_type: AccountType::ExternallyOwned,
            })
            .collect();
        (
            Self {
                timestamp_ms,
                accounts,
                extra_data: Vec::new(),
            },
            keypairs,
        )
    }

    pub fn with_account(mut self, address: Address, balance: U256) -> Self {
        self.accounts.push(GenesisAccount {
            address,
            balance,
            account_type: AccountType::ExternallyOwned,
        });
        self
    }
}

/// Deterministic dev keypairs: seed `i` is BLAKE3("basalt dev account {i}").
pub fn dev_keypairs(count: u32) -> Vec<Keypair> {
    (0..count.max(1).min(DEFAULT_DEV_ACCOUNT_COUNT * 16))
        .map(|index| {
            let seed = blake3_hash(format!("basalt dev account {index}").as_bytes());
            Keypair::from_seed(*seed.as_bytes())
        })
        .collect()
}
