//! Gas-metered host interface: the entire surface a contract uses. Every
//! operation charges the meter before acting; state mutations land in a
//! per-invocation scope that the executor commits only on success.

use std::time::{Duration, Instant};

use basalt_types::{blake3_hash, keccak256, Address, Hash256, Log, PublicKey, Signature, U256};

use crate::gas::{GasMeter, GasTable, OutOfGas};
use crate::runtime::CODE_STORAGE_KEY;
use crate::state::{ScopedState, StateDatabase};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error(transparent)]
    OutOfGas(#[from] OutOfGas),
    #[error("contract reverted: {0}")]
    Reverted(String),
    #[error("storage key {0} is reserved")]
    ReservedKey(Hash256),
    #[error("log cap of {cap} per transaction exceeded")]
    LogLimitExceeded { cap: usize },
    #[error("contract balance {available} cannot cover transfer of {amount}")]
    InsufficientBalance { amount: U256, available: U256 },
    #[error("recipient balance would overflow")]
    BalanceOverflow,
    #[error("code blob of {len} bytes is too short to carry a type tag")]
    MalformedCode { len: usize },
    #[error("no contract type registered under tag {0:#06x}")]
    UnknownContractType(u16),
    #[error("unknown method selector 0x{}", hex::encode(.0))]
    UnknownSelector([u8; 4]),
    #[error("wall-clock budget exhausted")]
    CpuTimeLimit,
    #[error("invocation wrote {written} bytes, limit is {limit}")]
    MemoryLimit { written: usize, limit: usize },
}

/// Sandbox-style bounds on a single contract invocation, enforced by the
/// host on every metered operation.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionLimits {
    /// Emitted-log cap per transaction.
    pub max_logs: usize,
    /// Wall-clock budget; `None` disables the check.
    pub time_budget: Option<Duration>,
    /// Cap on bytes written to storage by one invocation.
    pub storage_write_limit: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_logs: crate::executor::MAX_LOGS_PER_TX,
            time_budget: None,
            storage_write_limit: 1 << 20,
        }
    }
}

/// Execution context visible to the contract.
#[derive(Debug, Clone, Copy)]
pub struct ExecEnv {
    pub caller: Address,
    /// The contract being executed; storage and emitted logs bind to it.
    pub contract: Address,
    pub value: U256,
    pub block_number: u64,
    pub block_timestamp: i64,
    pub chain_id: u32,
}

/// Explicit host context handed to each contract invocation. Owns the write
/// scope; dropping the context discards every contract-level mutation,
/// committing applies them and surrenders the log buffer.
pub struct HostContext<'a> {
    state: ScopedState<'a>,
    gas: &'a mut GasMeter,
    table: &'a GasTable,
    env: ExecEnv,
    logs: Vec<Log>,
    limits: ExecutionLimits,
    started: Instant,
    bytes_written: usize,
}

impl<'a> HostContext<'a> {
    pub fn new(
        state: &'a mut dyn StateDatabase,
        gas: &'a mut GasMeter,
        table: &'a GasTable,
        env: ExecEnv,
        limits: ExecutionLimits,
    ) -> Self {
        Self {
            state: ScopedState::new(state),
            gas,
            table,
            env,
            logs: Vec::new(),
            limits,
            started: Instant::now(),
            bytes_written: 0,
        }
    }

    pub fn env(&self) -> &ExecEnv {
        &self.env
    }

    /// Applies the invocation's writes to the underlying state and returns
    /// the emitted logs.
    pub fn commit(self) -> Vec<Log> {
        self.state.commit();
        self.logs
    }

    /// Charges the meter, first enforcing the wall-clock budget. Every
    /// metered operation funnels through here.
    fn charge(&mut self, amount: u64) -> Result<(), HostError> {
        if let Some(budget) = self.limits.time_budget {
            if self.started.elapsed() > budget {
                return Err(HostError::CpuTimeLimit);
            }
        }
        self.gas.consume(amount)?;
        Ok(())
    }

    // --- storage ---

    pub fn storage_read(&mut self, key: &Hash256) -> Result<Option<Vec<u8>>, HostError> {
        self.charge(self.table.storage_read)?;
        Ok(self.state.storage(&self.env.contract, key))
    }

    pub fn storage_write(&mut self, key: Hash256, value: Vec<u8>) -> Result<(), HostError> {
        if key == CODE_STORAGE_KEY {
            return Err(HostError::ReservedKey(key));
        }
        let occupied = self.state.storage(&self.env.contract, &key).is_some();
        let charge = if occupied {
            self.table.storage_write
        } else {
            self.table.storage_write_new
        };
        self.charge(charge)?;
        self.bytes_written = self.bytes_written.saturating_add(value.len());
        if self.bytes_written > self.limits.storage_write_limit {
            return Err(HostError::MemoryLimit {
                written: self.bytes_written,
                limit: self.limits.storage_write_limit,
            });
        }
        self.state.set_storage(self.env.contract, key, value);
        Ok(())
    }

    pub fn storage_delete(&mut self, key: &Hash256) -> Result<(), HostError> {
        if *key == CODE_STORAGE_KEY {
            return Err(HostError::ReservedKey(*key));
        }
        self.charge(self.table.storage_delete)?;
        if self.state.storage(&self.env.contract, key).is_some() {
            self.gas.add_refund(self.table.storage_delete_refund);
        }
        self.state.delete_storage(&self.env.contract, key);
        Ok(())
    }

    // --- crypto ---

    pub fn blake3(&mut self, data: &[u8]) -> Result<Hash256, HostError> {
        self.charge(self.table.hash_gas(data.len()))?;
        Ok(blake3_hash(data))
    }

    pub fn keccak256(&mut self, data: &[u8]) -> Result<Hash256, HostError> {
        self.charge(self.table.hash_gas(data.len()))?;
        Ok(keccak256(data))
    }

    pub fn ed25519_verify(
        &mut self,
        public_key: &PublicKey,
        message: &[u8],
        signature: &Signature,
    ) -> Result<bool, HostError> {
        self.charge(self.table.ed25519_verify)?;
        Ok(public_key.verify(message, signature))
    }

    // --- context ---

    pub fn caller(&mut self) -> Result<Address, HostError> {
        self.charge(self.table.context_read)?;
        Ok(self.env.caller)
    }

    pub fn value(&mut self) -> Result<U256, HostError> {
        self.charge(self.table.context_read)?;
        Ok(self.env.value)
    }

    pub fn block_timestamp(&mut self) -> Result<i64, HostError> {
        self.charge(self.table.context_read)?;
        Ok(self.env.block_timestamp)
    }

    pub fn block_number(&mut self) -> Result<u64, HostError> {
        self.charge(self.table.context_read)?;
        Ok(self.env.block_number)
    }

    pub fn balance(&mut self, address: &Address) -> Result<U256, HostError> {
        self.charge(self.table.balance_read)?;
        Ok(self
            .state
            .account(address)
            .map(|account| account.balance)
            .unwrap_or(U256::ZERO))
    }

    // --- events ---

    /// Appends to the transaction's log buffer. Fails the execution when the
    /// per-transaction cap would be exceeded.
    pub fn emit(
        &mut self,
        event_signature: Hash256,
        topics: Vec<Hash256>,
        data: Vec<u8>,
    ) -> Result<(), HostError> {
        self.charge(self.table.log_gas(topics.len(), data.len()))?;
        if self.logs.len() >= self.limits.max_logs {
            return Err(HostError::LogLimitExceeded {
                cap: self.limits.max_logs,
            });
        }
        self.logs.push(Log {
            contract: self.env.contract,
            event_signature,
            topics,
            data,
        });
        Ok(())
    }

    // --- control flow ---

    pub fn revert<E>(&self, message: impl Into<String>) -> Result<E, HostError> {
        Err(HostError::Reverted(message.into()))
    }

    pub fn require(&self, condition: bool, message: impl Into<String>) -> Result<(), HostError> {
        if condition {
            Ok(())
        } else {
            Err(HostError::Reverted(message.into()))
        }
    }

    // --- native transfer (SDK bridge) ---

    /// Moves `amount` from the executing contract to `to` with checked
    /// arithmetic on both sides.
    pub fn transfer_native(&mut self, to: Address, amount: U256) -> Result<(), HostError> {
        self.charge(self.table.call)?;

        let mut from_account = self.state.account(&self.env.contract).unwrap_or_default();
        if from_account.balance < amount {
            return Err(HostError::InsufficientBalance {
                amount,
                available: from_account.balance,
            });
        }
        let mut to_account = self.state.account(&to).unwrap_or_default();
        let credited = to_account
            .balance
            .checked_add(amount)
            .ok_or(HostError::BalanceOverflow)?;

        from_account.balance -= amount;
        to_account.balance = credited;
        self.state.set_account(self.env.contract, from_account);
        self.state.set_account(to, to_account);
        Ok(())
    }
}
