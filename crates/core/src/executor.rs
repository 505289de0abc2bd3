//! Deterministic transaction executor. Dispatches on the transaction type,
//! mutates state through checked arithmetic and always produces a receipt;
//! no error escapes [`Executor::execute`].
//!
//! Failure discipline:
//! - pre-entry failures (intrinsic gas, missing contract, balance below the
//!   up-front debit) leave state untouched and do not bump the nonce;
//! - mid-execution failures roll back the transaction's mutations but keep
//!   the gas charge and the nonce bump;
//! - contract-level writes run inside a [`HostContext`] scope that commits
//!   only on success.

use std::sync::Arc;

use basalt_types::{
    blake3_hash, Account, AccountType, Address, ErrorCode, Hash256, Log, Receipt, Transaction,
    TxType, U256,
};

use crate::gas::{GasMeter, GasTable};
use crate::runtime::host::{ExecEnv, ExecutionLimits, HostContext, HostError};
use crate::runtime::{ContractRuntime, CODE_STORAGE_KEY};
use crate::staking::StakingState;
use crate::state::StateDatabase;

/// Per-transaction cap on emitted logs.
pub const MAX_LOGS_PER_TX: usize = 128;

/// Block-level context a transaction executes under. The hash is the
/// preliminary header hash; the builder rewrites receipts to the final one.
#[derive(Debug, Clone)]
pub struct BlockEnv {
    pub number: u64,
    pub timestamp: i64,
    pub base_fee: U256,
    pub chain_id: u32,
    pub gas_limit: u64,
    pub block_hash: Hash256,
}

/// Contract address derived from the deployer and their pre-bump nonce:
/// last 20 bytes of BLAKE3(sender ‖ nonce LE).
pub fn derive_contract_address(sender: &Address, nonce: u64) -> Address {
    let mut buf = [0u8; 28];
    buf[..20].copy_from_slice(sender.as_bytes());
    buf[20..].copy_from_slice(&nonce.to_le_bytes());
    Address::from_hash(&blake3_hash(&buf))
}

pub struct Executor {
    table: GasTable,
    runtime: Arc<ContractRuntime>,
    staking: Option<Arc<dyn StakingState>>,
    limits: ExecutionLimits,
}

impl Executor {
    pub fn new(table: GasTable, runtime: Arc<ContractRuntime>) -> Self {
        Self {
            table,
            runtime,
            staking: None,
            limits: ExecutionLimits::default(),
        }
    }

    pub fn with_staking(mut self, staking: Arc<dyn StakingState>) -> Self {
        self.staking = Some(staking);
        self
    }

    /// Overrides the per-invocation sandbox limits.
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Executes `tx` against `state`, returning the receipt. Every mutation
    /// this transaction performed is reflected in the receipt's
    /// `post_state_root`.
    pub fn execute(
        &self,
        tx: &Transaction,
        state: &mut dyn StateDatabase,
        env: &BlockEnv,
        tx_index: u32,
    ) -> Receipt {
        let outcome = match tx.tx_type() {
            TxType::Transfer => self.execute_transfer(tx, state, env),
            TxType::ContractDeploy => self.execute_deploy(tx, state, env),
            TxType::ContractCall => self.execute_call(tx, state, env),
            TxType::StakeDeposit
            | TxType::StakeWithdraw
            | TxType::ValidatorRegister
            | TxType::ValidatorExit => self.execute_staking(tx, state, env),
        };

        if !outcome.code.is_success() {
            tracing::debug!(
                tx = %tx.hash(),
                code = %outcome.code,
                gas_used = outcome.gas_used,
                "transaction failed"
            );
        }

        Receipt {
            transaction_hash: tx.hash(),
            block_hash: env.block_hash,
            block_number: env.number,
            transaction_index: tx_index,
            from: tx.sender(),
            to: outcome.to,
            gas_used: outcome.gas_used,
            success: outcome.code.is_success(),
            error_code: outcome.code,
            post_state_root: state.compute_state_root(),
            effective_gas_price: tx.effective_gas_price(env.base_fee),
            logs: outcome.logs,
        }
    }

    fn execute_transfer(
        &self,
        tx: &Transaction,
        state: &mut dyn StateDatabase,
        env: &BlockEnv,
    ) -> Outcome {
        let gas_price = tx.effective_gas_price(env.base_fee);
        let gas_used = self.table.transfer;

        let Some(fee) = gas_price.checked_mul(U256::from(gas_used)) else {
            return Outcome::rejected(tx.to(), ErrorCode::InsufficientBalance);
        };
        let Some(total) = tx.value().checked_add(fee) else {
            return Outcome::rejected(tx.to(), ErrorCode::InsufficientBalance);
        };
        let mut sender = state.account(&tx.sender()).unwrap_or_default();
        if sender.balance < total {
            return Outcome::rejected(tx.to(), ErrorCode::InsufficientBalance);
        }

        sender.balance -= total;
        sender.nonce += 1;

        if tx.to() == tx.sender() {
            // Self-transfer only burns the fee; re-crediting the debited
            // value cannot overflow.
            sender.balance += tx.value();
            state.set_account(tx.sender(), sender);
        } else {
            let mut recipient = state.account(&tx.to()).unwrap_or_default();
            let Some(credited) = recipient.balance.checked_add(tx.value()) else {
                return Outcome::rejected(tx.to(), ErrorCode::InsufficientBalance);
            };
            recipient.balance = credited;
            state.set_account(tx.sender(), sender);
            state.set_account(tx.to(), recipient);
        }

        Outcome {
            to: tx.to(),
            gas_used,
            code: ErrorCode::Success,
            logs: Vec::new(),
        }
    }

    fn execute_deploy(
        &self,
        tx: &Transaction,
        state: &mut dyn StateDatabase,
        env: &BlockEnv,
    ) -> Outcome {
        let contract_address = derive_contract_address(&tx.sender(), tx.nonce());
        let gas_price = tx.effective_gas_price(env.base_fee);

        let mut meter = GasMeter::new(tx.gas_limit());
        let intrinsic = self.table.tx_base + self.table.calldata_gas(tx.data());
        if meter.consume(intrinsic).is_err() {
            return Outcome::rejected(contract_address, ErrorCode::OutOfGas);
        }

        // Worst-case fee is debited up front; the remainder comes back after
        // the meter settles.
        let Some(max_fee) = gas_price.checked_mul(U256::from(tx.gas_limit())) else {
            return Outcome::rejected(contract_address, ErrorCode::InsufficientBalance);
        };
        let Some(upfront) = max_fee.checked_add(tx.value()) else {
            return Outcome::rejected(contract_address, ErrorCode::InsufficientBalance);
        };
        let mut sender = state.account(&tx.sender()).unwrap_or_default();
        if sender.balance < upfront {
            return Outcome::rejected(contract_address, ErrorCode::InsufficientBalance);
        }
        sender.balance -= upfront;
        sender.nonce += 1;
        state.set_account(tx.sender(), sender);

        // The new account carries the endowment; its code blob lives under
        // the reserved key.
        state.set_account(
            contract_address,
            Account {
                nonce: 0,
                balance: tx.value(),
                storage_root: Hash256::ZERO,
                code_hash: blake3_hash(tx.data()),
                account_type: AccountType::Contract,
                compliance_hash: Hash256::ZERO,
            },
        );
        state.set_storage(contract_address, CODE_STORAGE_KEY, tx.data().to_vec());

        let host_env = ExecEnv {
            caller: tx.sender(),
            contract: contract_address,
            value: tx.value(),
            block_number: env.number,
            block_timestamp: env.timestamp,
            chain_id: env.chain_id,
        };
        let mut host = HostContext::new(
            &mut *state,
            &mut meter,
            &self.table,
            host_env,
            self.limits,
        );
        let result = self.runtime.deploy(tx.data(), &[], &mut host);

        let (code, logs, effective_gas) = match result {
            Ok(()) => {
                let logs = host.commit();
                (ErrorCode::Success, logs, meter.effective_gas_used())
            }
            Err(err) => {
                drop(host);
                // Constructor failed: the account never existed as far as the
                // chain is concerned, and the endowment goes back.
                state.delete_storage(&contract_address, &CODE_STORAGE_KEY);
                state.delete_account(&contract_address);
                credit(state, &tx.sender(), tx.value());
                let code = match err {
                    HostError::OutOfGas(_) => ErrorCode::OutOfGas,
                    HostError::CpuTimeLimit => ErrorCode::CpuTimeLimitExceeded,
                    HostError::MemoryLimit { .. } => ErrorCode::MemoryLimitExceeded,
                    _ => ErrorCode::ContractDeployFailed,
                };
                (code, Vec::new(), meter.gas_used())
            }
        };

        settle_gas(state, &tx.sender(), max_fee, gas_price, effective_gas);
        Outcome {
            to: contract_address,
            gas_used: effective_gas,
            code,
            logs,
        }
    }

    fn execute_call(
        &self,
        tx: &Transaction,
        state: &mut dyn StateDatabase,
        env: &BlockEnv,
    ) -> Outcome {
        let gas_price = tx.effective_gas_price(env.base_fee);

        let mut meter = GasMeter::new(tx.gas_limit());
        let intrinsic = self.table.tx_base + self.table.calldata_gas(tx.data());
        if meter.consume(intrinsic).is_err() {
            return Outcome::rejected(tx.to(), ErrorCode::OutOfGas);
        }

        let target_before = match state.account(&tx.to()) {
            Some(account) if account.is_contract() => account,
            _ => return Outcome::rejected(tx.to(), ErrorCode::ContractNotFound),
        };
        let Some(code) = state.storage(&tx.to(), &CODE_STORAGE_KEY) else {
            return Outcome::rejected(tx.to(), ErrorCode::ContractNotFound);
        };

        let Some(max_fee) = gas_price.checked_mul(U256::from(tx.gas_limit())) else {
            return Outcome::rejected(tx.to(), ErrorCode::InsufficientBalance);
        };
        let Some(upfront) = max_fee.checked_add(tx.value()) else {
            return Outcome::rejected(tx.to(), ErrorCode::InsufficientBalance);
        };
        let Some(credited) = target_before.balance.checked_add(tx.value()) else {
            return Outcome::rejected(tx.to(), ErrorCode::InsufficientBalance);
        };
        let mut sender = state.account(&tx.sender()).unwrap_or_default();
        if sender.balance < upfront {
            return Outcome::rejected(tx.to(), ErrorCode::InsufficientBalance);
        }
        sender.balance -= upfront;
        sender.nonce += 1;
        state.set_account(tx.sender(), sender);

        // Credit the call value before entering the contract so it can spend
        // it; a failure restores the pre-call account below.
        let mut target = target_before.clone();
        target.balance = credited;
        state.set_account(tx.to(), target);

        let host_env = ExecEnv {
            caller: tx.sender(),
            contract: tx.to(),
            value: tx.value(),
            block_number: env.number,
            block_timestamp: env.timestamp,
            chain_id: env.chain_id,
        };
        let mut host = HostContext::new(
            &mut *state,
            &mut meter,
            &self.table,
            host_env,
            self.limits,
        );
        let result = self.runtime.execute(&code, tx.data(), &mut host);

        let (code, logs, effective_gas) = match result {
            Ok(_return_data) => {
                let logs = host.commit();
                (ErrorCode::Success, logs, meter.effective_gas_used())
            }
            Err(err) => {
                drop(host);
                // Roll the value move back; contract-level writes died with
                // the host scope.
                state.set_account(tx.to(), target_before);
                credit(state, &tx.sender(), tx.value());
                let code = match err {
                    HostError::OutOfGas(_) => ErrorCode::OutOfGas,
                    HostError::CpuTimeLimit => ErrorCode::CpuTimeLimitExceeded,
                    HostError::MemoryLimit { .. } => ErrorCode::MemoryLimitExceeded,
                    HostError::Reverted(_) | HostError::InsufficientBalance { .. } => {
                        ErrorCode::ContractReverted
                    }
                    _ => ErrorCode::ContractCallFailed,
                };
                (code, Vec::new(), meter.gas_used())
            }
        };

        settle_gas(state, &tx.sender(), max_fee, gas_price, effective_gas);
        Outcome {
            to: tx.to(),
            gas_used: effective_gas,
            code,
            logs,
        }
    }

    fn execute_staking(
        &self,
        tx: &Transaction,
        state: &mut dyn StateDatabase,
        env: &BlockEnv,
    ) -> Outcome {
        let Some(staking) = &self.staking else {
            return Outcome::rejected(tx.to(), ErrorCode::StakingNotAvailable);
        };
        let gas_price = tx.effective_gas_price(env.base_fee);
        let gas_used = self.table.transfer;

        let Some(fee) = gas_price.checked_mul(U256::from(gas_used)) else {
            return Outcome::rejected(tx.to(), ErrorCode::InsufficientBalance);
        };
        // Deposits and registrations move the transaction value out of the
        // sender's balance; withdrawals and exits only pay the fee.
        let moves_value = matches!(
            tx.tx_type(),
            TxType::StakeDeposit | TxType::ValidatorRegister
        );
        let upfront = if moves_value {
            match fee.checked_add(tx.value()) {
                Some(upfront) => upfront,
                None => return Outcome::rejected(tx.to(), ErrorCode::InsufficientBalance),
            }
        } else {
            fee
        };
        let mut sender = state.account(&tx.sender()).unwrap_or_default();
        if sender.balance < upfront {
            return Outcome::rejected(tx.to(), ErrorCode::InsufficientBalance);
        }

        let result = match tx.tx_type() {
            TxType::StakeDeposit => staking.add_stake(tx.sender(), tx.value()),
            TxType::StakeWithdraw => staking.initiate_unstake(tx.sender(), tx.value(), env.number),
            TxType::ValidatorRegister => {
                let endpoint = if tx.data().is_empty() {
                    None
                } else {
                    String::from_utf8(tx.data().to_vec()).ok()
                };
                staking.register_validator(tx.sender(), tx.value(), env.number, endpoint)
            }
            TxType::ValidatorExit => match staking.get_self_stake(&tx.sender()) {
                Some(stake) => staking.initiate_unstake(tx.sender(), stake, env.number),
                None => Err(crate::staking::StakingError::NotRegistered(tx.sender())),
            },
            _ => unreachable!("dispatched on staking types only"),
        };

        let (debit, code) = match &result {
            Ok(()) => (upfront, ErrorCode::Success),
            // The ledger refused: the fee is still owed, the value stays.
            Err(err) => (fee, err.code()),
        };
        sender.balance -= debit;
        sender.nonce += 1;
        state.set_account(tx.sender(), sender);

        Outcome {
            to: tx.to(),
            gas_used,
            code,
            logs: Vec::new(),
        }
    }
}

struct Outcome {
    to: Address,
    gas_used: u64,
    code: ErrorCode,
    logs: Vec<Log>,
}

impl Outcome {
    /// Pre-entry refusal: nothing was charged, nothing was mutated.
    fn rejected(to: Address, code: ErrorCode) -> Self {
        Self {
            to,
            gas_used: 0,
            code,
            logs: Vec::new(),
        }
    }
}

/// Credits `amount` to `address`. The caller guarantees the credit cannot
/// overflow (it returns funds debited moments earlier).
fn credit(state: &mut dyn StateDatabase, address: &Address, amount: U256) {
    let mut account = state.account(address).unwrap_or_default();
    if let Some(balance) = account.balance.checked_add(amount) {
        account.balance = balance;
        state.set_account(*address, account);
    }
}

/// Returns the unused part of the up-front fee debit at the effective gas
/// price.
fn settle_gas(
    state: &mut dyn StateDatabase,
    sender: &Address,
    max_fee: U256,
    gas_price: U256,
    effective_gas: u64,
) {
    let spent = gas_price.saturating_mul(U256::from(effective_gas));
    let refund = max_fee.saturating_sub(spent);
    if refund > U256::ZERO {
        credit(state, sender, refund);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_types::{Keypair, TransactionBuilder};

    use crate::runtime::host::HostError;
    use crate::runtime::{method_selector, ContractLogic, Selector};
    use crate::staking::InMemoryStaking;
    use crate::state::{InMemoryState, ReadState};

    const COUNTER_TAG: u16 = 0x0010;
    const COUNT_KEY: Hash256 = Hash256::new([0x01; 32]);

    /// Minimal stateful contract exercising storage, events, context reads,
    /// reverts and native transfers.
    struct Counter;

    impl Counter {
        fn count(host: &mut HostContext<'_>) -> Result<u64, HostError> {
            let raw = host.storage_read(&COUNT_KEY)?.unwrap_or_default();
            let bytes: [u8; 8] = raw.try_into().unwrap_or([0u8; 8]);
            Ok(u64::from_le_bytes(bytes))
        }
    }

    impl ContractLogic for Counter {
        fn deploy(&self, host: &mut HostContext<'_>, _args: &[u8]) -> Result<(), HostError> {
            host.storage_write(COUNT_KEY, 0u64.to_le_bytes().to_vec())
        }

        fn call(
            &self,
            host: &mut HostContext<'_>,
            selector: Selector,
            input: &[u8],
        ) -> Result<Vec<u8>, HostError> {
            if selector == method_selector("increment") {
                let next = Self::count(host)? + 1;
                host.storage_write(COUNT_KEY, next.to_le_bytes().to_vec())?;
                host.emit(blake3_hash(b"Incremented"), vec![], next.to_le_bytes().to_vec())?;
                Ok(next.to_le_bytes().to_vec())
            } else if selector == method_selector("get") {
                Ok(Self::count(host)?.to_le_bytes().to_vec())
            } else if selector == method_selector("boom") {
                host.storage_write(COUNT_KEY, 99u64.to_le_bytes().to_vec())?;
                host.revert("boom requested")
            } else if selector == method_selector("payout") {
                let caller = host.caller()?;
                let amount = U256::from(u64::from_le_bytes(
                    input.try_into().map_err(|_| HostError::Reverted("bad amount".into()))?,
                ));
                host.transfer_native(caller, amount)?;
                Ok(Vec::new())
            } else {
                Err(HostError::UnknownSelector(selector))
            }
        }
    }

    fn counter_code() -> Vec<u8> {
        COUNTER_TAG.to_le_bytes().to_vec()
    }

    fn runtime() -> Arc<ContractRuntime> {
        let mut runtime = ContractRuntime::new();
        runtime.register(COUNTER_TAG, Arc::new(Counter));
        Arc::new(runtime)
    }

    fn executor() -> Executor {
        Executor::new(GasTable::default(), runtime())
    }

    fn keypair() -> Keypair {
        Keypair::from_seed([21u8; 32])
    }

    fn env() -> BlockEnv {
        BlockEnv {
            number: 1,
            timestamp: 1_000,
            base_fee: U256::ZERO,
            chain_id: 1,
            gas_limit: 30_000_000,
            block_hash: blake3_hash(b"preliminary"),
        }
    }

    fn funded_state(keypair: &Keypair, balance: u64) -> InMemoryState {
        let mut state = InMemoryState::new();
        state.set_account(keypair.address(), Account::with_balance(U256::from(balance)));
        state
    }

    fn balance_of(state: &InMemoryState, address: &Address) -> U256 {
        state
            .account(address)
            .map(|account| account.balance)
            .unwrap_or(U256::ZERO)
    }

    fn nonce_of(state: &InMemoryState, address: &Address) -> u64 {
        state.account(address).map(|account| account.nonce).unwrap_or(0)
    }

    /// Deploys the counter and returns its address, leaving the deployer with
    /// nonce 1.
    fn deploy_counter(state: &mut InMemoryState, keypair: &Keypair) -> Address {
        let tx = TransactionBuilder::new(TxType::ContractDeploy, 1)
            .gas_limit(1_000_000)
            .legacy_gas_price(U256::from(1u64))
            .data(counter_code())
            .sign(keypair);
        let receipt = executor().execute(&tx, state, &env(), 0);
        assert!(receipt.success, "deploy failed: {:?}", receipt.error_code);
        receipt.to
    }

    #[test]
    fn transfer_moves_value_and_fee() {
        let keypair = keypair();
        let recipient = Address::new([9u8; 20]);
        let mut state = funded_state(&keypair, 1_000_000);
        let tx = TransactionBuilder::new(TxType::Transfer, 1)
            .to(recipient)
            .value(U256::from(100u64))
            .gas_limit(21_000)
            .legacy_gas_price(U256::from(1u64))
            .sign(&keypair);

        let receipt = executor().execute(&tx, &mut state, &env(), 0);

        assert!(receipt.success);
        assert_eq!(receipt.gas_used, 21_000);
        assert_eq!(receipt.effective_gas_price, U256::from(1u64));
        // 1_000_000 - 100 - 21_000 * 1
        assert_eq!(
            balance_of(&state, &keypair.address()),
            U256::from(978_900u64)
        );
        assert_eq!(balance_of(&state, &recipient), U256::from(100u64));
        assert_eq!(nonce_of(&state, &keypair.address()), 1);
        assert_eq!(receipt.post_state_root, state.compute_state_root());
    }

    #[test]
    fn transfer_conserves_total_balance() {
        let keypair = keypair();
        let recipient = Address::new([9u8; 20]);
        let mut state = funded_state(&keypair, 1_000_000);
        let tx = TransactionBuilder::new(TxType::Transfer, 1)
            .to(recipient)
            .value(U256::from(500u64))
            .gas_limit(21_000)
            .legacy_gas_price(U256::from(2u64))
            .sign(&keypair);

        let before = balance_of(&state, &keypair.address());
        let receipt = executor().execute(&tx, &mut state, &env(), 0);
        let after = balance_of(&state, &keypair.address());

        // Sender lost exactly value + fee; recipient gained exactly value.
        assert_eq!(before - after, U256::from(500u64 + 42_000u64));
        assert_eq!(balance_of(&state, &recipient), U256::from(500u64));
        assert!(receipt.success);
    }

    #[test]
    fn transfer_insufficient_balance_leaves_state_untouched() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 50);
        let root_before = state.compute_state_root();
        let tx = TransactionBuilder::new(TxType::Transfer, 1)
            .to(Address::new([9u8; 20]))
            .value(U256::from(100u64))
            .gas_limit(21_000)
            .legacy_gas_price(U256::from(1u64))
            .sign(&keypair);

        let receipt = executor().execute(&tx, &mut state, &env(), 0);

        assert!(!receipt.success);
        assert_eq!(receipt.error_code, ErrorCode::InsufficientBalance);
        assert_eq!(receipt.gas_used, 0);
        assert_eq!(balance_of(&state, &keypair.address()), U256::from(50u64));
        assert_eq!(nonce_of(&state, &keypair.address()), 0);
        assert_eq!(state.compute_state_root(), root_before);
    }

    #[test]
    fn self_transfer_burns_only_the_fee() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 100_000);
        let tx = TransactionBuilder::new(TxType::Transfer, 1)
            .to(keypair.address())
            .value(U256::from(5_000u64))
            .gas_limit(21_000)
            .legacy_gas_price(U256::from(1u64))
            .sign(&keypair);

        let receipt = executor().execute(&tx, &mut state, &env(), 0);

        assert!(receipt.success);
        assert_eq!(balance_of(&state, &keypair.address()), U256::from(79_000u64));
        assert_eq!(nonce_of(&state, &keypair.address()), 1);
    }

    #[test]
    fn eip1559_transfer_charges_effective_price() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let env = BlockEnv {
            base_fee: U256::from(100u64),
            ..env()
        };
        let tx = TransactionBuilder::new(TxType::Transfer, 1)
            .to(Address::new([9u8; 20]))
            .value(U256::from(100u64))
            .gas_limit(21_000)
            .max_fee_per_gas(U256::from(150u64))
            .max_priority_fee_per_gas(U256::from(20u64))
            .sign(&keypair);

        let receipt = executor().execute(&tx, &mut state, &env, 0);

        // min(150, 100 + 20) = 120 per gas.
        assert_eq!(receipt.effective_gas_price, U256::from(120u64));
        assert_eq!(
            balance_of(&state, &keypair.address()),
            U256::from(10_000_000u64 - 100 - 120 * 21_000)
        );
    }

    #[test]
    fn deploy_creates_account_and_stores_code() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let expected_address = derive_contract_address(&keypair.address(), 0);

        let tx = TransactionBuilder::new(TxType::ContractDeploy, 1)
            .value(U256::from(1_000u64))
            .gas_limit(1_000_000)
            .legacy_gas_price(U256::from(1u64))
            .data(counter_code())
            .sign(&keypair);
        let receipt = executor().execute(&tx, &mut state, &env(), 0);

        assert!(receipt.success);
        assert_eq!(receipt.to, expected_address);

        let contract = state.account(&expected_address).unwrap();
        assert_eq!(contract.account_type, AccountType::Contract);
        assert_eq!(contract.code_hash, blake3_hash(&counter_code()));
        assert_eq!(contract.balance, U256::from(1_000u64));
        assert_eq!(
            state.storage(&expected_address, &CODE_STORAGE_KEY),
            Some(counter_code())
        );
        // Constructor wrote the initial count inside the scope.
        assert_eq!(
            state.storage(&expected_address, &COUNT_KEY),
            Some(0u64.to_le_bytes().to_vec())
        );
        // Sender paid value plus gas at price 1.
        assert_eq!(
            balance_of(&state, &keypair.address()),
            U256::from(10_000_000u64 - 1_000) - U256::from(receipt.gas_used)
        );
        assert_eq!(nonce_of(&state, &keypair.address()), 1);
    }

    #[test]
    fn deploy_of_unknown_type_reverts_cleanly() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let code = 0xdeadu16.to_le_bytes().to_vec();
        let expected_address = derive_contract_address(&keypair.address(), 0);

        let tx = TransactionBuilder::new(TxType::ContractDeploy, 1)
            .value(U256::from(1_000u64))
            .gas_limit(1_000_000)
            .legacy_gas_price(U256::from(1u64))
            .data(code)
            .sign(&keypair);
        let receipt = executor().execute(&tx, &mut state, &env(), 0);

        assert!(!receipt.success);
        assert_eq!(receipt.error_code, ErrorCode::ContractDeployFailed);
        // The account never came to be and the endowment came back; only the
        // consumed gas is gone.
        assert_eq!(state.account(&expected_address), None);
        assert_eq!(state.storage(&expected_address, &CODE_STORAGE_KEY), None);
        assert_eq!(
            balance_of(&state, &keypair.address()),
            U256::from(10_000_000u64) - U256::from(receipt.gas_used)
        );
        // Entered execution: the nonce moved.
        assert_eq!(nonce_of(&state, &keypair.address()), 1);
    }

    #[test]
    fn call_increments_counter_and_emits() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let contract = deploy_counter(&mut state, &keypair);

        let tx = TransactionBuilder::new(TxType::ContractCall, 1)
            .nonce(1)
            .to(contract)
            .gas_limit(1_000_000)
            .legacy_gas_price(U256::from(1u64))
            .data(method_selector("increment").to_vec())
            .sign(&keypair);
        let receipt = executor().execute(&tx, &mut state, &env(), 0);

        assert!(receipt.success, "{:?}", receipt.error_code);
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].contract, contract);
        assert_eq!(
            state.storage(&contract, &COUNT_KEY),
            Some(1u64.to_le_bytes().to_vec())
        );
        assert_eq!(nonce_of(&state, &keypair.address()), 2);
    }

    #[test]
    fn call_to_missing_contract_is_rejected() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let root_before = state.compute_state_root();

        let tx = TransactionBuilder::new(TxType::ContractCall, 1)
            .to(Address::new([9u8; 20]))
            .gas_limit(1_000_000)
            .legacy_gas_price(U256::from(1u64))
            .sign(&keypair);
        let receipt = executor().execute(&tx, &mut state, &env(), 0);

        assert_eq!(receipt.error_code, ErrorCode::ContractNotFound);
        assert_eq!(receipt.gas_used, 0);
        assert_eq!(state.compute_state_root(), root_before);
        assert_eq!(nonce_of(&state, &keypair.address()), 0);
    }

    #[test]
    fn call_to_plain_account_is_rejected() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let eoa = Address::new([9u8; 20]);
        state.set_account(eoa, Account::with_balance(U256::from(1u64)));

        let tx = TransactionBuilder::new(TxType::ContractCall, 1)
            .to(eoa)
            .gas_limit(1_000_000)
            .legacy_gas_price(U256::from(1u64))
            .sign(&keypair);
        let receipt = executor().execute(&tx, &mut state, &env(), 0);
        assert_eq!(receipt.error_code, ErrorCode::ContractNotFound);
    }

    #[test]
    fn reverted_call_rolls_back_but_keeps_nonce_and_fee() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let contract = deploy_counter(&mut state, &keypair);
        let balance_before = balance_of(&state, &keypair.address());

        let tx = TransactionBuilder::new(TxType::ContractCall, 1)
            .nonce(1)
            .to(contract)
            .value(U256::from(77u64))
            .gas_limit(1_000_000)
            .legacy_gas_price(U256::from(1u64))
            .data(method_selector("boom").to_vec())
            .sign(&keypair);
        let receipt = executor().execute(&tx, &mut state, &env(), 0);

        assert!(!receipt.success);
        assert_eq!(receipt.error_code, ErrorCode::ContractReverted);
        assert!(receipt.logs.is_empty());
        // The pre-revert storage write must not survive.
        assert_eq!(
            state.storage(&contract, &COUNT_KEY),
            Some(0u64.to_le_bytes().to_vec())
        );
        // The value went back; only the consumed gas was kept.
        assert_eq!(
            balance_of(&state, &keypair.address()),
            balance_before - U256::from(receipt.gas_used)
        );
        assert_eq!(balance_of(&state, &contract), U256::ZERO);
        assert_eq!(nonce_of(&state, &keypair.address()), 2);
        assert!(receipt.gas_used > 0);
    }

    #[test]
    fn call_out_of_gas_consumes_the_limit() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let contract = deploy_counter(&mut state, &keypair);

        // Enough for the intrinsic charge but not for the storage writes.
        let tx = TransactionBuilder::new(TxType::ContractCall, 1)
            .nonce(1)
            .to(contract)
            .gas_limit(21_100)
            .legacy_gas_price(U256::from(1u64))
            .data(method_selector("increment").to_vec())
            .sign(&keypair);
        let receipt = executor().execute(&tx, &mut state, &env(), 0);

        assert_eq!(receipt.error_code, ErrorCode::OutOfGas);
        assert_eq!(
            state.storage(&contract, &COUNT_KEY),
            Some(0u64.to_le_bytes().to_vec())
        );
        assert_eq!(nonce_of(&state, &keypair.address()), 2);
    }

    #[test]
    fn contract_can_pay_out_native_balance() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let contract = deploy_counter(&mut state, &keypair);

        // Fund the contract, then ask for part of it back.
        let fund = TransactionBuilder::new(TxType::ContractCall, 1)
            .nonce(1)
            .to(contract)
            .value(U256::from(500u64))
            .gas_limit(1_000_000)
            .legacy_gas_price(U256::from(1u64))
            .data(method_selector("get").to_vec())
            .sign(&keypair);
        assert!(executor().execute(&fund, &mut state, &env(), 0).success);

        let mut calldata = method_selector("payout").to_vec();
        calldata.extend_from_slice(&200u64.to_le_bytes());
        let payout = TransactionBuilder::new(TxType::ContractCall, 1)
            .nonce(2)
            .to(contract)
            .gas_limit(1_000_000)
            .legacy_gas_price(U256::from(1u64))
            .data(calldata)
            .sign(&keypair);
        let receipt = executor().execute(&payout, &mut state, &env(), 0);

        assert!(receipt.success, "{:?}", receipt.error_code);
        assert_eq!(balance_of(&state, &contract), U256::from(300u64));
    }

    #[test]
    fn call_with_exhausted_time_budget_times_out() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let contract = deploy_counter(&mut state, &keypair);

        let limits = ExecutionLimits {
            time_budget: Some(std::time::Duration::ZERO),
            ..ExecutionLimits::default()
        };
        let limited = Executor::new(GasTable::default(), runtime()).with_limits(limits);

        let tx = TransactionBuilder::new(TxType::ContractCall, 1)
            .nonce(1)
            .to(contract)
            .gas_limit(1_000_000)
            .legacy_gas_price(U256::from(1u64))
            .data(method_selector("increment").to_vec())
            .sign(&keypair);
        let receipt = limited.execute(&tx, &mut state, &env(), 0);

        assert_eq!(receipt.error_code, ErrorCode::CpuTimeLimitExceeded);
        // The timeout reverted the contract's writes via the scope.
        assert_eq!(
            state.storage(&contract, &COUNT_KEY),
            Some(0u64.to_le_bytes().to_vec())
        );
        assert_eq!(nonce_of(&state, &keypair.address()), 2);
    }

    #[test]
    fn call_exceeding_storage_write_limit_is_bounded() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let contract = deploy_counter(&mut state, &keypair);

        let limits = ExecutionLimits {
            // The counter writes an 8-byte slot.
            storage_write_limit: 4,
            ..ExecutionLimits::default()
        };
        let limited = Executor::new(GasTable::default(), runtime()).with_limits(limits);

        let tx = TransactionBuilder::new(TxType::ContractCall, 1)
            .nonce(1)
            .to(contract)
            .gas_limit(1_000_000)
            .legacy_gas_price(U256::from(1u64))
            .data(method_selector("increment").to_vec())
            .sign(&keypair);
        let receipt = limited.execute(&tx, &mut state, &env(), 0);

        assert_eq!(receipt.error_code, ErrorCode::MemoryLimitExceeded);
        assert_eq!(
            state.storage(&contract, &COUNT_KEY),
            Some(0u64.to_le_bytes().to_vec())
        );
    }

    #[test]
    fn staking_without_collaborator_is_unavailable() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let root_before = state.compute_state_root();

        let tx = TransactionBuilder::new(TxType::StakeDeposit, 1)
            .value(U256::from(1_000u64))
            .gas_limit(21_000)
            .legacy_gas_price(U256::from(1u64))
            .sign(&keypair);
        let receipt = executor().execute(&tx, &mut state, &env(), 0);

        assert_eq!(receipt.error_code, ErrorCode::StakingNotAvailable);
        assert_eq!(state.compute_state_root(), root_before);
    }

    #[test]
    fn validator_register_moves_stake() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let staking = Arc::new(InMemoryStaking::new(U256::from(1_000u64)));
        let executor = Executor::new(GasTable::default(), runtime()).with_staking(staking.clone());

        let tx = TransactionBuilder::new(TxType::ValidatorRegister, 1)
            .value(U256::from(5_000u64))
            .gas_limit(21_000)
            .legacy_gas_price(U256::from(1u64))
            .data(b"validator.basalt:9000".to_vec())
            .sign(&keypair);
        let receipt = executor.execute(&tx, &mut state, &env(), 0);

        assert!(receipt.success, "{:?}", receipt.error_code);
        assert_eq!(
            staking.get_self_stake(&keypair.address()),
            Some(U256::from(5_000u64))
        );
        // value + fee left the balance
        assert_eq!(
            balance_of(&state, &keypair.address()),
            U256::from(10_000_000u64 - 5_000 - 21_000)
        );
        assert_eq!(nonce_of(&state, &keypair.address()), 1);
    }

    #[test]
    fn stake_below_minimum_charges_fee_only() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let staking = Arc::new(InMemoryStaking::new(U256::from(10_000u64)));
        let executor = Executor::new(GasTable::default(), runtime()).with_staking(staking.clone());

        let tx = TransactionBuilder::new(TxType::ValidatorRegister, 1)
            .value(U256::from(5_000u64))
            .gas_limit(21_000)
            .legacy_gas_price(U256::from(1u64))
            .sign(&keypair);
        let receipt = executor.execute(&tx, &mut state, &env(), 0);

        assert_eq!(receipt.error_code, ErrorCode::StakeBelowMinimum);
        assert_eq!(staking.get_self_stake(&keypair.address()), None);
        // Fee charged, value untouched, nonce bumped.
        assert_eq!(
            balance_of(&state, &keypair.address()),
            U256::from(10_000_000u64 - 21_000)
        );
        assert_eq!(nonce_of(&state, &keypair.address()), 1);
    }

    #[test]
    fn validator_exit_unbonds_entire_stake() {
        let keypair = keypair();
        let mut state = funded_state(&keypair, 10_000_000);
        let staking = Arc::new(InMemoryStaking::new(U256::from(1_000u64)));
        staking
            .register_validator(keypair.address(), U256::from(4_000u64), 0, None)
            .unwrap();
        let executor = Executor::new(GasTable::default(), runtime()).with_staking(staking.clone());

        let tx = TransactionBuilder::new(TxType::ValidatorExit, 1)
            .gas_limit(21_000)
            .legacy_gas_price(U256::from(1u64))
            .sign(&keypair);
        let receipt = executor.execute(&tx, &mut state, &env(), 0);

        assert!(receipt.success);
        assert_eq!(
            staking.get_self_stake(&keypair.address()),
            Some(U256::ZERO)
        );
        assert_eq!(staking.unbonding_queue().len(), 1);
    }

    #[test]
    fn derive_contract_address_is_stable_and_nonce_sensitive() {
        let sender = Address::new([7u8; 20]);
        let a = derive_contract_address(&sender, 0);
        let b = derive_contract_address(&sender, 1);
        assert_ne!(a, b);
        assert_eq!(a, derive_contract_address(&sender, 0));
    }
}
