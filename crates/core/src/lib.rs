//! Execution and state-transition core of the Basalt chain: transaction
//! validation and admission, deterministic execution with EIP-1559 fee
//! semantics, block building with domain-separated merkle roots, canonical
//! chain management and the timer-driven block production loop.

pub mod blockchain;
pub mod builder;
pub mod executor;
pub mod fee;
pub mod gas;
pub mod genesis;
pub mod mempool;
pub mod merkle;
pub mod node;
pub mod producer;
pub mod runtime;
pub mod staking;
pub mod state;
pub mod validator;

pub use blockchain::{Blockchain, BLOCK_RETENTION};
pub use builder::BlockBuilder;
pub use executor::{BlockEnv, Executor};
pub use fee::BaseFeeCalculator;
pub use gas::{GasMeter, GasTable, OutOfGas, TX_BASE_GAS};
pub use genesis::build_genesis;
pub use executor::{derive_contract_address, MAX_LOGS_PER_TX};
pub use mempool::{Mempool, PoolConfig, PoolError};
pub use merkle::merkle_root;
pub use node::{Node, SubmitError};
pub use producer::{BlockProducer, ProducerHandle};
pub use runtime::host::{ExecEnv, ExecutionLimits, HostContext, HostError};
pub use runtime::registry::{NameRegistry, NAME_REGISTRY_TAG};
pub use runtime::{
    method_selector, ContractLogic, ContractRuntime, CODE_STORAGE_KEY, FALLBACK_SELECTOR,
};
pub use staking::{InMemoryStaking, StakingError, StakingState};
pub use state::{InMemoryState, ReadState, ScopedState, StateDatabase, StateFork};
pub use validator::validate_transaction;
