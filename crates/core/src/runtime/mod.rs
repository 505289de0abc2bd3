//! In-process contract runtime.
//!
//! Contract code blobs start with a 2-byte little-endian type tag selecting a
//! host-registered [`ContractLogic`]; the rest of the blob is the type's own
//! body. Method dispatch uses the first four bytes of BLAKE3(method name);
//! calldata shorter than a selector routes to the fallback selector.
//!
//! Every host call receives an explicit [`host::HostContext`], so runtime
//! invocations are reentrancy-safe by construction and need no global guard.

pub mod host;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use basalt_types::{blake3_hash, Hash256};

use host::{HostContext, HostError};

/// Reserved storage key `0xFF01 ‖ 0…0` holding a contract's code blob.
/// Executor-managed; user storage writes to it are refused by the host.
pub const CODE_STORAGE_KEY: Hash256 = {
    let mut bytes = [0u8; 32];
    bytes[0] = 0xff;
    bytes[1] = 0x01;
    Hash256::new(bytes)
};

pub type Selector = [u8; 4];

/// Selector for calldata too short to carry one (`receive`-style entry).
pub const FALLBACK_SELECTOR: Selector = [0u8; 4];

/// First four bytes of BLAKE3 over the method name.
pub fn method_selector(name: &str) -> Selector {
    blake3_hash(name.as_bytes()).prefix4()
}

/// A host-registered contract type. Implementations mutate state and emit
/// events exclusively through the passed host context, which meters gas.
pub trait ContractLogic: Send + Sync {
    /// Runs the constructor. Persistent code is stored by the executor, not
    /// here.
    fn deploy(&self, host: &mut HostContext<'_>, args: &[u8]) -> Result<(), HostError>;

    /// Dispatches one method call and returns its raw output.
    fn call(
        &self,
        host: &mut HostContext<'_>,
        selector: Selector,
        input: &[u8],
    ) -> Result<Vec<u8>, HostError>;
}

/// Registry of contract types keyed by the 2-byte tag at the head of every
/// code blob.
#[derive(Default, Clone)]
pub struct ContractRuntime {
    registry: HashMap<u16, Arc<dyn ContractLogic>>,
}

impl ContractRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime with the contract types every node ships: currently the name
    /// registry.
    pub fn with_builtins() -> Self {
        let mut runtime = Self::new();
        runtime.register(
            registry::NAME_REGISTRY_TAG,
            Arc::new(registry::NameRegistry),
        );
        runtime
    }

    pub fn register(&mut self, type_tag: u16, logic: Arc<dyn ContractLogic>) {
        self.registry.insert(type_tag, logic);
    }

    pub fn is_registered(&self, type_tag: u16) -> bool {
        self.registry.contains_key(&type_tag)
    }

    fn logic_for(&self, code: &[u8]) -> Result<(u16, &Arc<dyn ContractLogic>), HostError> {
        if code.len() < 2 {
            return Err(HostError::MalformedCode { len: code.len() });
        }
        let type_tag = u16::from_le_bytes([code[0], code[1]]);
        let logic = self
            .registry
            .get(&type_tag)
            .ok_or(HostError::UnknownContractType(type_tag))?;
        Ok((type_tag, logic))
    }

    /// Runs the constructor of the contract type named by `code`.
    pub fn deploy(
        &self,
        code: &[u8],
        args: &[u8],
        host: &mut HostContext<'_>,
    ) -> Result<(), HostError> {
        let (type_tag, logic) = self.logic_for(code)?;
        tracing::debug!(type_tag, contract = %host.env().contract, "running constructor");
        logic.deploy(host, args)
    }

    /// Dispatches `calldata` against the contract type named by `code`.
    pub fn execute(
        &self,
        code: &[u8],
        calldata: &[u8],
        host: &mut HostContext<'_>,
    ) -> Result<Vec<u8>, HostError> {
        let (type_tag, logic) = self.logic_for(code)?;
        let (selector, input) = match calldata {
            [a, b, c, d, rest @ ..] => ([*a, *b, *c, *d], rest),
            short => (FALLBACK_SELECTOR, short),
        };
        tracing::debug!(
            type_tag,
            selector = %hex_selector(&selector),
            contract = %host.env().contract,
            "dispatching call"
        );
        logic.call(host, selector, input)
    }
}

fn hex_selector(selector: &Selector) -> String {
    format!("0x{}", hex::encode(selector))
}
