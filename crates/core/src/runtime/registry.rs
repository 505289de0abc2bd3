//! Built-in name registry contract type: maps human-readable names to the
//! account that claimed them. Ships with the node so a fresh chain has a
//! deployable contract out of the box, and doubles as the reference
//! implementation of the host interface from the contract side.

use basalt_types::{blake3_hash, Address, Hash256};

use crate::runtime::host::{HostContext, HostError};
use crate::runtime::{method_selector, ContractLogic, Selector};

/// Type tag the registry registers under.
pub const NAME_REGISTRY_TAG: u16 = 0x0001;

const EVENT_REGISTERED: &[u8] = b"NameRegistered";
const EVENT_RELEASED: &[u8] = b"NameReleased";
const MAX_NAME_LEN: usize = 256;

pub struct NameRegistry;

impl NameRegistry {
    /// Storage slot for a name: BLAKE3 over a tagged preimage, so names
    /// cannot collide with other storage the contract may grow later.
    fn slot(host: &mut HostContext<'_>, name: &[u8]) -> Result<Hash256, HostError> {
        let mut preimage = Vec::with_capacity(5 + name.len());
        preimage.extend_from_slice(b"name:");
        preimage.extend_from_slice(name);
        host.blake3(&preimage)
    }

    fn check_name(host: &HostContext<'_>, name: &[u8]) -> Result<(), HostError> {
        host.require(!name.is_empty(), "name must not be empty")?;
        host.require(
            name.len() <= MAX_NAME_LEN,
            "name exceeds the length limit",
        )
    }

    fn register(host: &mut HostContext<'_>, name: &[u8]) -> Result<Vec<u8>, HostError> {
        Self::check_name(host, name)?;
        let slot = Self::slot(host, name)?;
        let owner = host.caller()?;
        if let Some(current) = host.storage_read(&slot)? {
            host.require(
                current == owner.as_bytes().as_slice(),
                "name is already taken",
            )?;
            // Re-registering an owned name is a no-op.
            return Ok(owner.as_bytes().to_vec());
        }
        host.storage_write(slot, owner.as_bytes().to_vec())?;
        host.emit(
            blake3_hash(EVENT_REGISTERED),
            vec![slot],
            owner.as_bytes().to_vec(),
        )?;
        Ok(owner.as_bytes().to_vec())
    }

    fn resolve(host: &mut HostContext<'_>, name: &[u8]) -> Result<Vec<u8>, HostError> {
        Self::check_name(host, name)?;
        let slot = Self::slot(host, name)?;
        match host.storage_read(&slot)? {
            Some(owner) => Ok(owner),
            None => host.revert("name is not registered"),
        }
    }

    fn release(host: &mut HostContext<'_>, name: &[u8]) -> Result<Vec<u8>, HostError> {
        Self::check_name(host, name)?;
        let slot = Self::slot(host, name)?;
        let owner = host.caller()?;
        let current = match host.storage_read(&slot)? {
            Some(current) => current,
            None => return host.revert("name is not registered"),
        };
        host.require(
            current == owner.as_bytes().as_slice(),
            "only the owner may release a name",
        )?;
        host.storage_delete(&slot)?;
        host.emit(
            blake3_hash(EVENT_RELEASED),
            vec![slot],
            owner.as_bytes().to_vec(),
        )?;
        Ok(Vec::new())
    }
}

impl ContractLogic for NameRegistry {
    fn deploy(&self, _host: &mut HostContext<'_>, _args: &[u8]) -> Result<(), HostError> {
        // No constructor state; every slot starts vacant.
        Ok(())
    }

    fn call(
        &self,
        host: &mut HostContext<'_>,
        selector: Selector,
        input: &[u8],
    ) -> Result<Vec<u8>, HostError> {
        if selector == method_selector("register") {
            Self::register(host, input)
        } else if selector == method_selector("resolve") {
            Self::resolve(host, input)
        } else if selector == method_selector("release") {
            Self::release(host, input)
        } else {
            Err(HostError::UnknownSelector(selector))
        }
    }
}

/// Decodes a registry answer back into an address.
pub fn decode_owner(bytes: &[u8]) -> Option<Address> {
    Address::from_slice(bytes).ok()
}
