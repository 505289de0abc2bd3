//! Primitive identifiers and numerics: 20-byte [`Address`], 32-byte
//! [`Hash256`] and the 256-bit unsigned integer used for all balance and fee
//! arithmetic.
//!
//! All multi-byte integers on the wire are little-endian; [`U256`] values
//! serialize as 32 bytes little-endian.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tiny_keccak::{Hasher as _, Keccak};

pub use ruint::aliases::U256;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
}

macro_rules! fixed_bytes {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LEN: usize = $len;
            pub const ZERO: $name = $name([0u8; $len]);

            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn from_slice(slice: &[u8]) -> Result<Self, PrimitiveError> {
                let bytes: [u8; $len] =
                    slice
                        .try_into()
                        .map_err(|_| PrimitiveError::InvalidLength {
                            expected: $len,
                            actual: slice.len(),
                        })?;
                Ok(Self(bytes))
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }

        impl FromStr for $name {
            type Err = PrimitiveError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let stripped = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(stripped)
                    .map_err(|err| PrimitiveError::InvalidHex(err.to_string()))?;
                Self::from_slice(&bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(D::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    Address,
    20,
    "Opaque 20-byte account identifier. The zero address is a valid sentinel."
);
fixed_bytes!(
    Hash256,
    32,
    "32-byte BLAKE3 digest used for transaction hashes, storage keys, block \
     hashes and state/merkle roots."
);

impl Hash256 {
    /// First four bytes of the hash, used for method selector dispatch.
    pub fn prefix4(&self) -> [u8; 4] {
        [self.0[0], self.0[1], self.0[2], self.0[3]]
    }
}

impl Address {
    /// Last 20 bytes of a 32-byte digest.
    pub fn from_hash(hash: &Hash256) -> Self {
        let mut bytes = [0u8; Self::LEN];
        bytes.copy_from_slice(&hash.as_bytes()[12..]);
        Self(bytes)
    }
}

/// BLAKE3 digest of `data`, the chain's uniform hash function.
pub fn blake3_hash(data: &[u8]) -> Hash256 {
    Hash256(*blake3::hash(data).as_bytes())
}

/// Keccak-256 digest of `data`, exposed to contracts through the host
/// interface.
pub fn keccak256(data: &[u8]) -> Hash256 {
    let mut keccak = Keccak::v256();
    let mut output = [0u8; 32];
    keccak.update(data);
    keccak.finalize(&mut output);
    Hash256(output)
}

/// Encodes a [`U256`] as 32 bytes little-endian, the on-wire form used by the
/// transaction payload and the block header.
pub fn u256_to_le_bytes(value: &U256) -> [u8; 32] {
    value.to_le_bytes::<32>()
}

/// Decodes a [`U256`] from 32 bytes little-endian.
pub fn u256_from_le_bytes(bytes: [u8; 32]) -> U256 {
    U256::from_le_bytes(bytes)
}
