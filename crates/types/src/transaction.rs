//! Typed transactions with a canonical signing payload.
//!
//! A [`Transaction`] is immutable after construction: the hash over the
//! canonical payload is computed once in the constructor and the fields that
//! feed it are only reachable through accessors. Byte layout of the payload
//! (all integers little-endian):
//!
//! ```text
//! type ‖ nonce u64 ‖ sender 20 ‖ to 20 ‖ value 32 ‖ gas_limit u64
//!      ‖ legacy_gas_price 32 ‖ max_fee_per_gas 32 ‖ max_priority_fee_per_gas 32
//!      ‖ varint(|data|) ‖ data ‖ priority ‖ chain_id u32 ‖ compliance_hash 32
//! ```

use crate::crypto::{Keypair, PublicKey, Signature};
use crate::primitives::{blake3_hash, Address, Hash256, U256};
use crate::wire::write_varint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxType {
    Transfer,
    ContractDeploy,
    ContractCall,
    StakeDeposit,
    StakeWithdraw,
    ValidatorRegister,
    ValidatorExit,
}

impl TxType {
    pub const fn as_byte(&self) -> u8 {
        match self {
            TxType::Transfer => 0,
            TxType::ContractDeploy => 1,
            TxType::ContractCall => 2,
            TxType::StakeDeposit => 3,
            TxType::StakeWithdraw => 4,
            TxType::ValidatorRegister => 5,
            TxType::ValidatorExit => 6,
        }
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(TxType::Transfer),
            1 => Some(TxType::ContractDeploy),
            2 => Some(TxType::ContractCall),
            3 => Some(TxType::StakeDeposit),
            4 => Some(TxType::StakeWithdraw),
            5 => Some(TxType::ValidatorRegister),
            6 => Some(TxType::ValidatorExit),
            _ => None,
        }
    }
}

/// Opaque compliance attachment. The core hashes proofs into the signing
/// payload so they cannot be stripped in transit, but never validates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceProof {
    pub schema_id: Hash256,
    pub proof: Vec<u8>,
    pub public_inputs: Vec<u8>,
    pub nullifier: Hash256,
}

/// Unsigned transaction content. Feeds the canonical signing payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionParts {
    pub tx_type: TxType,
    pub nonce: u64,
    pub sender: Address,
    pub to: Address,
    pub value: U256,
    pub gas_limit: u64,
    pub legacy_gas_price: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub data: Vec<u8>,
    /// Reserved.
    pub priority: u8,
    pub chain_id: u32,
    pub compliance_proofs: Vec<ComplianceProof>,
}

impl TransactionParts {
    /// Incremental BLAKE3 over `schema_id ‖ proof ‖ public_inputs ‖ nullifier`
    /// of each proof in order; zero when there are none.
    pub fn compliance_hash(&self) -> Hash256 {
        if self.compliance_proofs.is_empty() {
            return Hash256::ZERO;
        }
        let mut hasher = blake3::Hasher::new();
        for proof in &self.compliance_proofs {
            hasher.update(proof.schema_id.as_bytes());
            hasher.update(&proof.proof);
            hasher.update(&proof.public_inputs);
            hasher.update(proof.nullifier.as_bytes());
        }
        Hash256::new(*hasher.finalize().as_bytes())
    }

    /// Canonical byte sequence that is both signed and hashed.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(224 + self.data.len());
        buf.push(self.tx_type.as_byte());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(self.sender.as_bytes());
        buf.extend_from_slice(self.to.as_bytes());
        buf.extend_from_slice(&self.value.to_le_bytes::<32>());
        buf.extend_from_slice(&self.gas_limit.to_le_bytes());
        buf.extend_from_slice(&self.legacy_gas_price.to_le_bytes::<32>());
        buf.extend_from_slice(&self.max_fee_per_gas.to_le_bytes::<32>());
        buf.extend_from_slice(&self.max_priority_fee_per_gas.to_le_bytes::<32>());
        write_varint(&mut buf, self.data.len() as u64);
        buf.extend_from_slice(&self.data);
        buf.push(self.priority);
        buf.extend_from_slice(&self.chain_id.to_le_bytes());
        buf.extend_from_slice(self.compliance_hash().as_bytes());
        buf
    }
}

/// Signed transaction. The hash caches the constructor-time view of the
/// payload; `data` and `compliance_proofs` are frozen behind accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    parts: TransactionParts,
    signature: Signature,
    sender_public_key: PublicKey,
    hash: Hash256,
}

impl Transaction {
    /// Seals `parts` with a signature and public key, computing the hash over
    /// the canonical payload. The signature is not checked here; that is the
    /// validator's first step.
    pub fn from_parts(
        parts: TransactionParts,
        signature: Signature,
        sender_public_key: PublicKey,
    ) -> Self {
        let hash = blake3_hash(&parts.signing_payload());
        Self {
            parts,
            signature,
            sender_public_key,
            hash,
        }
    }

    pub fn hash(&self) -> Hash256 {
        self.hash
    }

    pub fn tx_type(&self) -> TxType {
        self.parts.tx_type
    }

    pub fn nonce(&self) -> u64 {
        self.parts.nonce
    }

    pub fn sender(&self) -> Address {
        self.parts.sender
    }

    pub fn to(&self) -> Address {
        self.parts.to
    }

    pub fn value(&self) -> U256 {
        self.parts.value
    }

    pub fn gas_limit(&self) -> u64 {
        self.parts.gas_limit
    }

    pub fn legacy_gas_price(&self) -> U256 {
        self.parts.legacy_gas_price
    }

    pub fn max_fee_per_gas(&self) -> U256 {
        self.parts.max_fee_per_gas
    }

    pub fn max_priority_fee_per_gas(&self) -> U256 {
        self.parts.max_priority_fee_per_gas
    }

    pub fn data(&self) -> &[u8] {
        &self.parts.data
    }

    pub fn priority(&self) -> u8 {
        self.parts.priority
    }

    pub fn chain_id(&self) -> u32 {
        self.parts.chain_id
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn sender_public_key(&self) -> &PublicKey {
        &self.sender_public_key
    }

    pub fn compliance_proofs(&self) -> &[ComplianceProof] {
        &self.parts.compliance_proofs
    }

    pub fn signing_payload(&self) -> Vec<u8> {
        self.parts.signing_payload()
    }

    pub fn is_eip1559(&self) -> bool {
        self.parts.max_fee_per_gas != U256::ZERO
    }

    /// Comparator key for mempool ranking and pool eviction.
    pub fn effective_max_fee(&self) -> U256 {
        if self.is_eip1559() {
            self.parts.max_fee_per_gas
        } else {
            self.parts.legacy_gas_price
        }
    }

    /// Per-gas price actually charged under `base_fee`.
    pub fn effective_gas_price(&self, base_fee: U256) -> U256 {
        if self.is_eip1559() {
            self.parts
                .max_fee_per_gas
                .min(base_fee.saturating_add(self.parts.max_priority_fee_per_gas))
        } else {
            self.parts.legacy_gas_price
        }
    }

    /// Re-hashes the payload and verifies the Ed25519 signature against the
    /// carried public key.
    pub fn verify_signature(&self) -> bool {
        self.sender_public_key
            .verify(&self.parts.signing_payload(), &self.signature)
    }
}

/// Fluent constructor for transactions, mainly used by tooling and tests.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    parts: TransactionParts,
}

impl TransactionBuilder {
    pub fn new(tx_type: TxType, chain_id: u32) -> Self {
        Self {
            parts: TransactionParts {
                tx_type,
                nonce: 0,
                sender: Address::ZERO,
                to: Address::ZERO,
                value: U256::ZERO,
                gas_limit: 21_000,
                legacy_gas_price: U256::ZERO,
                max_fee_per_gas: U256::ZERO,
                max_priority_fee_per_gas: U256::ZERO,
                data: Vec::new(),
                priority: 0,
                chain_id,
                compliance_proofs: Vec::new(),
            },
        }
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.parts.nonce = nonce;
        self
    }

    pub fn sender(mut self, sender: Address) -> Self {
        self.parts.sender = sender;
        self
    }

    pub fn to(mut self, to: Address) -> Self {
        self.parts.to = to;
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.parts.value = value;
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.parts.gas_limit = gas_limit;
        self
    }

    pub fn legacy_gas_price(mut self, price: U256) -> Self {
        self.parts.legacy_gas_price = price;
        self
    }

    pub fn max_fee_per_gas(mut self, fee: U256) -> Self {
        self.parts.max_fee_per_gas = fee;
        self
    }

    pub fn max_priority_fee_per_gas(mut self, fee: U256) -> Self {
        self.parts.max_priority_fee_per_gas = fee;
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.parts.data = data;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.parts.priority = priority;
        self
    }

    pub fn compliance_proof(mut self, proof: ComplianceProof) -> Self {
        self.parts.compliance_proofs.push(proof);
        self
    }

    pub fn parts(&self) -> &TransactionParts {
        &self.parts
    }

    /// Sets the sender to the keypair's derived address, signs the canonical
    /// payload and seals the transaction.
    pub fn sign(mut self, keypair: &Keypair) -> Transaction {
        self.parts.sender = keypair.address();
        let signature = keypair.sign(&self.parts.signing_payload());
        Transaction::from_parts(self.parts, signature, keypair.public_key())
    }

    /// Seals with an externally produced signature, leaving all fields as
    /// built. Used by decoders and by tests that need mismatching material.
    pub fn with_signature(self, signature: Signature, public_key: PublicKey) -> Transaction {
        Transaction::from_parts(self.parts, signature, public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> Keypair {
        Keypair::from_seed([3u8; 32])
    }

    fn transfer() -> TransactionBuilder {
        TransactionBuilder::new(TxType::Transfer, 1)
            .to(Address::new([9u8; 20]))
            .value(U256::from(100u64))
            .gas_limit(21_000)
            .legacy_gas_price(U256::from(1u64))
    }

    #[test]
    fn payload_layout_is_bit_exact() {
        let keypair = keypair();
        let tx = transfer().nonce(5).data(vec![0xaa, 0xbb]).sign(&keypair);
        let payload = tx.signing_payload();

        // type byte
        assert_eq!(payload[0], TxType::Transfer.as_byte());
        // nonce u64 LE
        assert_eq!(&payload[1..9], &5u64.to_le_bytes());
        // sender then recipient
        assert_eq!(&payload[9..29], keypair.address().as_bytes());
        assert_eq!(&payload[29..49], tx.to().as_bytes());
        // value 32 LE
        assert_eq!(&payload[49..81], &U256::from(100u64).to_le_bytes::<32>());
        // gas limit u64 LE
        assert_eq!(&payload[81..89], &21_000u64.to_le_bytes());
        // three 32-byte LE fee fields
        assert_eq!(&payload[89..121], &U256::from(1u64).to_le_bytes::<32>());
        assert_eq!(&payload[121..153], &[0u8; 32]);
        assert_eq!(&payload[153..185], &[0u8; 32]);
        // varint data length + data
        assert_eq!(payload[185], 2);
        assert_eq!(&payload[186..188], &[0xaa, 0xbb]);
        // priority byte, chain id u32 LE, compliance hash
        assert_eq!(payload[188], 0);
        assert_eq!(&payload[189..193], &1u32.to_le_bytes());
        assert_eq!(&payload[193..225], Hash256::ZERO.as_bytes());
        assert_eq!(payload.len(), 225);
    }

    #[test]
    fn hash_is_blake3_of_payload() {
        let tx = transfer().sign(&keypair());
        assert_eq!(tx.hash(), blake3_hash(&tx.signing_payload()));
    }

    #[test]
    fn signed_transaction_verifies() {
        let tx = transfer().sign(&keypair());
        assert!(tx.verify_signature());
    }

    #[test]
    fn foreign_signature_fails_verification() {
        let other = Keypair::from_seed([8u8; 32]);
        let tx = transfer()
            .sender(keypair().address())
            .with_signature(other.sign(b"unrelated"), other.public_key());
        assert!(!tx.verify_signature());
    }

    #[test]
    fn compliance_proofs_feed_the_hash() {
        let plain = transfer().sign(&keypair());
        let proof = ComplianceProof {
            schema_id: blake3_hash(b"schema"),
            proof: vec![1, 2, 3],
            public_inputs: vec![4, 5],
            nullifier: blake3_hash(b"nullifier"),
        };
        let attested = transfer().compliance_proof(proof).sign(&keypair());
        // Stripping proofs must change the payload, hence the hash.
        assert_ne!(plain.hash(), attested.hash());
    }

    #[test]
    fn compliance_hash_zero_when_absent() {
        let builder = transfer();
        assert_eq!(builder.parts().compliance_hash(), Hash256::ZERO);
    }

    #[test]
    fn compliance_hash_is_order_sensitive() {
        let a = ComplianceProof {
            schema_id: blake3_hash(b"a"),
            proof: vec![1],
            public_inputs: vec![],
            nullifier: Hash256::ZERO,
        };
        let b = ComplianceProof {
            schema_id: blake3_hash(b"b"),
            proof: vec![2],
            public_inputs: vec![],
            nullifier: Hash256::ZERO,
        };
        let ab = transfer()
            .compliance_proof(a.clone())
            .compliance_proof(b.clone())
            .sign(&keypair());
        let ba = transfer()
            .compliance_proof(b)
            .compliance_proof(a)
            .sign(&keypair());
        assert_ne!(ab.hash(), ba.hash());
    }

    #[test]
    fn effective_fee_selection() {
        let legacy = transfer().sign(&keypair());
        assert!(!legacy.is_eip1559());
        assert_eq!(legacy.effective_max_fee(), U256::from(1u64));
        assert_eq!(legacy.effective_gas_price(U256::from(50u64)), U256::from(1u64));

        let dynamic = transfer()
            .legacy_gas_price(U256::ZERO)
            .max_fee_per_gas(U256::from(150u64))
            .max_priority_fee_per_gas(U256::from(20u64))
            .sign(&keypair());
        assert!(dynamic.is_eip1559());
        assert_eq!(dynamic.effective_max_fee(), U256::from(150u64));
        // min(150, 100 + 20) = 120
        assert_eq!(
            dynamic.effective_gas_price(U256::from(100u64)),
            U256::from(120u64)
        );
        // min(150, 200 + 20) = 150
        assert_eq!(
            dynamic.effective_gas_price(U256::from(200u64)),
            U256::from(150u64)
        );
    }

    #[test]
    fn tx_type_byte_round_trip() {
        for byte in 0..=6u8 {
            let tx_type = TxType::from_byte(byte).unwrap();
            assert_eq!(tx_type.as_byte(), byte);
        }
        assert_eq!(TxType::from_byte(7), None);
    }
}
