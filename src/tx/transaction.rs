//! Transaction data model: unsigned form, signing digest, signed form

use super::recovery::RecoveredSignature;

use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use ethers::utils::{get_contract_address, keccak256};
use std::fmt;

/// Keccak-256 hash of a canonical unsigned transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigningDigest([u8; 32]);

impl SigningDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_h256(self) -> H256 {
        H256::from(self.0)
    }
}

impl From<[u8; 32]> for SigningDigest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<H256> for SigningDigest {
    fn from(hash: H256) -> Self {
        Self(hash.0)
    }
}

impl fmt::Display for SigningDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Fully populated legacy (EIP-155) transaction awaiting a signature.
///
/// Fields are private so nothing can change after the digest is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    nonce: U256,
    to: Option<Address>,
    value: U256,
    data: Bytes,
    gas_limit: U256,
    gas_price: U256,
    chain_id: u64,
}

impl UnsignedTransaction {
    pub fn new(
        nonce: U256,
        to: Option<Address>,
        value: U256,
        data: Bytes,
        gas_limit: U256,
        gas_price: U256,
        chain_id: u64,
    ) -> Self {
        Self {
            nonce,
            to,
            value,
            data,
            gas_limit,
            gas_price,
            chain_id,
        }
    }

    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    /// Recipient; `None` for contract creation
    pub fn to(&self) -> Option<Address> {
        self.to
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn gas_limit(&self) -> U256 {
        self.gas_limit
    }

    pub fn gas_price(&self) -> U256 {
        self.gas_price
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Upper bound on what the sender pays: value plus gas at the limit
    pub fn max_cost(&self) -> U256 {
        self.value
            .saturating_add(self.gas_limit.saturating_mul(self.gas_price))
    }

    /// Address the deployed contract will live at, for creation transactions
    pub fn contract_address(&self, from: Address) -> Option<Address> {
        match self.to {
            Some(_) => None,
            None => Some(get_contract_address(from, self.nonce)),
        }
    }

    fn request(&self) -> TransactionRequest {
        let mut request = TransactionRequest::new()
            .nonce(self.nonce)
            .value(self.value)
            .data(self.data.clone())
            .gas(self.gas_limit)
            .gas_price(self.gas_price)
            .chain_id(self.chain_id);
        if let Some(to) = self.to {
            request = request.to(to);
        }
        request
    }

    /// Canonical EIP-155 encoding: `rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])`
    pub fn rlp(&self) -> Bytes {
        self.request().rlp()
    }

    pub fn digest(&self) -> SigningDigest {
        SigningDigest::from(keccak256(self.rlp()))
    }
}

/// Unsigned transaction plus a signature verified to recover the sender
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    tx: UnsignedTransaction,
    signature: RecoveredSignature,
}

impl SignedTransaction {
    /// Only reachable with a `RecoveredSignature`, which the resolver hands
    /// out after a successful address match.
    pub fn new(tx: UnsignedTransaction, signature: RecoveredSignature) -> Self {
        Self { tx, signature }
    }

    pub fn transaction(&self) -> &UnsignedTransaction {
        &self.tx
    }

    pub fn signature(&self) -> &RecoveredSignature {
        &self.signature
    }

    /// Broadcast-ready bytes
    pub fn raw(&self) -> Bytes {
        self.tx.request().rlp_signed(&self.signature.to_signature())
    }

    /// Hash the network will assign to this transaction
    pub fn hash(&self) -> H256 {
        H256::from(keccak256(self.raw()))
    }
}
