//! Recovery parameter resolution
//!
//! The signer returns `(r, s)` only. Exactly one of the two y-parities
//! recovers the sender's key for a valid signature; both are tried in
//! order against the sender address obtained from key derivation.

use super::transaction::SigningDigest;
use crate::error::{ChainSigError, ChainSigResult};
use crate::signer::RawSignature;

use ethers::types::{Address, Signature, U256};
use lazy_static::lazy_static;
use tracing::{debug, warn};

lazy_static! {
    /// Order of the secp256k1 group
    static ref CURVE_ORDER: U256 = U256::from_str_radix(
        "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141",
        16
    )
    .unwrap();
    static ref HALF_ORDER: U256 = *CURVE_ORDER >> 1;
}

/// Parity of the ephemeral point's y coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YParity {
    Even,
    Odd,
}

impl YParity {
    /// Search order
    pub const CANDIDATES: [YParity; 2] = [YParity::Even, YParity::Odd];

    pub fn bit(self) -> u64 {
        match self {
            YParity::Even => 0,
            YParity::Odd => 1,
        }
    }
}

/// How a chain encodes the parity into its `v` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryEncoding {
    /// Replay-protected: `parity + chain_id * 2 + 35`
    Eip155 { chain_id: u64 },
    /// Pre-EIP-155: `parity + 27`
    Legacy,
}

impl RecoveryEncoding {
    pub fn encode(self, parity: YParity) -> u64 {
        match self {
            RecoveryEncoding::Eip155 { chain_id } => parity.bit() + chain_id * 2 + 35,
            RecoveryEncoding::Legacy => parity.bit() + 27,
        }
    }
}

/// Signature whose recovery parameter has been checked against the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveredSignature {
    raw: RawSignature,
    parity: YParity,
    v: u64,
}

impl RecoveredSignature {
    pub fn raw(&self) -> RawSignature {
        self.raw
    }

    pub fn parity(&self) -> YParity {
        self.parity
    }

    /// Encoded recovery parameter
    pub fn v(&self) -> u64 {
        self.v
    }

    pub fn to_signature(&self) -> Signature {
        Signature {
            r: self.raw.r,
            s: self.raw.s,
            v: self.v,
        }
    }
}

/// Finds the recovery parameter that maps a raw signature back to the sender
#[derive(Debug, Clone, Copy)]
pub struct RecoveryResolver {
    encoding: RecoveryEncoding,
}

impl RecoveryResolver {
    pub fn new(encoding: RecoveryEncoding) -> Self {
        Self { encoding }
    }

    /// Resolver for an EVM chain with replay protection
    pub fn eip155(chain_id: u64) -> Self {
        Self::new(RecoveryEncoding::Eip155 { chain_id })
    }

    /// Encoded `v` values tried, in order
    pub fn candidates(&self) -> [u64; 2] {
        YParity::CANDIDATES.map(|parity| self.encoding.encode(parity))
    }

    /// Return the first candidate whose recovered address is `expected`.
    ///
    /// `digest` is the original transaction digest, never the byte order
    /// sent to the signer. High-s signatures are folded to low-s first,
    /// since nodes reject the high form.
    pub fn recover(
        &self,
        digest: &SigningDigest,
        raw: &RawSignature,
        expected: Address,
    ) -> ChainSigResult<RecoveredSignature> {
        let raw = normalize_s(*raw);
        let hash = digest.to_h256();

        for (parity, v) in YParity::CANDIDATES.into_iter().zip(self.candidates()) {
            let signature = Signature {
                r: raw.r,
                s: raw.s,
                v,
            };

            match signature.recover(hash) {
                Ok(address) if address == expected => {
                    debug!("Recovered sender {:?} with v = {}", address, v);
                    return Ok(RecoveredSignature { raw, parity, v });
                }
                Ok(address) => {
                    debug!("Candidate v = {} recovers {:?}, not the sender", v, address);
                }
                Err(e) => {
                    debug!("Candidate v = {} does not recover: {}", v, e);
                }
            }
        }

        warn!(
            "Signature over {} recovers neither candidate to {:?}",
            digest, expected
        );
        Err(ChainSigError::RecoveryFailure {
            expected: format!("{:?}", expected),
        })
    }
}

fn normalize_s(raw: RawSignature) -> RawSignature {
    if raw.s > *HALF_ORDER && raw.s < *CURVE_ORDER {
        RawSignature {
            r: raw.r,
            s: *CURVE_ORDER - raw.s,
        }
    } else {
        raw
    }
}
