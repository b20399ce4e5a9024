//! Remote threshold signer access
//!
//! The signer returns bare `(r, s)` pairs over a 32-byte digest. It never
//! returns a recovery parameter; that is resolved locally (see
//! [`crate::tx::RecoveryResolver`]).
//!
//! # Payload byte order
//!
//! Some signer deployments read the payload array in reverse. The client
//! therefore transmits `PayloadOrder::encode(digest)` and the signer
//! produces a signature over `PayloadOrder::decode(payload)`, which is the
//! original digest. Recovery always runs against the original digest,
//! never against the transmitted bytes. `Reversed` reverses the whole
//! 32-byte array, not individual words.

mod http;

pub use http::HttpSignerClient;

use crate::error::{ChainSigError, ChainSigResult};
use crate::tx::SigningDigest;

use async_trait::async_trait;
use ethers::types::U256;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Byte order of the digest as transmitted to the signer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadOrder {
    /// Digest bytes are sent exactly as hashed
    AsIs,
    /// The whole digest is reversed before transmission
    #[default]
    Reversed,
}

impl PayloadOrder {
    /// Bytes to put on the wire for `digest`
    pub fn encode(self, digest: &SigningDigest) -> [u8; 32] {
        let mut payload = *digest.as_bytes();
        if self == PayloadOrder::Reversed {
            payload.reverse();
        }
        payload
    }

    /// Digest a signer using this convention signs when handed `payload`
    #[cfg(test)]
    pub fn decode(self, payload: [u8; 32]) -> SigningDigest {
        let mut digest = payload;
        if self == PayloadOrder::Reversed {
            digest.reverse();
        }
        SigningDigest::from(digest)
    }
}

/// Signature components without a recovery identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSignature {
    pub r: U256,
    pub s: U256,
}

impl RawSignature {
    /// Parse hex components, with or without `0x`
    pub fn from_hex(r: &str, s: &str) -> ChainSigResult<Self> {
        Ok(Self {
            r: parse_component("r", r)?,
            s: parse_component("s", s)?,
        })
    }
}

fn parse_component(name: &str, raw: &str) -> ChainSigResult<U256> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() || digits.len() > 64 {
        return Err(ChainSigError::MalformedSignature(format!(
            "{} has {} hex digits",
            name,
            digits.len()
        )));
    }

    let value = U256::from_str_radix(digits, 16).map_err(|e| {
        ChainSigError::MalformedSignature(format!("{} is not hex: {}", name, e))
    })?;

    if value.is_zero() {
        return Err(ChainSigError::MalformedSignature(format!("{} is zero", name)));
    }

    Ok(value)
}

/// A remote service producing signatures for keys it never reveals
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignerClient: Send + Sync {
    /// Request a signature over `digest` for the key at `derivation_path`.
    ///
    /// Implementations apply their own [`PayloadOrder`] on the wire.
    async fn request_signature(
        &self,
        digest: SigningDigest,
        derivation_path: &str,
    ) -> ChainSigResult<RawSignature>;
}

/// Request a signature, failing with `SignerTimeout` instead of hanging
pub async fn sign_with_timeout(
    signer: &dyn SignerClient,
    digest: SigningDigest,
    derivation_path: &str,
    limit: Duration,
) -> ChainSigResult<RawSignature> {
    debug!(
        "Requesting signature for digest {} (path {})",
        digest, derivation_path
    );

    match timeout(limit, signer.request_signature(digest, derivation_path)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Signer gave no answer within {:?}", limit);
            Err(ChainSigError::SignerTimeout {
                timeout_ms: limit.as_millis() as u64,
            })
        }
    }
}
