//! Sender address resolution
//!
//! Addresses are derived outside this crate from the master public key,
//! account and derivation path. The pipeline only needs the result, which
//! it uses as the expected sender during signature recovery.

use crate::config::Settings;
use crate::error::{ChainSigError, ChainSigResult};

use async_trait::async_trait;
use ethers::types::Address;
use std::collections::HashMap;
use tracing::debug;

/// Inputs identifying one derived key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationRequest {
    pub master_public_key: String,
    pub account_id: String,
    pub derivation_path: String,
    /// Config key of the chain, e.g. `sepolia`
    pub chain_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    pub address: Address,
    pub public_key: Option<Vec<u8>>,
}

#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, request: &DerivationRequest) -> ChainSigResult<DerivedAddress>;
}

/// Resolver backed by the pre-derived addresses in the chain config
pub struct ConfiguredAddressResolver {
    addresses: HashMap<String, Option<String>>,
}

impl ConfiguredAddressResolver {
    pub fn from_settings(settings: &Settings) -> Self {
        let addresses = settings
            .chains
            .iter()
            .map(|(tag, chain)| (tag.clone(), chain.address.clone()))
            .collect();

        Self { addresses }
    }
}

#[async_trait]
impl AddressResolver for ConfiguredAddressResolver {
    async fn resolve(&self, request: &DerivationRequest) -> ChainSigResult<DerivedAddress> {
        let configured = self.addresses.get(&request.chain_tag).ok_or_else(|| {
            ChainSigError::AddressResolution(format!(
                "chain {} is not configured",
                request.chain_tag
            ))
        })?;

        let raw = configured.as_deref().ok_or_else(|| {
            ChainSigError::AddressResolution(format!(
                "no address derived for {} at path {}",
                request.chain_tag, request.derivation_path
            ))
        })?;

        let address = raw.parse::<Address>().map_err(|e| {
            ChainSigError::AddressResolution(format!("invalid address {}: {}", raw, e))
        })?;

        debug!(
            "Resolved {} / {} on {} to {:?}",
            request.account_id, request.derivation_path, request.chain_tag, address
        );

        Ok(DerivedAddress {
            address,
            public_key: None,
        })
    }
}

impl DerivationRequest {
    pub fn for_chain(settings: &Settings, chain_tag: &str) -> Self {
        Self {
            master_public_key: settings.derivation.master_public_key.clone(),
            account_id: settings.derivation.account_id.clone(),
            derivation_path: settings.signer.derivation_path.clone(),
            chain_tag: chain_tag.to_string(),
        }
    }
}
