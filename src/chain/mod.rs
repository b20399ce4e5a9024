//! Chain module - node access for balance, nonce and broadcast
//!
//! This module provides:
//! - The `ChainStateReader` seam used by the transaction builder and the
//!   confirmation monitor
//! - The `ContractReader` seam for read-only contract calls
//! - Multi-RPC provider management with read failover

pub mod provider;

pub use provider::ChainProvider;

use crate::error::ChainSigResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};

/// Read-only view of account state on a chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainStateReader: Send + Sync {
    /// Balance in the chain's smallest unit
    async fn get_balance(&self, address: Address) -> ChainSigResult<U256>;

    /// Next nonce for `address`
    async fn get_transaction_count(&self, address: Address) -> ChainSigResult<U256>;
}

/// Read-only contract execution (`eth_call`)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContractReader: Send + Sync {
    /// Raw return data of calling `to` with `data` at the latest block
    async fn call(&self, to: Address, data: Bytes) -> ChainSigResult<Bytes>;
}
