//! Transaction assembly: validation, funds check, canonical digest

use super::gas::GasEstimator;
use super::transaction::{SigningDigest, UnsignedTransaction};
use crate::chain::ChainStateReader;
use crate::config::ChainConfig;
use crate::error::{ChainSigError, ChainSigResult};

use ethers::types::{Address, Bytes, U256};
use ethers::utils::{format_units, parse_units, ParseUnits};
use std::sync::Arc;
use tracing::{debug, info};

/// What the caller wants sent
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub from: Option<Address>,
    /// `None` deploys `data` as contract code
    pub to: Option<Address>,
    /// Decimal amount in native units, e.g. `"0.001"`
    pub amount: String,
    pub data: Bytes,
    pub gas_limit: Option<U256>,
}

impl SendRequest {
    pub fn transfer(from: Option<Address>, to: Address, amount: impl Into<String>) -> Self {
        Self {
            from,
            to: Some(to),
            amount: amount.into(),
            data: Bytes::default(),
            gas_limit: None,
        }
    }

    pub fn deploy(from: Option<Address>, bytecode: Bytes, gas_limit: U256) -> Self {
        Self {
            from,
            to: None,
            amount: "0".to_string(),
            data: bytecode,
            gas_limit: Some(gas_limit),
        }
    }

    /// State-changing contract call; `amount` may be zero
    pub fn call(
        from: Option<Address>,
        contract: Address,
        calldata: Bytes,
        amount: impl Into<String>,
        gas_limit: U256,
    ) -> Self {
        Self {
            from,
            to: Some(contract),
            amount: amount.into(),
            data: calldata,
            gas_limit: Some(gas_limit),
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: U256) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = data;
        self
    }
}

/// Output of the build step, ready for signing
#[derive(Debug, Clone)]
pub struct PreparedTransaction {
    pub from: Address,
    pub tx: UnsignedTransaction,
    pub digest: SigningDigest,
    /// Sender balance observed while building
    pub balance: U256,
}

impl PreparedTransaction {
    pub fn contract_address(&self) -> Option<Address> {
        self.tx.contract_address(self.from)
    }
}

/// Convert a decimal amount to the chain's smallest unit
pub fn to_base_units(amount: &str, decimals: u32) -> ChainSigResult<U256> {
    let trimmed = amount.trim();
    let invalid = |reason: String| ChainSigError::InvalidAmount {
        amount: amount.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("empty".to_string()));
    }

    match parse_units(trimmed, decimals).map_err(|e| invalid(e.to_string()))? {
        ParseUnits::U256(value) => Ok(value),
        ParseUnits::I256(_) => Err(invalid("negative".to_string())),
    }
}

/// Render a base-unit value as a decimal string
pub fn display_units(value: U256, decimals: u32) -> String {
    format_units(value, decimals).unwrap_or_else(|_| value.to_string())
}

/// Assembles unsigned transactions for one chain
pub struct TransactionBuilder {
    chain_id: u64,
    currency: String,
    decimals: u32,
    default_gas_limit: U256,
    state: Arc<dyn ChainStateReader>,
    gas_estimator: GasEstimator,
}

impl TransactionBuilder {
    pub fn new(
        config: &ChainConfig,
        state: Arc<dyn ChainStateReader>,
        gas_estimator: GasEstimator,
    ) -> Self {
        Self {
            chain_id: config.chain_id,
            currency: config.currency.clone(),
            decimals: config.decimals,
            default_gas_limit: U256::from(config.gas_limit),
            state,
            gas_estimator,
        }
    }

    /// Validate `request` and produce a transaction plus its digest.
    ///
    /// Nothing here has side effects: rejected requests never reach the signer.
    pub async fn build(&self, request: SendRequest) -> ChainSigResult<PreparedTransaction> {
        let from = request.from.ok_or(ChainSigError::MissingSender)?;

        let value = to_base_units(&request.amount, self.decimals)?;
        if value.is_zero() && request.data.is_empty() {
            return Err(ChainSigError::ZeroAmount);
        }

        let gas_limit = request.gas_limit.unwrap_or(self.default_gas_limit);

        // Independent reads, issued together
        let (nonce, balance, gas_price) = tokio::try_join!(
            self.state.get_transaction_count(from),
            self.state.get_balance(from),
            async { Ok::<_, ChainSigError>(self.gas_estimator.gas_price().await) },
        )?;

        info!(
            "Balance of {:?}: {} {}",
            from,
            display_units(balance, self.decimals),
            self.currency
        );

        let required = value.saturating_add(GasEstimator::calculate_cost(gas_limit, gas_price));
        if balance < required {
            return Err(ChainSigError::InsufficientFunds {
                chain_id: self.chain_id,
                have: format!("{} {}", display_units(balance, self.decimals), self.currency),
                need: format!("{} {}", display_units(required, self.decimals), self.currency),
            });
        }

        let tx = UnsignedTransaction::new(
            nonce,
            request.to,
            value,
            request.data,
            gas_limit,
            gas_price,
            self.chain_id,
        );
        let digest = tx.digest();

        debug!(
            "Built tx nonce {} gas {} @ {} wei, digest {}",
            nonce, gas_limit, gas_price, digest
        );

        Ok(PreparedTransaction {
            from,
            tx,
            digest,
            balance,
        })
    }
}
