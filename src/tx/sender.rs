//! End-to-end send pipeline: build, sign, recover, broadcast, re-check balance

use super::broadcast::{broadcast, BroadcastOutcome, Broadcaster};
use super::builder::{PreparedTransaction, SendRequest, TransactionBuilder};
use super::gas::{FeeOracle, GasEstimator};
use super::monitor::{BalanceCheckHandle, ConfirmationMonitor};
use super::recovery::{RecoveredSignature, RecoveryResolver};
use super::transaction::{SignedTransaction, SigningDigest};
use crate::chain::ChainStateReader;
use crate::config::{ChainConfig, SignerConfig};
use crate::error::ChainSigResult;
use crate::signer::{sign_with_timeout, SignerClient};

use ethers::types::Address;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result of a send that reached the node
#[derive(Debug)]
pub struct SendReceipt {
    pub outcome: BroadcastOutcome,
    pub signed: SignedTransaction,
    /// Set for deployments
    pub contract_address: Option<Address>,
    /// Scheduled only when the node accepted the transaction
    pub balance_check: Option<BalanceCheckHandle>,
}

/// Sends transactions on one chain through a remote signer
pub struct TransactionSender {
    chain_id: u64,
    builder: TransactionBuilder,
    signer: Arc<dyn SignerClient>,
    broadcaster: Arc<dyn Broadcaster>,
    monitor: ConfirmationMonitor,
    resolver: RecoveryResolver,
    derivation_path: String,
    signer_timeout: Duration,
}

impl TransactionSender {
    pub fn new(
        chain: &ChainConfig,
        signer_config: &SignerConfig,
        state: Arc<dyn ChainStateReader>,
        fee_oracle: Option<Arc<dyn FeeOracle>>,
        signer: Arc<dyn SignerClient>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        let gas_estimator = GasEstimator::new(fee_oracle, chain.fallback_gas_price());
        let monitor = ConfirmationMonitor::new(
            state.clone(),
            chain.balance_check_delay(),
            chain.currency.clone(),
            chain.decimals,
        );

        info!(
            "Transaction sender initialized for {} (chain {})",
            chain.name, chain.chain_id
        );

        Self {
            chain_id: chain.chain_id,
            builder: TransactionBuilder::new(chain, state, gas_estimator),
            signer,
            broadcaster,
            monitor,
            resolver: RecoveryResolver::eip155(chain.chain_id),
            derivation_path: signer_config.derivation_path.clone(),
            signer_timeout: signer_config.timeout(),
        }
    }

    #[cfg(test)]
    pub fn with_signer_timeout(mut self, limit: Duration) -> Self {
        self.signer_timeout = limit;
        self
    }

    /// Validate and build; no signature is requested.
    pub async fn prepare(&self, request: SendRequest) -> ChainSigResult<PreparedTransaction> {
        self.builder.build(request).await
    }

    /// Sign `prepared` once and broadcast it once.
    pub async fn execute(&self, prepared: PreparedTransaction) -> ChainSigResult<SendReceipt> {
        let contract_address = prepared.contract_address();
        let PreparedTransaction {
            from, tx, digest, ..
        } = prepared;

        let recovered = match self.sign(digest, from).await {
            Ok(recovered) => recovered,
            Err(e) => {
                if e.signature_wasted() {
                    warn!("Signature attempt wasted on chain {}: {}", self.chain_id, e);
                }
                return Err(e);
            }
        };

        let signed = SignedTransaction::new(tx, recovered);
        let outcome = broadcast(self.broadcaster.as_ref(), &signed).await?;

        let balance_check = match &outcome {
            BroadcastOutcome::Submitted(_) => Some(self.monitor.schedule(from)),
            BroadcastOutcome::AlreadySubmitted { .. } => None,
        };

        if let Some(address) = contract_address {
            info!("Contract will be deployed at {:?}", address);
        }

        Ok(SendReceipt {
            outcome,
            signed,
            contract_address,
            balance_check,
        })
    }

    /// `prepare` followed by `execute`
    pub async fn send(&self, request: SendRequest) -> ChainSigResult<SendReceipt> {
        let prepared = self.prepare(request).await?;
        self.execute(prepared).await
    }

    async fn sign(&self, digest: SigningDigest, from: Address) -> ChainSigResult<RecoveredSignature> {
        let raw = sign_with_timeout(
            self.signer.as_ref(),
            digest,
            &self.derivation_path,
            self.signer_timeout,
        )
        .await?;

        self.resolver.recover(&digest, &raw, from)
    }
}
