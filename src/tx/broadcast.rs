//! Broadcast of signed transactions and classification of node rejections
//!
//! A rejection is classified by pattern, case-insensitively:
//! - "nonce too low": the nonce was consumed, most likely by an earlier
//!   attempt of this same transaction. Reported as a non-fatal outcome.
//! - "gas too low" / "underpriced": the caller must rebuild with a higher fee.
//! - anything else: surfaced verbatim.
//!
//! Nothing here retries.

use super::transaction::SignedTransaction;
use crate::error::{BroadcastError, ChainSigError, ChainSigResult};

use async_trait::async_trait;
use ethers::types::{Bytes, H256};
use tracing::{error, info, warn};

/// Node endpoint accepting raw signed transactions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn send_raw_transaction(&self, raw: Bytes) -> ChainSigResult<H256>;
}

/// Non-error results of a broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Submitted(H256),
    /// Node reports the nonce as used; `expected_hash` is what this
    /// transaction would hash to if it is the one that landed.
    AlreadySubmitted { expected_hash: H256, message: String },
}

impl BroadcastOutcome {
    pub fn tx_hash(&self) -> H256 {
        match self {
            BroadcastOutcome::Submitted(hash) => *hash,
            BroadcastOutcome::AlreadySubmitted { expected_hash, .. } => *expected_hash,
        }
    }
}

/// Map a node error message onto a rejection kind
pub fn classify_rejection(message: &str) -> BroadcastError {
    let lower = message.to_lowercase();

    if lower.contains("nonce too low") {
        BroadcastError::AlreadySubmitted(message.to_string())
    } else if lower.contains("gas too low") || lower.contains("underpriced") {
        BroadcastError::FeeTooLow(message.to_string())
    } else {
        BroadcastError::Unknown(message.to_string())
    }
}

/// Submit `signed` once and classify the result
pub async fn broadcast(
    broadcaster: &dyn Broadcaster,
    signed: &SignedTransaction,
) -> ChainSigResult<BroadcastOutcome> {
    let expected_hash = signed.hash();

    let err = match broadcaster.send_raw_transaction(signed.raw()).await {
        Ok(hash) => {
            if hash != expected_hash {
                warn!(
                    "Node reported hash {:?}, locally computed {:?}",
                    hash, expected_hash
                );
            }
            info!("Transaction sent: {:?}", hash);
            return Ok(BroadcastOutcome::Submitted(hash));
        }
        Err(e) => e,
    };

    let message = match err {
        ChainSigError::ChainConnection { message, .. } => message,
        other => other.to_string(),
    };

    match classify_rejection(&message) {
        BroadcastError::AlreadySubmitted(message) => {
            info!("Transaction has been tried before: {}", message);
            Ok(BroadcastOutcome::AlreadySubmitted {
                expected_hash,
                message,
            })
        }
        rejection => {
            error!("Broadcast rejected: {}", rejection);
            Err(rejection.into())
        }
    }
}
