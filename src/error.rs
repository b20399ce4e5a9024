//! Error types for chainsig

use thiserror::Error;

/// Main error type for the signing pipeline
#[derive(Error, Debug)]
pub enum ChainSigError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sender address is required")]
    MissingSender,

    #[error("Amount is zero; refusing to send an empty transfer")]
    ZeroAmount,

    #[error("Invalid amount {amount:?}: {reason}")]
    InvalidAmount { amount: String, reason: String },

    #[error("Insufficient funds on chain {chain_id}: have {have}, need {need}")]
    InsufficientFunds {
        chain_id: u64,
        have: String,
        need: String,
    },

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Address resolution failed: {0}")]
    AddressResolution(String),

    #[error("Signer unavailable: {0}")]
    SignerUnavailable(String),

    #[error("Signer did not answer within {timeout_ms}ms")]
    SignerTimeout { timeout_ms: u64 },

    #[error("Malformed signature from signer: {0}")]
    MalformedSignature(String),

    #[error("Signature does not recover sender {expected} under any recovery parameter")]
    RecoveryFailure { expected: String },

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Classified node rejection of a signed transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    /// Nonce already used; the transaction most likely landed on an earlier attempt.
    #[error("Transaction already submitted: {0}")]
    AlreadySubmitted(String),

    #[error("Fee too low: {0}")]
    FeeTooLow(String),

    #[error("Broadcast failed: {0}")]
    Unknown(String),
}

impl ChainSigError {
    /// Input was rejected before any network call with side effects
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChainSigError::MissingSender
                | ChainSigError::ZeroAmount
                | ChainSigError::InvalidAmount { .. }
                | ChainSigError::Abi(_)
        )
    }

    /// Check if a fresh attempt by the caller could succeed unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainSigError::ChainConnection { .. }
                | ChainSigError::SignerUnavailable(_)
                | ChainSigError::SignerTimeout { .. }
        )
    }

    /// The signer was asked for a signature but nothing reached the chain
    pub fn signature_wasted(&self) -> bool {
        matches!(
            self,
            ChainSigError::SignerUnavailable(_)
                | ChainSigError::SignerTimeout { .. }
                | ChainSigError::MalformedSignature(_)
                | ChainSigError::RecoveryFailure { .. }
        )
    }
}

/// Result type for chainsig operations
pub type ChainSigResult<T> = Result<T, ChainSigError>;
