//! Contract calls from human-readable signatures
//!
//! `balanceOf(address)` plus string arguments become calldata; return data
//! of a read-only call decodes back into tokens for display.

use crate::error::{ChainSigError, ChainSigResult};

use ethers::abi::token::{LenientTokenizer, Tokenizer};
use ethers::abi::{parse_abi, Function, Token};
use ethers::types::{Bytes, I256};
use ethers::utils::to_checksum;
use tracing::debug;

/// One function invocation with its arguments already tokenized
#[derive(Debug, Clone)]
pub struct ContractCall {
    function: Function,
    args: Vec<Token>,
}

impl ContractCall {
    /// Parse `signature` (e.g. `transfer(address,uint256)`) with optional
    /// return types and tokenize `args` against its inputs
    pub fn parse(signature: &str, returns: &[String], args: &[String]) -> ChainSigResult<Self> {
        let signature = signature.trim();
        let signature = signature.strip_prefix("function ").unwrap_or(signature);

        let mut line = format!("function {}", signature);
        if !returns.is_empty() {
            line.push_str(&format!(" returns ({})", returns.join(",")));
        }

        let abi = parse_abi(&[line.as_str()])
            .map_err(|e| ChainSigError::Abi(format!("invalid signature {:?}: {}", signature, e)))?;
        let function = abi
            .functions()
            .next()
            .cloned()
            .ok_or_else(|| ChainSigError::Abi(format!("no function in {:?}", signature)))?;

        if function.inputs.len() != args.len() {
            return Err(ChainSigError::Abi(format!(
                "{} takes {} argument(s), got {}",
                function.name,
                function.inputs.len(),
                args.len()
            )));
        }

        let args = function
            .inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                LenientTokenizer::tokenize(&param.kind, arg).map_err(|e| {
                    ChainSigError::Abi(format!(
                        "argument {:?} is not a valid {}: {}",
                        arg, param.kind, e
                    ))
                })
            })
            .collect::<ChainSigResult<Vec<_>>>()?;

        debug!("Parsed call to {} with {} argument(s)", function.signature(), args.len());

        Ok(Self { function, args })
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Selector followed by the ABI-encoded arguments
    pub fn calldata(&self) -> ChainSigResult<Bytes> {
        self.function
            .encode_input(&self.args)
            .map(Bytes::from)
            .map_err(|e| ChainSigError::Abi(format!("failed to encode {}: {}", self.name(), e)))
    }

    pub fn decode_output(&self, output: &[u8]) -> ChainSigResult<Vec<Token>> {
        self.function
            .decode_output(output)
            .map_err(|e| ChainSigError::Abi(format!("failed to decode {} output: {}", self.name(), e)))
    }
}

/// Render a token the way a user typed it: decimal integers, checksummed
/// addresses, 0x-prefixed bytes
pub fn format_token(token: &Token) -> String {
    match token {
        Token::Uint(value) => value.to_string(),
        Token::Int(value) => I256::from_raw(*value).to_string(),
        Token::Address(address) => to_checksum(address, None),
        Token::Bytes(bytes) | Token::FixedBytes(bytes) => format!("0x{}", hex::encode(bytes)),
        Token::Array(items) | Token::FixedArray(items) => format!(
            "[{}]",
            items.iter().map(format_token).collect::<Vec<_>>().join(", ")
        ),
        Token::Tuple(items) => format!(
            "({})",
            items.iter().map(format_token).collect::<Vec<_>>().join(", ")
        ),
        other => other.to_string(),
    }
}
