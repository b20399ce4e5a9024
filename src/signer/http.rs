//! HTTP client for the threshold signer service

use super::{PayloadOrder, RawSignature, SignerClient};
use crate::config::SignerConfig;
use crate::error::{ChainSigError, ChainSigResult};
use crate::tx::SigningDigest;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Signer reached over `POST {url}/sign`
#[derive(Clone)]
pub struct HttpSignerClient {
    url: String,
    client: Client,
    payload_order: PayloadOrder,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest<'a> {
    payload: Vec<u8>,
    derivation_path: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    r: Option<String>,
    s: Option<String>,
}

impl SignResponse {
    fn into_signature(self) -> ChainSigResult<RawSignature> {
        match (self.r, self.s) {
            (Some(r), Some(s)) => RawSignature::from_hex(&r, &s),
            (None, _) => Err(ChainSigError::MalformedSignature(
                "response has no r".to_string(),
            )),
            (_, None) => Err(ChainSigError::MalformedSignature(
                "response has no s".to_string(),
            )),
        }
    }
}

impl HttpSignerClient {
    pub fn new(config: &SignerConfig) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            client: Client::new(),
            payload_order: config.payload_order,
        }
    }

    pub fn payload_order(&self) -> PayloadOrder {
        self.payload_order
    }
}

#[async_trait]
impl SignerClient for HttpSignerClient {
    async fn request_signature(
        &self,
        digest: SigningDigest,
        derivation_path: &str,
    ) -> ChainSigResult<RawSignature> {
        let url = format!("{}/sign", self.url);
        let body = SignRequest {
            payload: self.payload_order.encode(&digest).to_vec(),
            derivation_path,
        };

        debug!("Posting sign request to {} ({:?} payload)", url, self.payload_order);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainSigError::SignerUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("Signer rejected request: {} - {}", status, text);
            return Err(ChainSigError::SignerUnavailable(format!(
                "signer returned {}",
                status
            )));
        }

        let parsed: SignResponse = response
            .json()
            .await
            .map_err(|e| ChainSigError::MalformedSignature(e.to_string()))?;

        parsed.into_signature()
    }
}
