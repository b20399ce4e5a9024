//! Shared fixtures for unit tests

use crate::config::{ChainConfig, SignerConfig};
use crate::error::{ChainSigError, ChainSigResult};
use crate::signer::{PayloadOrder, RawSignature, SignerClient};
use crate::tx::{SigningDigest, UnsignedTransaction};

use async_trait::async_trait;
use ethers::signers::LocalWallet;
use ethers::types::{Address, Bytes, U256};
use ethers::utils::keccak256;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Sender of the EIP-155 worked example
pub const SENDER_KEY: &str = "4646464646464646464646464646464646464646464646464646464646464646";
pub const OTHER_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

// EIP-155 worked example: nonce 9, 1 ether to 0x3535..35 at 20 gwei, chain 1
pub const EIP155_R: &str = "28ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276";
pub const EIP155_S: &str = "67cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83";
pub const EIP155_SENDER: &str = "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f";

pub fn eip155_example() -> (UnsignedTransaction, RawSignature, Address) {
    let tx = UnsignedTransaction::new(
        U256::from(9),
        Some("0x3535353535353535353535353535353535353535".parse().unwrap()),
        U256::exp10(18),
        Bytes::default(),
        U256::from(21_000),
        U256::from(20_000_000_000u64),
        1,
    );
    let raw = RawSignature::from_hex(EIP155_R, EIP155_S).unwrap();
    (tx, raw, EIP155_SENDER.parse().unwrap())
}

/// Sepolia at a 10 gwei fallback price, no fee feed
pub fn sepolia_config() -> ChainConfig {
    ChainConfig {
        chain_id: 11155111,
        name: "Sepolia".to_string(),
        currency: "ETH".to_string(),
        decimals: 18,
        rpc_urls: vec!["http://127.0.0.1:8545".to_string()],
        explorer: "https://sepolia.etherscan.io".to_string(),
        gas_limit: 21_000,
        deploy_gas_limit: 6_000_000,
        call_gas_limit: 1_000_000,
        fee_oracle_url: None,
        fallback_gas_price_gwei: 10,
        balance_check_delay_secs: 60,
        address: None,
        enabled: true,
    }
}

pub fn signer_config() -> SignerConfig {
    SignerConfig {
        url: "http://127.0.0.1:3000".to_string(),
        derivation_path: "ethereum-1".to_string(),
        timeout_secs: 60,
        payload_order: PayloadOrder::Reversed,
    }
}

pub fn wallet(key: &str) -> LocalWallet {
    key.parse().unwrap()
}

pub fn digest_of(data: &[u8]) -> SigningDigest {
    SigningDigest::from(keccak256(data))
}

/// Stand-in for the threshold signer holding `wallet`'s key.
///
/// The client half puts `client_order.encode(digest)` on the wire; the
/// service half signs `service_order.decode(payload)`.
pub struct WalletSigner {
    wallet: LocalWallet,
    client_order: PayloadOrder,
    service_order: PayloadOrder,
    calls: AtomicUsize,
}

impl WalletSigner {
    pub fn new(wallet: LocalWallet) -> Self {
        Self::with_orders(wallet, PayloadOrder::Reversed, PayloadOrder::Reversed)
    }

    pub fn with_orders(
        wallet: LocalWallet,
        client_order: PayloadOrder,
        service_order: PayloadOrder,
    ) -> Self {
        Self {
            wallet,
            client_order,
            service_order,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignerClient for WalletSigner {
    async fn request_signature(
        &self,
        digest: SigningDigest,
        _derivation_path: &str,
    ) -> ChainSigResult<RawSignature> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let payload = self.client_order.encode(&digest);
        let signed = self.service_order.decode(payload);
        let sig = self
            .wallet
            .sign_hash(signed.to_h256())
            .map_err(|e| ChainSigError::Internal(e.to_string()))?;

        Ok(RawSignature { r: sig.r, s: sig.s })
    }
}

/// Nothing listens here; connections are refused immediately
pub const REFUSED_URL: &str = "http://127.0.0.1:1";

/// Serve HTTP on a random local port. `respond` maps each request body to a
/// status code and a JSON reply body. Returns the base URL.
pub async fn http_stub<F>(respond: F) -> String
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let respond = respond.clone();
            tokio::spawn(async move {
                let body = read_request_body(&mut socket).await;
                let (status, reply) = respond(&body);
                let response = format!(
                    "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    reply.len(),
                    reply
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

/// JSON-RPC node answering every call with `result`
pub async fn rpc_stub(result: &'static str) -> String {
    http_stub(move |body| {
        let id = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("id").cloned())
            .unwrap_or(serde_json::Value::from(1));
        let reply = serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result });
        (200, reply.to_string())
    })
    .await
}

async fn read_request_body(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return String::new(),
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let start = end + 4;
        if buf.len() >= start + length {
            return String::from_utf8_lossy(&buf[start..start + length]).into_owned();
        }
    }
}
