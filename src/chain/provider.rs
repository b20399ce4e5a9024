//! Chain provider with multi-RPC support and automatic failover

use super::{ChainStateReader, ContractReader};
use crate::config::ChainConfig;
use crate::error::{ChainSigError, ChainSigResult};
use crate::tx::Broadcaster;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Index reads start from
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: ChainConfig) -> ChainSigResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(ChainSigError::ChainConnection {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        info!(
            "Chain {} (ID: {}) using {} RPC endpoint(s)",
            config.name,
            config.chain_id,
            http_providers.len()
        );

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    fn active_index(&self) -> usize {
        self.current_provider.load(Ordering::Acquire) % self.http_providers.len()
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        &self.http_providers[self.active_index()]
    }

    /// Move the active provider past `failed`. A no-op when a concurrent
    /// caller has already moved it.
    fn failover_from(&self, failed: usize) {
        let next = (failed + 1) % self.http_providers.len();
        if self
            .current_provider
            .compare_exchange(failed, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            warn!(
                "Chain {} failover to provider {}",
                self.config.chain_id, next
            );
        }
    }

    /// Run `read` against each provider once, starting at the active one
    async fn read_with_failover<T, F, Fut>(&self, what: &str, read: F) -> ChainSigResult<T>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let len = self.http_providers.len();
        let start = self.active_index();

        for offset in 0..len {
            let idx = (start + offset) % len;
            match read(self.http_providers[idx].clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        "Failed to get {} from chain {} via provider {}: {}",
                        what, self.config.chain_id, idx, e
                    );
                    self.failover_from(idx);
                }
            }
        }

        Err(self.connection_error(format!("All providers failed to get {}", what)))
    }

    fn connection_error(&self, message: impl Into<String>) -> ChainSigError {
        ChainSigError::ChainConnection {
            chain_id: self.config.chain_id,
            message: message.into(),
        }
    }
}

#[async_trait]
impl ChainStateReader for ChainProvider {
    async fn get_balance(&self, address: Address) -> ChainSigResult<U256> {
        self.read_with_failover("balance", |provider| async move {
            provider.get_balance(address, None).await
        })
        .await
    }

    async fn get_transaction_count(&self, address: Address) -> ChainSigResult<U256> {
        self.read_with_failover("nonce", |provider| async move {
            provider.get_transaction_count(address, None).await
        })
        .await
    }
}

#[async_trait]
impl ContractReader for ChainProvider {
    async fn call(&self, to: Address, data: Bytes) -> ChainSigResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();

        self.read_with_failover("call result", |provider| {
            let tx = tx.clone();
            async move { provider.call(&tx, None).await }
        })
        .await
    }
}

#[async_trait]
impl Broadcaster for ChainProvider {
    async fn send_raw_transaction(&self, raw: Bytes) -> ChainSigResult<H256> {
        // One request against the active endpoint; a second send could
        // double-submit, so no failover here.
        let pending = self
            .http()
            .send_raw_transaction(raw)
            .await
            .map_err(|e| self.connection_error(e.to_string()))?;

        Ok(pending.tx_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{rpc_stub, sepolia_config, REFUSED_URL};

    fn config(rpc_urls: Vec<&str>) -> ChainConfig {
        ChainConfig {
            rpc_urls: rpc_urls.into_iter().map(String::from).collect(),
            ..sepolia_config()
        }
    }

    #[test]
    fn test_rejects_config_without_valid_urls() {
        let result = ChainProvider::new(config(vec!["not a url"]));
        assert!(matches!(
            result,
            Err(ChainSigError::ChainConnection { chain_id: 11155111, .. })
        ));
    }

    #[test]
    fn test_failover_only_moves_from_the_active_provider() {
        let provider = ChainProvider::new(config(vec![
            "http://127.0.0.1:8545",
            "http://127.0.0.1:8546",
        ]))
        .unwrap();

        assert_eq!(provider.active_index(), 0);
        provider.failover_from(0);
        assert_eq!(provider.active_index(), 1);

        // A second caller that also saw provider 0 fail must not move it back
        provider.failover_from(0);
        assert_eq!(provider.active_index(), 1);

        provider.failover_from(1);
        assert_eq!(provider.active_index(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_reads_fail_over_to_healthy_url() {
        let healthy = rpc_stub("0x5").await;
        let provider = ChainProvider::new(config(vec![REFUSED_URL, &healthy])).unwrap();
        let address = Address::zero();

        let (nonce, balance) = tokio::join!(
            provider.get_transaction_count(address),
            provider.get_balance(address)
        );

        assert_eq!(nonce.unwrap(), U256::from(5));
        assert_eq!(balance.unwrap(), U256::from(5));
        assert_eq!(provider.active_index(), 1);
    }

    #[tokio::test]
    async fn test_read_fails_when_every_url_fails() {
        let provider = ChainProvider::new(config(vec![REFUSED_URL, REFUSED_URL])).unwrap();

        match provider.get_balance(Address::zero()).await {
            Err(ChainSigError::ChainConnection { message, .. }) => {
                assert_eq!(message, "All providers failed to get balance");
            }
            other => panic!("expected connection error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_contract_call_returns_raw_output() {
        let healthy =
            rpc_stub("0x000000000000000000000000000000000000000000000000000000000000002a").await;
        let provider = ChainProvider::new(config(vec![REFUSED_URL, &healthy])).unwrap();

        let output = provider
            .call(Address::zero(), Bytes::from(vec![0x70, 0xa0, 0x82, 0x31]))
            .await
            .unwrap();
        assert_eq!(output.len(), 32);
        assert_eq!(output[31], 0x2a);
    }

    #[tokio::test]
    async fn test_broadcast_is_not_retried_on_another_url() {
        let healthy =
            rpc_stub("0x1111111111111111111111111111111111111111111111111111111111111111").await;
        let provider = ChainProvider::new(config(vec![REFUSED_URL, &healthy])).unwrap();

        let result = provider
            .send_raw_transaction(Bytes::from(vec![0xf8, 0x6c]))
            .await;
        assert!(matches!(result, Err(ChainSigError::ChainConnection { .. })));
        assert_eq!(provider.active_index(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_returns_node_hash() {
        let healthy =
            rpc_stub("0x1111111111111111111111111111111111111111111111111111111111111111").await;
        let provider = ChainProvider::new(config(vec![&healthy])).unwrap();

        let hash = provider
            .send_raw_transaction(Bytes::from(vec![0xf8, 0x6c]))
            .await
            .unwrap();
        assert_eq!(hash, H256::repeat_byte(0x11));
    }
}
