//! Delayed post-broadcast balance check

use super::builder::display_units;
use crate::chain::ChainStateReader;

use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Schedules one balance re-read per successful broadcast
pub struct ConfirmationMonitor {
    reader: Arc<dyn ChainStateReader>,
    delay: Duration,
    currency: String,
    decimals: u32,
}

impl ConfirmationMonitor {
    pub fn new(
        reader: Arc<dyn ChainStateReader>,
        delay: Duration,
        currency: impl Into<String>,
        decimals: u32,
    ) -> Self {
        Self {
            reader,
            delay,
            currency: currency.into(),
            decimals,
        }
    }

    /// Spawn the check and return immediately.
    ///
    /// The task only reads; any failure ends up as `None` in the handle.
    pub fn schedule(&self, address: Address) -> BalanceCheckHandle {
        let reader = self.reader.clone();
        let delay = self.delay;
        let currency = self.currency.clone();
        let decimals = self.decimals;

        info!("Fetching updated balance in {:?}", delay);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            match reader.get_balance(address).await {
                Ok(balance) => {
                    info!(
                        "Balance of {:?}: {} {}",
                        address,
                        display_units(balance, decimals),
                        currency
                    );
                    Some(balance)
                }
                Err(e) => {
                    warn!("Post-broadcast balance check failed: {}", e);
                    None
                }
            }
        });

        BalanceCheckHandle { handle }
    }
}

/// Handle to a scheduled balance check; dropping it leaves the check running
#[derive(Debug)]
pub struct BalanceCheckHandle {
    handle: JoinHandle<Option<U256>>,
}

impl BalanceCheckHandle {
    pub fn cancel(&self) {
        self.handle.abort();
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the check. Cancellation and failures yield `None`.
    pub async fn wait(&mut self) -> Option<U256> {
        match (&mut self.handle).await {
            Ok(balance) => balance,
            Err(e) if e.is_cancelled() => {
                debug!("Balance check cancelled");
                None
            }
            Err(e) => {
                error!("Balance check task failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainStateReader;
    use crate::error::ChainSigError;

    fn address() -> Address {
        "0x525521d79134822a342d330bd91da67976569af1".parse().unwrap()
    }

    fn monitor(reader: MockChainStateReader, delay: Duration) -> ConfirmationMonitor {
        ConfirmationMonitor::new(Arc::new(reader), delay, "ETH", 18)
    }

    #[tokio::test]
    async fn test_reports_balance_after_delay() {
        let mut reader = MockChainStateReader::new();
        reader
            .expect_get_balance()
            .times(1)
            .returning(|_| Ok(U256::from(42)));

        let mut check = monitor(reader, Duration::from_millis(10)).schedule(address());
        assert_eq!(check.wait().await, Some(U256::from(42)));
        assert!(check.is_finished());
    }

    #[tokio::test]
    async fn test_schedule_does_not_block_caller() {
        let mut reader = MockChainStateReader::new();
        reader.expect_get_balance().returning(|_| Ok(U256::one()));

        let check = monitor(reader, Duration::from_secs(3600)).schedule(address());
        assert!(!check.is_finished());
        check.cancel();
    }

    #[tokio::test]
    async fn test_read_failure_is_contained() {
        let mut reader = MockChainStateReader::new();
        reader.expect_get_balance().times(1).returning(|_| {
            Err(ChainSigError::ChainConnection {
                chain_id: 1,
                message: "down".to_string(),
            })
        });

        let mut check = monitor(reader, Duration::from_millis(1)).schedule(address());
        assert_eq!(check.wait().await, None);
    }

    #[tokio::test]
    async fn test_cancel_before_read() {
        let mut reader = MockChainStateReader::new();
        reader.expect_get_balance().never();

        let mut check = monitor(reader, Duration::from_secs(3600)).schedule(address());
        check.cancel();
        assert_eq!(check.wait().await, None);
    }

    struct PanickingReader;

    #[async_trait::async_trait]
    impl ChainStateReader for PanickingReader {
        async fn get_balance(&self, _address: Address) -> crate::error::ChainSigResult<U256> {
            panic!("reader exploded");
        }

        async fn get_transaction_count(
            &self,
            _address: Address,
        ) -> crate::error::ChainSigResult<U256> {
            Ok(U256::zero())
        }
    }

    #[tokio::test]
    async fn test_panicking_check_does_not_propagate() {
        let monitor = ConfirmationMonitor::new(
            Arc::new(PanickingReader),
            Duration::from_millis(1),
            "ETH",
            18,
        );
        let mut check = monitor.schedule(address());
        assert_eq!(check.wait().await, None);
    }
}
