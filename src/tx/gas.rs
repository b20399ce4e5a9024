//! Gas price selection from an external fee feed

use crate::error::{ChainSigError, ChainSigResult};

use async_trait::async_trait;
use ethers::types::U256;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fee tiers offered by a feed, in wei; any tier may be missing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeQuote {
    pub rapid: Option<U256>,
    pub fast: Option<U256>,
    pub standard: Option<U256>,
}

impl FeeQuote {
    /// Highest non-zero tier. Faster inclusion is preferred over cost.
    pub fn conservative(&self) -> Option<U256> {
        [self.rapid, self.fast, self.standard]
            .into_iter()
            .flatten()
            .filter(|price| !price.is_zero())
            .max()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeeOracle: Send + Sync {
    async fn fee_quote(&self) -> ChainSigResult<FeeQuote>;
}

/// Feed speaking the gasnow format: `{"data": {"rapid": .., "fast": .., "standard": ..}}`
pub struct GasNowOracle {
    url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct GasNowResponse {
    data: GasNowTiers,
}

#[derive(Debug, Default, Deserialize)]
struct GasNowTiers {
    #[serde(default)]
    rapid: Option<f64>,
    #[serde(default)]
    fast: Option<f64>,
    #[serde(default)]
    standard: Option<f64>,
}

fn wei(tier: Option<f64>) -> Option<U256> {
    tier.filter(|v| v.is_finite() && *v >= 1.0)
        .map(|v| U256::from(v.round() as u128))
}

impl From<GasNowTiers> for FeeQuote {
    fn from(tiers: GasNowTiers) -> Self {
        Self {
            rapid: wei(tiers.rapid),
            fast: wei(tiers.fast),
            standard: wei(tiers.standard),
        }
    }
}

impl GasNowOracle {
    pub fn new(url: impl Into<String>) -> ChainSigResult<Self> {
        let url = url.into();
        reqwest::Url::parse(&url)
            .map_err(|e| ChainSigError::Config(format!("Invalid fee feed URL {}: {}", url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ChainSigError::Internal(e.to_string()))?;

        Ok(Self { url, client })
    }
}

#[async_trait]
impl FeeOracle for GasNowOracle {
    async fn fee_quote(&self) -> ChainSigResult<FeeQuote> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ChainSigError::GasEstimation(e.to_string()))?;

        let body: GasNowResponse = response
            .json()
            .await
            .map_err(|e| ChainSigError::GasEstimation(e.to_string()))?;

        Ok(body.data.into())
    }
}

/// Picks the gas price for a transaction, never failing the send
pub struct GasEstimator {
    oracle: Option<Arc<dyn FeeOracle>>,
    /// Used when the feed is absent, down, or returns nothing usable
    fallback: U256,
}

impl GasEstimator {
    pub fn new(oracle: Option<Arc<dyn FeeOracle>>, fallback: U256) -> Self {
        Self { oracle, fallback }
    }

    pub async fn gas_price(&self) -> U256 {
        let Some(oracle) = &self.oracle else {
            debug!("No fee feed configured, using fallback {} wei", self.fallback);
            return self.fallback;
        };

        match oracle.fee_quote().await {
            Ok(quote) => match quote.conservative() {
                Some(price) => {
                    debug!("Fee quote {:?} -> gas price {} wei", quote, price);
                    price
                }
                None => {
                    warn!(
                        "Fee feed returned no usable tier, using fallback {} wei",
                        self.fallback
                    );
                    self.fallback
                }
            },
            Err(e) => {
                warn!(
                    "Unable to get gas price ({}), using fallback {} wei",
                    e, self.fallback
                );
                self.fallback
            }
        }
    }

    /// Calculate total gas cost in wei
    pub fn calculate_cost(gas_limit: U256, gas_price: U256) -> U256 {
        gas_limit.saturating_mul(gas_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{http_stub, REFUSED_URL};

    fn gwei(n: u64) -> U256 {
        U256::from(n) * U256::exp10(9)
    }

    #[test]
    fn test_conservative_takes_maximum_tier() {
        let quote = FeeQuote {
            rapid: Some(gwei(12)),
            fast: Some(gwei(15)),
            standard: Some(gwei(9)),
        };
        assert_eq!(quote.conservative(), Some(gwei(15)));
    }

    #[test]
    fn test_conservative_skips_missing_and_zero_tiers() {
        let quote = FeeQuote {
            rapid: None,
            fast: Some(U256::zero()),
            standard: Some(gwei(3)),
        };
        assert_eq!(quote.conservative(), Some(gwei(3)));
        assert_eq!(FeeQuote::default().conservative(), None);
    }

    #[test]
    fn test_parse_gasnow_body() {
        let body: GasNowResponse = serde_json::from_str(
            r#"{"code": 200, "data": {"rapid": 1500000000, "fast": 1200000000.4, "standard": null, "timestamp": 1}}"#,
        )
        .unwrap();
        let quote = FeeQuote::from(body.data);

        assert_eq!(quote.rapid, Some(U256::from(1_500_000_000u64)));
        assert_eq!(quote.fast, Some(U256::from(1_200_000_000u64)));
        assert_eq!(quote.standard, None);
    }

    #[test]
    fn test_parse_gasnow_body_with_missing_tiers() {
        let body: GasNowResponse = serde_json::from_str(r#"{"data": {}}"#).unwrap();
        assert_eq!(FeeQuote::from(body.data).conservative(), None);
    }

    #[tokio::test]
    async fn test_uses_quote_when_usable() {
        let mut oracle = MockFeeOracle::new();
        oracle.expect_fee_quote().returning(|| {
            Ok(FeeQuote {
                rapid: Some(gwei(30)),
                fast: Some(gwei(20)),
                standard: Some(gwei(10)),
            })
        });

        let estimator = GasEstimator::new(Some(Arc::new(oracle)), gwei(1));
        assert_eq!(estimator.gas_price().await, gwei(30));
    }

    #[tokio::test]
    async fn test_empty_quote_falls_back() {
        let mut oracle = MockFeeOracle::new();
        oracle
            .expect_fee_quote()
            .returning(|| Ok(FeeQuote::default()));

        let estimator = GasEstimator::new(Some(Arc::new(oracle)), gwei(7));
        assert_eq!(estimator.gas_price().await, gwei(7));
    }

    #[tokio::test]
    async fn test_feed_error_falls_back() {
        let mut oracle = MockFeeOracle::new();
        oracle
            .expect_fee_quote()
            .returning(|| Err(ChainSigError::GasEstimation("feed down".to_string())));

        let estimator = GasEstimator::new(Some(Arc::new(oracle)), gwei(7));
        assert_eq!(estimator.gas_price().await, gwei(7));
    }

    #[tokio::test]
    async fn test_without_oracle_uses_fallback() {
        let estimator = GasEstimator::new(None, gwei(4));
        assert_eq!(estimator.gas_price().await, gwei(4));
    }

    #[test]
    fn test_rejects_invalid_feed_url() {
        assert!(matches!(
            GasNowOracle::new("not a url"),
            Err(ChainSigError::Config(_))
        ));
        assert!(GasNowOracle::new("https://sepolia.beaconcha.in/api/v1/execution/gasnow").is_ok());
    }

    #[test]
    fn test_calculate_cost() {
        assert_eq!(
            GasEstimator::calculate_cost(U256::from(21_000), gwei(10)),
            U256::from(210_000_000_000_000u64)
        );
    }

    #[tokio::test]
    async fn test_live_feed_quote() {
        let url = http_stub(|_| {
            (
                200,
                r#"{"code": 200, "data": {"rapid": 3000000000, "fast": 2000000000, "standard": 1000000000}}"#
                    .to_string(),
            )
        })
        .await;
        let oracle = GasNowOracle::new(url).unwrap();

        let quote = oracle.fee_quote().await.unwrap();
        assert_eq!(quote.rapid, Some(gwei(3)));
        assert_eq!(quote.standard, Some(gwei(1)));
        assert_eq!(quote.conservative(), Some(gwei(3)));
    }

    #[tokio::test]
    async fn test_live_feed_error_status() {
        let url = http_stub(|_| (503, r#"{"code": 503}"#.to_string())).await;
        let oracle = GasNowOracle::new(url).unwrap();

        assert!(matches!(
            oracle.fee_quote().await,
            Err(ChainSigError::GasEstimation(_))
        ));
    }

    #[tokio::test]
    async fn test_live_feed_unexpected_body() {
        let url = http_stub(|_| (200, r#"{"rapid": 3000000000}"#.to_string())).await;
        let oracle = GasNowOracle::new(url).unwrap();

        assert!(matches!(
            oracle.fee_quote().await,
            Err(ChainSigError::GasEstimation(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_feed_falls_back() {
        let oracle = GasNowOracle::new(REFUSED_URL).unwrap();
        assert!(matches!(
            oracle.fee_quote().await,
            Err(ChainSigError::GasEstimation(_))
        ));

        let estimator = GasEstimator::new(Some(Arc::new(oracle)), gwei(7));
        assert_eq!(estimator.gas_price().await, gwei(7));
    }
}
