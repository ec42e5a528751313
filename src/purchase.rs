// src/purchase.rs
//! Strategies that turn a funded pool into the calls buying its target token.
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::chain::ChainReader;
use crate::config::{Config, PurchaseStrategyKind};
use crate::contracts::chip_in_factory::{ExecuteAggregatorSwapCall, ExecutePoolSwapCall};
use crate::error::{ConfigError, SwapError};
use crate::types::Call;

const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub factory: Address,
    pub pool_id: U256,
    pub usdc: Address,
    pub target_token: Address,
    /// Pool funds to swap, in USDC base units.
    pub usdc_amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseQuote {
    pub calls: Vec<Call>,
    pub expected_out: U256,
    pub min_out: U256,
    /// Target tokens per USDC, when the strategy publishes one.
    pub exchange_rate: Option<U256>,
}

#[async_trait]
pub trait PurchaseStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn quote(
        &self,
        chain: &dyn ChainReader,
        request: &PurchaseRequest,
    ) -> Result<PurchaseQuote, SwapError>;
}

pub fn from_config(config: &Config) -> Result<Arc<dyn PurchaseStrategy>, ConfigError> {
    match config.purchase.kind {
        PurchaseStrategyKind::Mock => Ok(Arc::new(MockSwap)),
        PurchaseStrategyKind::Aggregator => {
            let (Some(url), Some(api_key)) = (
                config.purchase.aggregator_url.clone(),
                config.purchase.aggregator_api_key.clone(),
            ) else {
                return Err(ConfigError::MissingAggregatorSettings);
            };
            Ok(Arc::new(AggregatorSwap::new(
                url,
                api_key,
                config.network.chain_id,
                config.purchase.slippage_bps,
            )))
        }
    }
}

/// Swap executed by the factory at its configured exchange rate.
pub struct MockSwap;

#[async_trait]
impl PurchaseStrategy for MockSwap {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn quote(
        &self,
        chain: &dyn ChainReader,
        request: &PurchaseRequest,
    ) -> Result<PurchaseQuote, SwapError> {
        let (expected_out, rate) = tokio::try_join!(
            chain.preview_swap(request.factory, request.target_token, request.usdc_amount),
            chain.exchange_rate(request.factory, request.target_token),
        )?;
        if rate.is_zero() {
            return Err(SwapError::Quote(format!(
                "no exchange rate configured for {:?}",
                request.target_token
            )));
        }

        Ok(PurchaseQuote {
            calls: vec![Call::new(
                request.factory,
                ExecutePoolSwapCall {
                    pool_id: request.pool_id,
                },
            )],
            expected_out,
            min_out: expected_out,
            exchange_rate: Some(rate),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    dst_amount: String,
    tx: SwapTransaction,
}

#[derive(Debug, Deserialize)]
struct SwapTransaction {
    to: Address,
    data: Bytes,
}

/// Swap routed through a 1inch-compatible aggregator, executed by the factory.
pub struct AggregatorSwap {
    http: Client,
    base_url: Url,
    api_key: String,
    chain_id: u64,
    slippage_bps: u16,
}

impl AggregatorSwap {
    pub fn new(base_url: Url, api_key: String, chain_id: u64, slippage_bps: u16) -> Self {
        Self {
            http: Client::new(),
            base_url,
            api_key,
            chain_id,
            slippage_bps: slippage_bps.min(BPS_DENOMINATOR as u16),
        }
    }

    fn min_out(&self, expected_out: U256) -> U256 {
        expected_out * U256::from(BPS_DENOMINATOR - u64::from(self.slippage_bps))
            / U256::from(BPS_DENOMINATOR)
    }
}

#[async_trait]
impl PurchaseStrategy for AggregatorSwap {
    fn name(&self) -> &'static str {
        "aggregator"
    }

    async fn quote(
        &self,
        _chain: &dyn ChainReader,
        request: &PurchaseRequest,
    ) -> Result<PurchaseQuote, SwapError> {
        let url = format!(
            "{}/swap/v6.0/{}/swap",
            self.base_url.as_str().trim_end_matches('/'),
            self.chain_id
        );
        let slippage = format!("{}", f64::from(self.slippage_bps) / 100.0);
        let factory = format!("{:?}", request.factory);
        debug!(%url, amount = %request.usdc_amount, "Requesting aggregator swap");

        let response: SwapResponse = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[
                ("src", format!("{:?}", request.usdc)),
                ("dst", format!("{:?}", request.target_token)),
                ("amount", request.usdc_amount.to_string()),
                ("from", factory.clone()),
                ("origin", factory),
                ("slippage", slippage),
                ("disableEstimate", "true".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let expected_out = U256::from_dec_str(&response.dst_amount)
            .map_err(|e| SwapError::Quote(format!("dstAmount {}: {e:?}", response.dst_amount)))?;
        if expected_out.is_zero() || response.tx.data.is_empty() {
            return Err(SwapError::Quote("empty swap route".into()));
        }
        let min_out = self.min_out(expected_out);
        info!(
            router = ?response.tx.to,
            %expected_out,
            %min_out,
            "Aggregator route found"
        );

        Ok(PurchaseQuote {
            calls: vec![Call::new(
                request.factory,
                ExecuteAggregatorSwapCall {
                    pool_id: request.pool_id,
                    min_amount_out: min_out,
                    swap_data: response.tx.data,
                },
            )],
            expected_out,
            min_out,
            exchange_rate: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainReader;
    use crate::config::Network;
    use ethers::contract::EthCall;
    use httpmock::prelude::*;
    use serde_json::json;

    fn request() -> PurchaseRequest {
        PurchaseRequest {
            factory: Address::repeat_byte(0x10),
            pool_id: U256::from(4u64),
            usdc: Address::repeat_byte(0x75),
            target_token: Address::repeat_byte(0x99),
            usdc_amount: U256::from(100_000_000u64),
        }
    }

    #[tokio::test]
    async fn mock_swap_calls_factory_with_pool_id() {
        let mut chain = MockChainReader::new();
        chain
            .expect_preview_swap()
            .returning(|_, _, _| Ok(U256::exp10(18) * 50));
        chain
            .expect_exchange_rate()
            .returning(|_, _| Ok(U256::exp10(17) * 5));

        let quote = MockSwap.quote(&chain, &request()).await.unwrap();
        assert_eq!(quote.expected_out, U256::exp10(18) * 50);
        assert_eq!(quote.calls.len(), 1);
        assert_eq!(quote.calls[0].to, Address::repeat_byte(0x10));
        assert_eq!(&quote.calls[0].data[..4], &ExecutePoolSwapCall::selector());
    }

    #[tokio::test]
    async fn mock_swap_requires_a_rate() {
        let mut chain = MockChainReader::new();
        chain.expect_preview_swap().returning(|_, _, _| Ok(U256::zero()));
        chain.expect_exchange_rate().returning(|_, _| Ok(U256::zero()));

        let err = MockSwap.quote(&chain, &request()).await.unwrap_err();
        assert!(matches!(err, SwapError::Quote(_)));
    }

    #[tokio::test]
    async fn aggregator_applies_slippage_to_quote() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/swap/v6.0/421614/swap")
                    .query_param("amount", "100000000")
                    .query_param("from", format!("{:?}", Address::repeat_byte(0x10)))
                    .header("authorization", "Bearer secret");
                then.status(200).json_body(json!({
                    "dstAmount": "50000000000000000000",
                    "tx": {
                        "from": format!("{:?}", Address::repeat_byte(0x10)),
                        "to": format!("{:?}", Address::repeat_byte(0x11)),
                        "data": "0x12aa3caf00",
                        "value": "0"
                    }
                }));
            })
            .await;

        let swap = AggregatorSwap::new(Url::parse(&server.base_url()).unwrap(), "secret".into(), 421614, 100);
        let quote = swap.quote(&MockChainReader::new(), &request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(quote.expected_out, U256::exp10(18) * 50);
        assert_eq!(quote.min_out, U256::exp10(17) * 495);
        assert_eq!(&quote.calls[0].data[..4], &ExecuteAggregatorSwapCall::selector());
    }

    #[tokio::test]
    async fn aggregator_http_error_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(400).json_body(json!({ "error": "insufficient liquidity" }));
            })
            .await;

        let swap = AggregatorSwap::new(Url::parse(&server.base_url()).unwrap(), "secret".into(), 421614, 100);
        let err = swap.quote(&MockChainReader::new(), &request()).await.unwrap_err();
        assert!(matches!(err, SwapError::Http(_)));
    }

    #[test]
    fn aggregator_requires_url_and_key() {
        let mut config = Config::for_network(Network::ArbitrumSepolia).unwrap();
        config.purchase.kind = PurchaseStrategyKind::Aggregator;
        assert!(matches!(
            from_config(&config).err(),
            Some(ConfigError::MissingAggregatorSettings)
        ));

        config.purchase.aggregator_url = Some(Url::parse("https://api.1inch.dev").unwrap());
        config.purchase.aggregator_api_key = Some("key".into());
        assert_eq!(from_config(&config).unwrap().name(), "aggregator");
    }
}
