// src/bundler.rs
//! ERC-4337 bundler JSON-RPC client.
use std::fmt::Debug;

use async_trait::async_trait;
use ethers::providers::{Http, Provider, ProviderError, RpcError};
use ethers::types::{Address, H256};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};
use url::Url;

use crate::error::BundlerError;
use crate::types::{GasEstimate, GasPriceTiers, UserOperation, UserOperationReceipt};

pub const ESTIMATE_USER_OPERATION_GAS: &str = "eth_estimateUserOperationGas";
pub const SEND_USER_OPERATION: &str = "eth_sendUserOperation";
pub const GET_USER_OPERATION_RECEIPT: &str = "eth_getUserOperationReceipt";
pub const USER_OPERATION_GAS_PRICE: &str = "pimlico_getUserOperationGasPrice";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Bundler: Send + Sync {
    async fn estimate_user_operation_gas(
        &self,
        user_op: &UserOperation,
        entry_point: Address,
    ) -> Result<GasEstimate, BundlerError>;

    async fn send_user_operation(
        &self,
        user_op: &UserOperation,
        entry_point: Address,
    ) -> Result<H256, BundlerError>;

    /// `None` until the operation is included in a bundle.
    async fn get_user_operation_receipt(
        &self,
        user_op_hash: H256,
    ) -> Result<Option<UserOperationReceipt>, BundlerError>;

    async fn user_operation_gas_price(&self) -> Result<GasPriceTiers, BundlerError>;
}

pub struct BundlerClient {
    provider: Provider<Http>,
}

impl BundlerClient {
    pub fn new(url: Url) -> Self {
        Self {
            provider: Provider::new(Http::new(url)),
        }
    }

    async fn request<P, R>(&self, method: &'static str, params: P) -> Result<R, BundlerError>
    where
        P: Debug + Serialize + Send + Sync,
        R: Debug + Serialize + DeserializeOwned + Send,
    {
        trace!(method, ?params, "Bundler request");
        self.provider
            .request(method, params)
            .await
            .map_err(|err| classify(method, err))
    }
}

fn classify(method: &'static str, err: ProviderError) -> BundlerError {
    if let Some(response) = err.as_error_response() {
        return BundlerError::rejected(
            method,
            response.code,
            response.message.clone(),
            response.data.clone(),
        );
    }
    if let Some(serde_err) = err.as_serde_error() {
        return BundlerError::InvalidResponse {
            method,
            message: serde_err.to_string(),
        };
    }
    BundlerError::Transport {
        method,
        message: err.to_string(),
    }
}

#[async_trait]
impl Bundler for BundlerClient {
    async fn estimate_user_operation_gas(
        &self,
        user_op: &UserOperation,
        entry_point: Address,
    ) -> Result<GasEstimate, BundlerError> {
        let estimate: GasEstimate = self
            .request(ESTIMATE_USER_OPERATION_GAS, (user_op, entry_point))
            .await?;
        debug!(?estimate, "Estimated user operation gas");
        Ok(estimate)
    }

    async fn send_user_operation(
        &self,
        user_op: &UserOperation,
        entry_point: Address,
    ) -> Result<H256, BundlerError> {
        self.request(SEND_USER_OPERATION, (user_op, entry_point)).await
    }

    async fn get_user_operation_receipt(
        &self,
        user_op_hash: H256,
    ) -> Result<Option<UserOperationReceipt>, BundlerError> {
        self.request(GET_USER_OPERATION_RECEIPT, [user_op_hash]).await
    }

    async fn user_operation_gas_price(&self) -> Result<GasPriceTiers, BundlerError> {
        self.request(USER_OPERATION_GAS_PRICE, ()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EntryPointError;
    use ethers::types::U256;
    use httpmock::prelude::*;
    use serde_json::{json, Value};

    fn ok(result: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": 1, "result": result })
    }

    fn client(server: &MockServer) -> BundlerClient {
        BundlerClient::new(Url::parse(&server.url("/")).unwrap())
    }

    #[tokio::test]
    async fn reads_gas_price_tiers() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).body_contains(USER_OPERATION_GAS_PRICE);
                then.status(200).json_body(ok(json!({
                    "slow": { "maxFeePerGas": "0x64", "maxPriorityFeePerGas": "0x1" },
                    "standard": { "maxFeePerGas": "0xc8", "maxPriorityFeePerGas": "0x2" },
                    "fast": { "maxFeePerGas": "0x12c", "maxPriorityFeePerGas": "0x3" }
                })));
            })
            .await;

        let tiers = client(&server).user_operation_gas_price().await.unwrap();
        mock.assert_async().await;
        assert_eq!(tiers.standard.max_fee_per_gas, U256::from(200u64));
        assert_eq!(tiers.standard.max_priority_fee_per_gas, U256::from(2u64));
    }

    #[tokio::test]
    async fn estimation_rejection_carries_entry_point_code() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).body_contains(ESTIMATE_USER_OPERATION_GAS);
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": {
                        "code": -32500,
                        "message": "UserOperation reverted during simulation with reason: AA33 reverted"
                    }
                }));
            })
            .await;

        let err = client(&server)
            .estimate_user_operation_gas(&UserOperation::default(), Address::repeat_byte(0x71))
            .await
            .unwrap_err();
        assert_eq!(
            err.entry_point_error(),
            Some(EntryPointError::PaymasterValidationReverted)
        );
        assert!(matches!(err, BundlerError::Rejected { code: -32500, .. }));
    }

    #[tokio::test]
    async fn send_returns_user_operation_hash() {
        let server = MockServer::start_async().await;
        let hash = H256::repeat_byte(0xab);
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .body_contains(SEND_USER_OPERATION)
                    .body_contains("callGasLimit");
                then.status(200).json_body(ok(json!(format!("{hash:?}"))));
            })
            .await;

        let sent = client(&server)
            .send_user_operation(&UserOperation::default(), Address::repeat_byte(0x71))
            .await
            .unwrap();
        assert_eq!(sent, hash);
    }

    #[tokio::test]
    async fn pending_receipt_reads_as_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).body_contains(GET_USER_OPERATION_RECEIPT);
                then.status(200).json_body(ok(Value::Null));
            })
            .await;

        let receipt = client(&server)
            .get_user_operation_receipt(H256::repeat_byte(0xab))
            .await
            .unwrap();
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn unreachable_bundler_is_a_transport_error() {
        let bundler = BundlerClient::new(Url::parse("http://127.0.0.1:1/").unwrap());
        let err = bundler.user_operation_gas_price().await.unwrap_err();
        assert!(matches!(err, BundlerError::Transport { .. }));
        assert_eq!(err.entry_point_error(), None);
    }
}
