// src/rpc.rs
use std::sync::Arc;

use ethers::types::Address;
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::actions::{Contribute, CreatePool, ExecutePurchase, SponsorTransfer};
use crate::amount::format_full;
use crate::chain::{PoolInfo, TokenMetadata};
use crate::error::ChainError;
use crate::orchestrator::{ActionResponse, Orchestrator};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolResponse {
    pub success: bool,
    pub pool_address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_token: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_contributed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<PoolInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfoResponse {
    pub success: bool,
    pub account_address: Address,
    pub network: String,
    pub chain_id: u64,
    pub token: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
    pub max_gas_per_operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sponsored ChipIn actions. Failures are reported inside the result object.
#[rpc(server, namespace = "chipin")]
pub trait ChipInApi {
    #[method(name = "createPool")]
    async fn create_pool(&self, request: CreatePool) -> RpcResult<ActionResponse>;

    #[method(name = "contribute")]
    async fn contribute(&self, request: Contribute) -> RpcResult<ActionResponse>;

    #[method(name = "executePurchase")]
    async fn execute_purchase(&self, request: ExecutePurchase) -> RpcResult<ActionResponse>;

    #[method(name = "sponsorTransfer")]
    async fn sponsor_transfer(&self, request: SponsorTransfer) -> RpcResult<ActionResponse>;

    #[method(name = "getPool")]
    async fn get_pool(&self, pool: Address) -> RpcResult<PoolResponse>;

    #[method(name = "accountInfo")]
    async fn account_info(&self) -> RpcResult<AccountInfoResponse>;
}

pub struct ChipInRpcImpl {
    orchestrator: Arc<Orchestrator>,
}

impl ChipInRpcImpl {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    async fn gas_token(&self) -> Result<TokenMetadata, ChainError> {
        let usdc = self.orchestrator.config().network.usdc;
        self.orchestrator.chain().token_metadata(usdc).await
    }
}

#[async_trait]
impl ChipInApiServer for ChipInRpcImpl {
    async fn create_pool(&self, request: CreatePool) -> RpcResult<ActionResponse> {
        debug!(title = ?request.title, "Received createPool request");
        Ok(self.orchestrator.run(&request).await)
    }

    async fn contribute(&self, request: Contribute) -> RpcResult<ActionResponse> {
        debug!(pool = ?request.pool_address, amount = ?request.amount, "Received contribute request");
        Ok(self.orchestrator.run(&request).await)
    }

    async fn execute_purchase(&self, request: ExecutePurchase) -> RpcResult<ActionResponse> {
        debug!(pool_id = ?request.pool_id, "Received executePurchase request");
        Ok(self.orchestrator.run(&request).await)
    }

    async fn sponsor_transfer(&self, request: SponsorTransfer) -> RpcResult<ActionResponse> {
        debug!(to = ?request.to, amount = ?request.amount, "Received sponsorTransfer request");
        Ok(self.orchestrator.run(&request).await)
    }

    async fn get_pool(&self, pool: Address) -> RpcResult<PoolResponse> {
        let chain = self.orchestrator.chain();
        let read = async {
            let (info, target_token, token) = tokio::try_join!(
                chain.pool_info(pool),
                chain.pool_target_token(pool),
                self.gas_token(),
            )?;
            Ok::<_, ChainError>((info, target_token, token))
        };

        let response = match read.await {
            Ok((info, target_token, token)) => PoolResponse {
                success: true,
                pool_address: pool,
                target_token: Some(target_token),
                target_amount: Some(format_full(info.target_amount, token.decimals)),
                total_contributed: Some(format_full(info.total_contributed, token.decimals)),
                info: Some(info),
                error: None,
            },
            Err(err) => {
                warn!(?pool, %err, "Pool read failed");
                PoolResponse {
                    success: false,
                    pool_address: pool,
                    target_token: None,
                    target_amount: None,
                    total_contributed: None,
                    info: None,
                    error: Some(err.to_string()),
                }
            }
        };
        Ok(response)
    }

    async fn account_info(&self) -> RpcResult<AccountInfoResponse> {
        let config = self.orchestrator.config();
        let account = self.orchestrator.account_address();
        let chain = self.orchestrator.chain();
        let ceiling = config.gas.max_gas_token_amount;

        let read = async {
            let (token, balance, deployed) = tokio::try_join!(
                self.gas_token(),
                chain.balance_of(config.network.usdc, account),
                chain.has_code(account),
            )?;
            Ok::<_, ChainError>((token, balance, deployed))
        };

        let mut response = AccountInfoResponse {
            success: true,
            account_address: account,
            network: config.network.network.to_string(),
            chain_id: config.network.chain_id,
            token: config.network.usdc,
            balance: None,
            max_gas_per_operation: ceiling.to_string(),
            deployed: None,
            error: None,
        };
        match read.await {
            Ok((token, balance, deployed)) => {
                response.balance = Some(format!("{} {}", format_full(balance, token.decimals), token.symbol));
                response.max_gas_per_operation =
                    format!("{} {}", format_full(ceiling, token.decimals), token.symbol);
                response.deployed = Some(deployed);
            }
            Err(err) => {
                warn!(%err, "Account read failed");
                response.success = false;
                response.error = Some(err.to_string());
            }
        }
        Ok(response)
    }
}
