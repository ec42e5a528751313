// src/actions/create_pool.rs
use async_trait::async_trait;
use ethers::contract::parse_log;
use ethers::types::{Address, U256};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::{unreadable, Action, ActionContext, ActionPlan, Field};
use crate::amount::format_full;
use crate::contracts::chip_in_factory::{CreatePoolCall, PoolCreatedFilter};
use crate::error::ChipInError;
use crate::types::{Call, OperationReceipt};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePool {
    #[serde(default)]
    pub title: Field<String>,
    #[serde(default)]
    pub description: Field<String>,
    #[serde(default)]
    pub target_amount: Field<U256>,
    #[serde(default)]
    pub target_token: Field<Address>,
    /// Unix timestamp, seconds.
    #[serde(default)]
    pub deadline: Field<u64>,
    #[serde(default)]
    pub max_contributors: Field<u64>,
}

/// A validated `createPool` request.
struct PoolParams {
    title: String,
    description: String,
    target_amount: U256,
    target_token: Address,
    deadline: u64,
    max_contributors: u64,
}

impl CreatePool {
    fn params(&self, now: u64) -> Result<PoolParams, ChipInError> {
        let title = self.title.value("title")?.unwrap_or_default();
        let description = self.description.value("description")?.unwrap_or_default();
        let target_amount = self.target_amount.value("target amount")?.unwrap_or_default();
        let target_token = self.target_token.value("target token")?;
        let deadline = self.deadline.value("deadline")?.unwrap_or_default();
        let max_contributors = self.max_contributors.value("max contributors")?.unwrap_or_default();

        if title.trim().is_empty()
            || description.trim().is_empty()
            || target_amount.is_zero()
            || deadline == 0
            || max_contributors == 0
        {
            return Err(ChipInError::invalid_input(
                "Missing required fields: title, description, targetAmount, deadline, maxContributors",
            ));
        }
        let target_token = match target_token {
            Some(token) if !token.is_zero() => token,
            _ => return Err(ChipInError::invalid_input("A target token address is required")),
        };
        if deadline <= now {
            return Err(ChipInError::invalid_input("Deadline must be in the future"));
        }
        Ok(PoolParams {
            title,
            description,
            target_amount,
            target_token,
            deadline,
            max_contributors,
        })
    }
}

#[async_trait]
impl Action for CreatePool {
    fn name(&self) -> &'static str {
        "createPool"
    }

    fn check_input(&self, now: u64) -> Result<(), ChipInError> {
        self.params(now).map(drop)
    }

    async fn plan(&self, ctx: &ActionContext<'_>) -> Result<ActionPlan, ChipInError> {
        let params = self.params(ctx.now)?;
        let factory = ctx.config.network.factory()?;
        let pool_count = ctx
            .chain
            .pool_count(factory)
            .await
            .map_err(unreadable("ChipIn factory"))?;
        info!(?factory, %pool_count, "ChipIn factory reachable");

        let mut data = Map::new();
        data.insert("factoryAddress".into(), json!(factory));
        data.insert("title".into(), json!(params.title));
        data.insert(
            "targetAmount".into(),
            json!(format!("{} {}", format_full(params.target_amount, ctx.token.decimals), ctx.token.symbol)),
        );
        data.insert("targetToken".into(), json!(params.target_token));
        data.insert("deadline".into(), json!(params.deadline));
        data.insert("maxContributors".into(), json!(params.max_contributors));

        Ok(ActionPlan {
            calls: vec![Call::new(
                factory,
                CreatePoolCall {
                    title: params.title,
                    description: params.description,
                    target_amount: params.target_amount,
                    target_token: params.target_token,
                    deadline: U256::from(params.deadline),
                    max_contributors: U256::from(params.max_contributors),
                },
            )],
            spend: U256::zero(),
            spend_label: "",
            data,
        })
    }

    fn explain_revert(&self, reason: &str) -> Option<&'static str> {
        match reason {
            "Invalid target amount" => Some("Target amount must be greater than 0"),
            "Invalid deadline" => Some("Deadline must be in the future"),
            "Invalid max contributors" => Some("Max contributors must be greater than 0"),
            _ => None,
        }
    }

    fn on_confirmed(
        &self,
        ctx: &ActionContext<'_>,
        receipt: &OperationReceipt,
        data: &mut Map<String, Value>,
    ) {
        let Ok(factory) = ctx.config.network.factory() else {
            return;
        };
        let created = receipt
            .logs
            .iter()
            .filter(|log| log.address == factory)
            .find_map(|log| parse_log::<PoolCreatedFilter>(log.clone()).ok());
        match created {
            Some(event) => {
                info!(pool_id = %event.pool_id, pool = ?event.pool_address, "Pool created");
                data.insert("poolId".into(), json!(event.pool_id.to_string()));
                data.insert("poolAddress".into(), json!(event.pool_address));
            }
            None => warn!(
                user_op_hash = ?receipt.user_op_hash,
                "PoolCreated event not found in receipt logs"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MockChainReader, TokenMetadata};
    use crate::config::{Config, Network};
    use crate::error::{ChainError, ErrorKind};
    use crate::purchase::MockSwap;
    use ethers::abi::{self, Token};
    use ethers::contract::EthEvent;
    use ethers::types::{Bytes, Log, H256};

    const NOW: u64 = 1_700_000_000;

    fn request() -> CreatePool {
        CreatePool {
            title: "Team lunch".to_string().into(),
            description: "Friday pizza".to_string().into(),
            target_amount: U256::from(100_000_000u64).into(),
            target_token: Address::repeat_byte(0x99).into(),
            deadline: (NOW + 86_400).into(),
            max_contributors: 10u64.into(),
        }
    }

    fn usdc() -> TokenMetadata {
        TokenMetadata {
            name: "USD Coin".into(),
            symbol: "USDC".into(),
            decimals: 6,
        }
    }

    #[test]
    fn validates_required_fields() {
        assert!(request().check_input(NOW).is_ok());

        let missing = CreatePool {
            title: " ".to_string().into(),
            ..request()
        };
        assert!(missing.check_input(NOW).unwrap_err().to_string().starts_with("Missing required fields"));

        let past = CreatePool {
            deadline: (NOW - 1).into(),
            ..request()
        };
        assert_eq!(past.check_input(NOW).unwrap_err().to_string(), "Deadline must be in the future");

        let placeholder = CreatePool {
            target_token: Address::zero().into(),
            ..request()
        };
        assert_eq!(placeholder.check_input(NOW).unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn reads_frontend_body() {
        let action: CreatePool = serde_json::from_value(json!({
            "title": "Team lunch",
            "description": "Friday pizza",
            "targetAmount": "100000000",
            "targetToken": "0x9999999999999999999999999999999999999999",
            "deadline": (NOW + 60).to_string(),
            "maxContributors": 10
        }))
        .unwrap();
        assert!(action.check_input(NOW).is_ok());

        let action: CreatePool = serde_json::from_value(json!({
            "title": "Team lunch",
            "description": "Friday pizza",
            "targetAmount": "100000000",
            "targetToken": "0x9999999999999999999999999999999999999999",
            "deadline": "tomorrow",
            "maxContributors": 10
        }))
        .unwrap();
        let err = action.check_input(NOW).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().starts_with("Invalid deadline"));
    }

    #[tokio::test]
    async fn unreachable_factory_fails_preflight() {
        let config = Config::for_network(Network::ArbitrumSepolia).unwrap();
        let mut chain = MockChainReader::new();
        chain
            .expect_pool_count()
            .returning(|factory| Err(ChainError::call(factory, "poolCount()", "no code")));
        let token = usdc();
        let ctx = ActionContext {
            config: &config,
            chain: &chain,
            purchase: &MockSwap,
            account: Address::repeat_byte(0xac),
            token: &token,
            now: NOW,
        };
        let err = request().plan(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Preflight);
    }

    #[tokio::test]
    async fn missing_factory_is_a_config_error() {
        let config = Config::for_network(Network::BaseSepolia).unwrap();
        let chain = MockChainReader::new();
        let token = usdc();
        let ctx = ActionContext {
            config: &config,
            chain: &chain,
            purchase: &MockSwap,
            account: Address::repeat_byte(0xac),
            token: &token,
            now: NOW,
        };
        let err = request().plan(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn reads_pool_from_created_event() {
        let config = Config::for_network(Network::ArbitrumSepolia).unwrap();
        let factory = config.network.factory().unwrap();
        let pool = Address::repeat_byte(0x20);
        let log = Log {
            address: factory,
            topics: vec![
                PoolCreatedFilter::signature(),
                H256::from_low_u64_be(3),
                H256::from(pool),
                H256::from(Address::repeat_byte(0xac)),
            ],
            data: Bytes::from(abi::encode(&[
                Token::String("Team lunch".into()),
                Token::Uint(U256::from(100_000_000u64)),
                Token::Address(Address::repeat_byte(0x99)),
            ])),
            ..Default::default()
        };
        let receipt = OperationReceipt {
            user_op_hash: H256::repeat_byte(0xab),
            success: true,
            transaction_hash: H256::repeat_byte(0xbb),
            block_number: None,
            actual_gas_used: U256::from(250_000u64),
            actual_gas_cost: U256::zero(),
            reason: None,
            logs: vec![log],
        };

        let chain = MockChainReader::new();
        let token = usdc();
        let ctx = ActionContext {
            config: &config,
            chain: &chain,
            purchase: &MockSwap,
            account: Address::repeat_byte(0xac),
            token: &token,
            now: NOW,
        };
        let mut data = Map::new();
        request().on_confirmed(&ctx, &receipt, &mut data);
        assert_eq!(data["poolId"], "3");
        assert_eq!(data["poolAddress"], json!(pool));
    }
}
