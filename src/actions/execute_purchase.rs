// src/actions/execute_purchase.rs
use async_trait::async_trait;
use ethers::types::{Address, U256};
use serde::Deserialize;
use serde_json::{json, Map};
use tracing::{info, warn};

use super::{unreadable, Action, ActionContext, ActionPlan, Field};
use crate::amount::format_full;
use crate::error::{ChipInError, PreflightError};
use crate::purchase::PurchaseRequest;

/// Swaps a funded pool's USDC into its target token.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePurchase {
    #[serde(default)]
    pub pool_id: Field<u64>,
    /// Optional, checked against the factory's record for `pool_id`.
    #[serde(default)]
    pub pool_address: Field<Address>,
}

impl ExecutePurchase {
    fn inputs(&self) -> Result<(u64, Option<Address>), ChipInError> {
        let pool_id = self
            .pool_id
            .value("pool ID")?
            .ok_or_else(|| ChipInError::invalid_input("Pool ID is required"))?;
        Ok((pool_id, self.pool_address.value("pool address")?))
    }
}

#[async_trait]
impl Action for ExecutePurchase {
    fn name(&self) -> &'static str {
        "executePurchase"
    }

    fn check_input(&self, _now: u64) -> Result<(), ChipInError> {
        self.inputs().map(drop)
    }

    async fn plan(&self, ctx: &ActionContext<'_>) -> Result<ActionPlan, ChipInError> {
        let (pool_id, given_pool) = self.inputs()?;
        let factory = ctx.config.network.factory()?;

        let pool = ctx
            .chain
            .pool_address(factory, U256::from(pool_id))
            .await
            .map_err(unreadable("ChipIn factory"))?;
        if pool.is_zero() {
            return Err(ChipInError::invalid_input(format!("Pool #{pool_id} does not exist")));
        }
        if let Some(given) = given_pool {
            if given != pool {
                return Err(PreflightError::PoolMismatch {
                    pool_id,
                    given,
                    expected: pool,
                }
                .into());
            }
        }

        let (info, target_token) = tokio::try_join!(
            ctx.chain.pool_info(pool),
            ctx.chain.pool_target_token(pool),
        )
        .map_err(unreadable("pool contract"))?;
        if info.executed {
            return Err(PreflightError::PoolExecuted.into());
        }
        if info.cancelled {
            return Err(PreflightError::PoolCancelled.into());
        }
        if !info.goal_reached {
            return Err(PreflightError::GoalNotReached.into());
        }

        let request = PurchaseRequest {
            factory,
            pool_id: U256::from(pool_id),
            usdc: ctx.usdc(),
            target_token,
            usdc_amount: info.total_contributed,
        };
        let quote = ctx.purchase.quote(ctx.chain, &request).await?;
        let (symbol, decimals) = match ctx.chain.token_metadata(target_token).await {
            Ok(meta) => (meta.symbol, meta.decimals),
            Err(err) => {
                warn!(%err, ?target_token, "Target token metadata unavailable");
                ("UNKNOWN".to_string(), 18)
            }
        };
        info!(
            pool_id,
            ?pool,
            strategy = ctx.purchase.name(),
            expected_out = %quote.expected_out,
            "Purchase quoted"
        );

        let mut data = Map::new();
        data.insert("poolId".into(), json!(pool_id));
        data.insert("poolAddress".into(), json!(pool));
        data.insert("poolTitle".into(), json!(info.title));
        data.insert(
            "usdcSwapped".into(),
            json!(format!("{} {}", format_full(info.total_contributed, ctx.token.decimals), ctx.token.symbol)),
        );
        data.insert("targetTokenAddress".into(), json!(target_token));
        data.insert("targetToken".into(), json!(symbol));
        data.insert(
            "expectedTokens".into(),
            json!(format!("{} {}", format_full(quote.expected_out, decimals), symbol)),
        );
        data.insert(
            "minimumTokens".into(),
            json!(format!("{} {}", format_full(quote.min_out, decimals), symbol)),
        );
        if let Some(rate) = quote.exchange_rate {
            data.insert("exchangeRate".into(), json!(rate.to_string()));
        }
        data.insert("swapMethod".into(), json!(ctx.purchase.name()));

        Ok(ActionPlan {
            calls: quote.calls,
            spend: U256::zero(),
            spend_label: "",
            data,
        })
    }

    fn explain_revert(&self, reason: &str) -> Option<&'static str> {
        match reason {
            "Goal not reached" => Some("Pool goal has not been reached yet"),
            "Already executed" => Some("Pool has already been executed"),
            "Insufficient output" => Some("Swap output fell below the minimum, try again"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MockChainReader, PoolInfo, TokenMetadata};
    use crate::config::{Config, Network};
    use crate::error::ChainError;
    use crate::purchase::MockSwap;

    fn usdc() -> TokenMetadata {
        TokenMetadata {
            name: "USD Coin".into(),
            symbol: "USDC".into(),
            decimals: 6,
        }
    }

    fn funded_pool() -> PoolInfo {
        PoolInfo {
            title: "Team lunch".into(),
            target_amount: U256::from(100_000_000u64),
            total_contributed: U256::from(100_000_000u64),
            goal_reached: true,
            ..Default::default()
        }
    }

    fn chain(pool: PoolInfo) -> MockChainReader {
        let mut chain = MockChainReader::new();
        chain
            .expect_pool_address()
            .returning(|_, _| Ok(Address::repeat_byte(0x20)));
        chain.expect_pool_info().returning(move |_| Ok(pool.clone()));
        chain
            .expect_pool_target_token()
            .returning(|_| Ok(Address::repeat_byte(0x99)));
        chain
            .expect_preview_swap()
            .returning(|_, _, _| Ok(U256::exp10(18) * 50));
        chain
            .expect_exchange_rate()
            .returning(|_, _| Ok(U256::exp10(17) * 5));
        chain.expect_token_metadata().returning(|token| {
            Err(ChainError::call(token, "symbol()", "execution reverted"))
        });
        chain
    }

    async fn plan(action: ExecutePurchase, pool: PoolInfo) -> Result<ActionPlan, ChipInError> {
        let config = Config::for_network(Network::ArbitrumSepolia).unwrap();
        let chain = chain(pool);
        let token = usdc();
        let ctx = ActionContext {
            config: &config,
            chain: &chain,
            purchase: &MockSwap,
            account: Address::repeat_byte(0xac),
            token: &token,
            now: 0,
        };
        action.plan(&ctx).await
    }

    #[tokio::test]
    async fn quotes_funded_pool() {
        let action = ExecutePurchase {
            pool_id: 0u64.into(),
            pool_address: Address::repeat_byte(0x20).into(),
        };
        let plan = plan(action, funded_pool()).await.unwrap();
        assert_eq!(plan.calls.len(), 1);
        assert_eq!(plan.calls[0].function, "executePoolSwap");
        assert!(plan.spend.is_zero());
        assert_eq!(plan.data["targetToken"], "UNKNOWN");
        assert_eq!(plan.data["swapMethod"], "mock");
        assert_eq!(plan.data["usdcSwapped"], "100.000000 USDC");
    }

    #[tokio::test]
    async fn rejects_executed_pool() {
        let action = ExecutePurchase {
            pool_id: 0u64.into(),
            pool_address: Field::Missing,
        };
        let pool = PoolInfo {
            executed: true,
            ..funded_pool()
        };
        let err = plan(action, pool).await.unwrap_err();
        assert_eq!(err.to_string(), "Pool has already been executed");
    }

    #[tokio::test]
    async fn rejects_unfunded_pool() {
        let action = ExecutePurchase {
            pool_id: 0u64.into(),
            pool_address: Field::Missing,
        };
        let pool = PoolInfo {
            goal_reached: false,
            ..funded_pool()
        };
        let err = plan(action, pool).await.unwrap_err();
        assert!(matches!(err, ChipInError::Preflight(PreflightError::GoalNotReached)));
    }

    #[tokio::test]
    async fn rejects_mismatched_pool_address() {
        let action = ExecutePurchase {
            pool_id: 0u64.into(),
            pool_address: Address::repeat_byte(0x21).into(),
        };
        let err = plan(action, funded_pool()).await.unwrap_err();
        assert!(matches!(
            err,
            ChipInError::Preflight(PreflightError::PoolMismatch { pool_id: 0, .. })
        ));
    }

    #[test]
    fn requires_pool_id() {
        assert!(ExecutePurchase::default().check_input(0).is_err());
    }

    #[test]
    fn accepts_string_pool_id() {
        let action: ExecutePurchase = serde_json::from_value(json!({ "poolId": "3" })).unwrap();
        assert_eq!(action.pool_id, Field::Present(3));
        assert!(action.check_input(0).is_ok());

        let action: ExecutePurchase = serde_json::from_value(json!({ "poolId": "x" })).unwrap();
        assert_eq!(
            action.check_input(0).unwrap_err().to_string(),
            "Invalid pool ID: x is not a non-negative integer"
        );
    }
}
