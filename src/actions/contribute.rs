// src/actions/contribute.rs
use async_trait::async_trait;
use ethers::types::{Address, U256};
use serde::Deserialize;
use serde_json::{json, Map};
use tracing::{debug, warn};

use super::{unreadable, Action, ActionContext, ActionPlan, Field};
use crate::amount::{format_amount, format_full};
use crate::contracts::chip_in_pool::ContributeCall;
use crate::contracts::permit_token::ApproveCall;
use crate::error::{ChipInError, PreflightError};
use crate::types::Call;

/// Contribution of USDC to a pool, approved and paid in one operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribute {
    #[serde(default)]
    pub pool_address: Field<Address>,
    #[serde(default)]
    pub amount: Field<U256>,
}

impl Contribute {
    fn inputs(&self) -> Result<(Address, U256), ChipInError> {
        let pool = self.pool_address.value("pool address")?;
        let amount = self.amount.value("amount")?;
        match (pool, amount) {
            (Some(pool), Some(amount)) if !pool.is_zero() && !amount.is_zero() => Ok((pool, amount)),
            _ => Err(ChipInError::invalid_input(
                "Pool address and a positive amount are required",
            )),
        }
    }
}

#[async_trait]
impl Action for Contribute {
    fn name(&self) -> &'static str {
        "contribute"
    }

    fn check_input(&self, _now: u64) -> Result<(), ChipInError> {
        self.inputs().map(drop)
    }

    async fn plan(&self, ctx: &ActionContext<'_>) -> Result<ActionPlan, ChipInError> {
        let (pool, amount) = self.inputs()?;
        let info = ctx
            .chain
            .pool_info(pool)
            .await
            .map_err(unreadable("pool contract"))?;

        if info.executed {
            return Err(PreflightError::PoolExecuted.into());
        }
        if info.cancelled {
            return Err(PreflightError::PoolCancelled.into());
        }
        if info.goal_reached {
            return Err(PreflightError::GoalAlreadyReached.into());
        }
        if info.deadline_passed(ctx.now) {
            return Err(PreflightError::DeadlinePassed.into());
        }
        if amount > info.remaining() {
            return Err(PreflightError::ExceedsTarget {
                remaining: format!(
                    "{} {}",
                    format_amount(info.remaining(), ctx.token.decimals),
                    ctx.token.symbol
                ),
            }
            .into());
        }

        let mut data = Map::new();
        data.insert("poolAddress".into(), json!(pool));
        data.insert("poolTitle".into(), json!(info.title));
        data.insert(
            "contributionAmount".into(),
            json!(format!("{} {}", format_full(amount, ctx.token.decimals), ctx.token.symbol)),
        );
        match ctx.chain.allowance(ctx.usdc(), ctx.account, pool).await {
            Ok(allowance) => {
                debug!(%allowance, ?pool, "Current pool allowance");
                data.insert(
                    "currentPoolAllowance".into(),
                    json!(format_full(allowance, ctx.token.decimals)),
                );
            }
            Err(err) => warn!(%err, "Could not read pool allowance"),
        }

        Ok(ActionPlan {
            calls: vec![
                Call::new(
                    ctx.usdc(),
                    ApproveCall {
                        spender: pool,
                        amount,
                    },
                ),
                Call::new(pool, ContributeCall { amount }),
            ],
            spend: amount,
            spend_label: "contribution",
            data,
        })
    }

    fn explain_revert(&self, reason: &str) -> Option<&'static str> {
        match reason {
            "Max contributors reached" => Some("Pool has reached its maximum number of contributors"),
            "Would exceed target" => Some("Contribution would exceed the pool target"),
            "Deadline passed" => Some("Pool deadline has passed"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MockChainReader, PoolInfo, TokenMetadata};
    use crate::config::{Config, Network};
    use crate::purchase::MockSwap;
    use rstest::rstest;

    const NOW: u64 = 1_700_000_000;

    fn usdc() -> TokenMetadata {
        TokenMetadata {
            name: "USD Coin".into(),
            symbol: "USDC".into(),
            decimals: 6,
        }
    }

    fn open_pool() -> PoolInfo {
        PoolInfo {
            title: "Team lunch".into(),
            target_amount: U256::from(500_000_000u64),
            total_contributed: U256::from(450_000_000u64),
            deadline: U256::from(NOW + 3_600),
            ..Default::default()
        }
    }

    async fn plan_with(pool: PoolInfo, amount: u64) -> Result<ActionPlan, ChipInError> {
        let config = Config::for_network(Network::ArbitrumSepolia).unwrap();
        let mut chain = MockChainReader::new();
        chain.expect_pool_info().returning(move |_| Ok(pool.clone()));
        chain
            .expect_allowance()
            .returning(|_, _, _| Ok(U256::zero()));
        let token = usdc();
        let ctx = ActionContext {
            config: &config,
            chain: &chain,
            purchase: &MockSwap,
            account: Address::repeat_byte(0xac),
            token: &token,
            now: NOW,
        };
        let action = Contribute {
            pool_address: Address::repeat_byte(0x20).into(),
            amount: U256::from(amount).into(),
        };
        action.plan(&ctx).await
    }

    #[tokio::test]
    async fn approves_then_contributes() {
        let plan = plan_with(open_pool(), 50_000_000).await.unwrap();
        assert_eq!(plan.spend, U256::from(50_000_000u64));
        let functions: Vec<_> = plan.calls.iter().map(|c| c.function.as_str()).collect();
        assert_eq!(functions, ["approve", "contribute"]);
        assert_eq!(plan.calls[1].to, Address::repeat_byte(0x20));
        assert_eq!(plan.data["contributionAmount"], "50.000000 USDC");
    }

    #[rstest]
    #[case(PoolInfo { executed: true, ..open_pool() }, "Pool has already been executed")]
    #[case(PoolInfo { cancelled: true, ..open_pool() }, "Pool has been cancelled")]
    #[case(PoolInfo { goal_reached: true, ..open_pool() }, "Pool goal has already been reached")]
    #[case(PoolInfo { deadline: U256::from(NOW - 1), ..open_pool() }, "Pool deadline has passed")]
    #[tokio::test]
    async fn rejects_closed_pools(#[case] pool: PoolInfo, #[case] message: &str) {
        let err = plan_with(pool, 1_000_000).await.unwrap_err();
        assert_eq!(err.to_string(), message);
    }

    #[tokio::test]
    async fn rejects_contribution_above_remaining_target() {
        let err = plan_with(open_pool(), 60_000_000).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Contribution would exceed pool target. Remaining: 50.00 USDC"
        );
    }

    #[test]
    fn maps_pool_revert_reasons() {
        let action = Contribute::default();
        assert!(action.explain_revert("Max contributors reached").is_some());
        assert!(action.explain_revert("something else").is_none());
        assert!(action.check_input(NOW).is_err());
    }

    #[test]
    fn short_pool_address_is_invalid_input() {
        let action: Contribute = serde_json::from_value(json!({
            "poolAddress": "0x1234",
            "amount": "1000000"
        }))
        .unwrap();
        let err = action.check_input(NOW).unwrap_err();
        assert!(matches!(err, ChipInError::InvalidInput(_)));
        assert_eq!(err.to_string(), "Invalid pool address: 0x1234 is not a 20-byte address");
    }
}
