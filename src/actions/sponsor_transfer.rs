// src/actions/sponsor_transfer.rs
use async_trait::async_trait;
use ethers::types::{Address, U256};
use serde::Deserialize;
use serde_json::{json, Map};

use super::{Action, ActionContext, ActionPlan, Field};
use crate::amount::format_full;
use crate::contracts::permit_token::TransferCall;
use crate::error::ChipInError;
use crate::types::Call;

/// Plain USDC transfer with gas paid in USDC.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorTransfer {
    #[serde(default)]
    pub to: Field<Address>,
    #[serde(default)]
    pub amount: Field<U256>,
}

impl SponsorTransfer {
    fn inputs(&self) -> Result<(Address, U256), ChipInError> {
        let to = match self.to.value("recipient address")? {
            None => return Err(ChipInError::invalid_input("Recipient address is required")),
            Some(to) if to.is_zero() => {
                return Err(ChipInError::invalid_input(
                    "Recipient cannot be the zero address",
                ))
            }
            Some(to) => to,
        };
        let amount = self.amount.value("amount")?.unwrap_or_default();
        if amount.is_zero() {
            return Err(ChipInError::invalid_input("Amount must be greater than 0"));
        }
        Ok((to, amount))
    }
}

#[async_trait]
impl Action for SponsorTransfer {
    fn name(&self) -> &'static str {
        "sponsorTransfer"
    }

    fn check_input(&self, _now: u64) -> Result<(), ChipInError> {
        self.inputs().map(drop)
    }

    async fn plan(&self, ctx: &ActionContext<'_>) -> Result<ActionPlan, ChipInError> {
        let (to, amount) = self.inputs()?;

        let mut data = Map::new();
        data.insert("recipient".into(), json!(to));
        data.insert(
            "amount".into(),
            json!(format!("{} {}", format_full(amount, ctx.token.decimals), ctx.token.symbol)),
        );

        Ok(ActionPlan {
            calls: vec![Call::new(
                ctx.usdc(),
                TransferCall { to, amount },
            )],
            spend: amount,
            spend_label: "transfer",
            data,
        })
    }
}
