// src/actions/mod.rs
//! The four sponsored user actions.
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use ethers::types::{Address, U256};
use serde_json::{Map, Value};

use crate::chain::{ChainReader, TokenMetadata};
use crate::config::Config;
use crate::error::{ChainError, ChipInError, PreflightError};
use crate::purchase::PurchaseStrategy;
use crate::types::{Call, OperationReceipt};

mod contribute;
mod create_pool;
mod execute_purchase;
mod field;
mod sponsor_transfer;

pub use contribute::Contribute;
pub use create_pool::CreatePool;
pub use execute_purchase::ExecutePurchase;
pub use field::{Field, FieldValue};
pub use sponsor_transfer::SponsorTransfer;

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Read-only view handed to an action while it plans.
pub struct ActionContext<'a> {
    pub config: &'a Config,
    pub chain: &'a dyn ChainReader,
    pub purchase: &'a dyn PurchaseStrategy,
    /// The smart account the operation is sent from.
    pub account: Address,
    /// Metadata of the gas token.
    pub token: &'a TokenMetadata,
    pub now: u64,
}

impl ActionContext<'_> {
    pub fn usdc(&self) -> Address {
        self.config.network.usdc
    }
}

/// What an action wants executed, and how to describe it.
#[derive(Debug, Clone, Default)]
pub struct ActionPlan {
    pub calls: Vec<Call>,
    /// Gas token leaving the account besides the gas fee.
    pub spend: U256,
    /// Label of `spend` in balance errors, e.g. "transfer".
    pub spend_label: &'static str,
    /// Action specific response fields.
    pub data: Map<String, Value>,
}

#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    /// Input validation without any network access.
    fn check_input(&self, now: u64) -> Result<(), ChipInError>;

    /// Read-only pre-flight checks and the call batch.
    async fn plan(&self, ctx: &ActionContext<'_>) -> Result<ActionPlan, ChipInError>;

    /// Maps a contract revert reason to a friendlier message.
    fn explain_revert(&self, _reason: &str) -> Option<&'static str> {
        None
    }

    /// Adds receipt-derived fields to the response data.
    fn on_confirmed(
        &self,
        _ctx: &ActionContext<'_>,
        _receipt: &OperationReceipt,
        _data: &mut Map<String, Value>,
    ) {
    }
}

pub(crate) fn unreadable(what: &'static str) -> impl FnOnce(ChainError) -> ChipInError {
    move |source| PreflightError::Unreadable { what, source }.into()
}
