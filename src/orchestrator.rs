// src/orchestrator.rs
//! Drives one action from input validation to a confirmed (or pending) operation.
use std::fmt;
use std::sync::Arc;

use ethers::types::{Address, H256, U64};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, instrument};

use crate::account::SmartAccount;
use crate::actions::{unix_now, Action, ActionContext, ActionPlan};
use crate::amount::{format_amount, format_amount_ceil};
use crate::bundler::Bundler;
use crate::builder::UserOperationBuilder;
use crate::chain::{ChainReader, TokenMetadata};
use crate::config::Config;
use crate::error::{decode_revert_reason, ChipInError, EntryPointError, ErrorKind, PermitError, PreflightError};
use crate::gas::GasQuoteFetcher;
use crate::permit::PermitSigner;
use crate::purchase::PurchaseStrategy;
use crate::submitter::{OperationSubmitter, Submission};
use crate::types::{OperationReceipt, PaymasterPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Validating,
    Permitting,
    Estimating,
    Submitting,
    Confirmed,
    Failed,
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Permitting => "permitting",
            Self::Estimating => "estimating",
            Self::Submitting => "submitting",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Confirmed,
    /// Submitted, no receipt before the timeout. Not a failure.
    Pending,
    Failed,
}

/// JSON result of every action endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    pub status: ActionStatus,
    pub action: &'static str,
    pub account_address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_operation_hash: Option<H256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<H256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<U64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<EntryPointError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<ActionState>,
    /// Underlying error text when it differs from `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ActionResponse {
    fn new(action: &'static str, status: ActionStatus, account_address: Address) -> Self {
        Self {
            success: status == ActionStatus::Confirmed,
            status,
            action,
            account_address,
            user_operation_hash: None,
            transaction_hash: None,
            block_number: None,
            gas_used: None,
            operation_success: None,
            error: None,
            error_kind: None,
            error_code: None,
            failed_at: None,
            details: None,
            data: Map::new(),
        }
    }

    fn confirmed(
        action: &dyn Action,
        account: Address,
        receipt: &OperationReceipt,
        data: Map<String, Value>,
    ) -> Self {
        let mut response = Self::new(action.name(), ActionStatus::Confirmed, account);
        response.success = receipt.success;
        response.operation_success = Some(receipt.success);
        response.user_operation_hash = Some(receipt.user_op_hash);
        response.transaction_hash = Some(receipt.transaction_hash);
        response.block_number = receipt.block_number;
        response.gas_used = Some(receipt.actual_gas_used.to_string());
        response.data = data;
        if !receipt.success {
            let reason = receipt.reason.as_deref().and_then(decode_revert_reason);
            response.error = Some(
                reason
                    .as_deref()
                    .and_then(|r| action.explain_revert(r))
                    .map(str::to_string)
                    .or(reason)
                    .unwrap_or_else(|| "Operation reverted on-chain".to_string()),
            );
            response.error_kind = Some(ErrorKind::Chain);
            response.details = receipt.reason.clone();
        }
        response
    }

    fn pending(
        action: &dyn Action,
        account: Address,
        user_op_hash: H256,
        data: Map<String, Value>,
    ) -> Self {
        let mut response = Self::new(action.name(), ActionStatus::Pending, account);
        response.user_operation_hash = Some(user_op_hash);
        response.data = data;
        response
    }

    fn failed(action: &dyn Action, account: Address, state: ActionState, err: &ChipInError) -> Self {
        let mut response = Self::new(action.name(), ActionStatus::Failed, account);
        let reason = err.bundler_error().and_then(|e| e.revert_reason());
        let message = match (err.entry_point_error(), reason) {
            (Some(code), _) => code.user_message().to_string(),
            (None, Some(reason)) => action
                .explain_revert(&reason)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Transaction would revert: {reason}")),
            (None, None) => err.to_string(),
        };
        let raw = err.to_string();
        response.details = (raw != message).then_some(raw);
        response.error = Some(message);
        response.error_kind = Some(err.kind());
        response.error_code = err.entry_point_error();
        response.failed_at = Some(state);
        response
    }
}

/// Runs actions through permit, estimation and submission.
pub struct Orchestrator {
    config: Arc<Config>,
    chain: Arc<dyn ChainReader>,
    account: Arc<dyn SmartAccount>,
    purchase: Arc<dyn PurchaseStrategy>,
    permits: PermitSigner,
    gas: GasQuoteFetcher,
    builder: UserOperationBuilder,
    submitter: OperationSubmitter,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        chain: Arc<dyn ChainReader>,
        bundler: Arc<dyn Bundler>,
        account: Arc<dyn SmartAccount>,
        purchase: Arc<dyn PurchaseStrategy>,
    ) -> Self {
        let network = &config.network;
        Self {
            permits: PermitSigner::new(chain.clone(), network.chain_id, config.gas.max_gas_token_amount),
            gas: GasQuoteFetcher::new(chain.clone(), bundler.clone()),
            builder: UserOperationBuilder::new(bundler.clone(), network.entry_point, network.chain_id),
            submitter: OperationSubmitter::new(bundler, network.entry_point, config.submission),
            config,
            chain,
            account,
            purchase,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn chain(&self) -> &dyn ChainReader {
        self.chain.as_ref()
    }

    pub fn account_address(&self) -> Address {
        self.account.address()
    }

    /// Never fails: every error is folded into the response.
    #[instrument(skip_all, fields(action = action.name()))]
    pub async fn run(&self, action: &dyn Action) -> ActionResponse {
        let mut state = ActionState::Validating;
        match self.drive(action, &mut state).await {
            Ok(response) => response,
            Err(err) => {
                error!(%state, error = %err, "Action failed");
                ActionResponse::failed(action, self.account_address(), state, &err)
            }
        }
    }

    async fn drive(
        &self,
        action: &dyn Action,
        state: &mut ActionState,
    ) -> Result<ActionResponse, ChipInError> {
        let now = unix_now();
        action.check_input(now)?;

        let network = &self.config.network;
        let account = self.account.address();
        let token = self
            .chain
            .token_metadata(network.usdc)
            .await
            .map_err(PermitError::TokenRead)?;
        let ctx = ActionContext {
            config: &self.config,
            chain: self.chain.as_ref(),
            purchase: self.purchase.as_ref(),
            account,
            token: &token,
            now,
        };
        let mut plan = action.plan(&ctx).await?;
        self.check_balance(&ctx, &plan).await?;
        info!(
            calls = plan.calls.len(),
            spend = %plan.spend,
            "Pre-flight checks passed"
        );

        *state = ActionState::Permitting;
        let permit = self
            .permits
            .sign(self.account.as_ref(), network.usdc, network.paymaster)
            .await?;
        let payload = PaymasterPayload {
            mode: self.config.gas.paymaster_mode,
            token: network.usdc,
            max_amount: permit.message.value,
            signature: permit.signature,
        };

        *state = ActionState::Estimating;
        let quote = self.gas.fetch(network.paymaster).await?;
        let user_op = self
            .builder
            .build(self.account.as_ref(), &plan.calls, network.paymaster, &payload, &quote)
            .await?;

        *state = ActionState::Submitting;
        match self.submitter.submit(&user_op).await? {
            Submission::Confirmed(receipt) => {
                *state = if receipt.success {
                    ActionState::Confirmed
                } else {
                    ActionState::Failed
                };
                if receipt.success {
                    action.on_confirmed(&ctx, &receipt, &mut plan.data);
                }
                Ok(ActionResponse::confirmed(action, account, &receipt, plan.data))
            }
            Submission::Pending { user_op_hash } => Ok(ActionResponse::pending(
                action,
                account,
                user_op_hash,
                plan.data,
            )),
        }
    }

    /// The account must hold the action's spend plus the full gas ceiling.
    async fn check_balance(
        &self,
        ctx: &ActionContext<'_>,
        plan: &ActionPlan,
    ) -> Result<(), ChipInError> {
        let balance = self
            .chain
            .balance_of(ctx.usdc(), ctx.account)
            .await
            .map_err(|source| PreflightError::Unreadable {
                what: "token balance",
                source,
            })?;
        let ceiling = self.config.gas.max_gas_token_amount;
        let need = plan.spend.saturating_add(ceiling);
        if balance >= need {
            return Ok(());
        }

        let TokenMetadata {
            symbol, decimals, ..
        } = ctx.token;
        let breakdown = if plan.spend.is_zero() {
            String::new()
        } else {
            format!(
                " ({} {} + {} gas)",
                format_amount_ceil(plan.spend, *decimals),
                plan.spend_label,
                format_amount_ceil(ceiling, *decimals)
            )
        };
        Err(PreflightError::InsufficientBalance {
            symbol: symbol.clone(),
            have: format_amount(balance, *decimals),
            need: format_amount_ceil(need, *decimals),
            breakdown,
        }
        .into())
    }
}
