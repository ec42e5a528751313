// src/builder.rs
//! Two-pass construction of a paymaster-sponsored user operation.
use std::sync::Arc;

use ethers::types::{Address, U256};
use tracing::{debug, info};

use crate::account::SmartAccount;
use crate::bundler::Bundler;
use crate::error::ChipInError;
use crate::types::{Call, GasEstimate, GasQuote, PaymasterPayload, UserOperation};

/// Fee used while estimating. Bundlers ignore fees during simulation.
const ESTIMATION_FEE: u64 = 1;

pub struct UserOperationBuilder {
    bundler: Arc<dyn Bundler>,
    entry_point: Address,
    chain_id: u64,
}

impl UserOperationBuilder {
    pub fn new(bundler: Arc<dyn Bundler>, entry_point: Address, chain_id: u64) -> Self {
        Self {
            bundler,
            entry_point,
            chain_id,
        }
    }

    /// Estimates with placeholder fees and a dummy signature, then applies the
    /// estimate and the live fees and signs the final operation.
    pub async fn build(
        &self,
        account: &dyn SmartAccount,
        calls: &[Call],
        paymaster: Address,
        payload: &PaymasterPayload,
        quote: &GasQuote,
    ) -> Result<UserOperation, ChipInError> {
        let (nonce, init_code) = tokio::try_join!(account.nonce(), account.init_code())?;
        let call_data = account.encode_calls(calls)?;
        debug!(
            calls = ?calls.iter().map(|c| c.function.as_str()).collect::<Vec<_>>(),
            %nonce,
            deploying = init_code.is_some(),
            "Encoded account calls"
        );

        let (factory, factory_data) = match init_code {
            Some(code) => (Some(code.factory), Some(code.factory_data)),
            None => (None, None),
        };
        let mut user_op = UserOperation {
            sender: account.address(),
            nonce,
            factory,
            factory_data,
            call_data,
            max_fee_per_gas: U256::from(ESTIMATION_FEE),
            max_priority_fee_per_gas: U256::from(ESTIMATION_FEE),
            paymaster: Some(paymaster),
            paymaster_post_op_gas_limit: Some(quote.additional_gas_charge),
            paymaster_data: Some(payload.encode()),
            signature: account.dummy_signature(),
            ..Default::default()
        };

        let estimate = self
            .bundler
            .estimate_user_operation_gas(&user_op, self.entry_point)
            .await
            .map_err(ChipInError::Estimation)?;
        apply_estimate(&mut user_op, &estimate, quote);

        let user_op_hash = user_op.hash(self.entry_point, self.chain_id);
        user_op.signature = account.sign_user_operation(user_op_hash).await?;
        info!(
            ?user_op_hash,
            call_gas_limit = %user_op.call_gas_limit,
            verification_gas_limit = %user_op.verification_gas_limit,
            max_fee_per_gas = %user_op.max_fee_per_gas,
            "Built sponsored user operation"
        );
        Ok(user_op)
    }
}

/// Second pass: gas limits from the estimate, fees from the quote.
///
/// The post-op limit never drops below the paymaster's additional charge.
fn apply_estimate(user_op: &mut UserOperation, estimate: &GasEstimate, quote: &GasQuote) {
    user_op.call_gas_limit = estimate.call_gas_limit;
    user_op.verification_gas_limit = estimate.verification_gas_limit;
    user_op.pre_verification_gas = estimate.pre_verification_gas;
    user_op.paymaster_verification_gas_limit = estimate
        .paymaster_verification_gas_limit
        .or(user_op.paymaster_verification_gas_limit);
    user_op.paymaster_post_op_gas_limit = Some(
        estimate
            .paymaster_post_op_gas_limit
            .unwrap_or_default()
            .max(quote.additional_gas_charge),
    );
    user_op.max_fee_per_gas = quote.fees.max_fee_per_gas;
    user_op.max_priority_fee_per_gas = quote.fees.max_priority_fee_per_gas;
}
