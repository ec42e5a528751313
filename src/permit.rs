// src/permit.rs
use std::sync::Arc;

use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Bytes, U256};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::account::{unwrap_erc6492, SmartAccount};
use crate::chain::{ChainReader, PermitDomain};
use crate::error::PermitError;

/// Deadline used for every permit: the permit never expires.
// TODO: bound the deadline to now + confirmation timeout so a leaked permit expires.
pub const PERMIT_DEADLINE: U256 = U256::MAX;

/// An ECDSA signature; account schemes may prefix or extend it.
const MIN_SIGNATURE_LEN: usize = 65;

/// The EIP-2612 `Permit` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermitMessage {
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    pub nonce: U256,
    pub deadline: U256,
}

impl PermitMessage {
    pub fn typed_data(
        &self,
        domain: &PermitDomain,
        chain_id: u64,
        token: Address,
    ) -> Result<TypedData, PermitError> {
        let typed_data = json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" }
                ],
                "Permit": [
                    { "name": "owner", "type": "address" },
                    { "name": "spender", "type": "address" },
                    { "name": "value", "type": "uint256" },
                    { "name": "nonce", "type": "uint256" },
                    { "name": "deadline", "type": "uint256" }
                ]
            },
            "primaryType": "Permit",
            "domain": {
                "name": domain.name,
                "version": domain.version,
                "chainId": chain_id,
                "verifyingContract": token
            },
            "message": self
        });
        serde_json::from_value(typed_data).map_err(|e| PermitError::TypedData(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPermit {
    pub message: PermitMessage,
    /// The account's ERC-1271 signature, checked by the token through
    /// `isValidSignature` once the account is deployed.
    pub signature: Bytes,
}

/// Signs the gas-token permit that lets the paymaster pull its fee.
///
/// The permitted value is always the configured gas ceiling, independent of
/// how much the action itself moves.
pub struct PermitSigner {
    chain: Arc<dyn ChainReader>,
    chain_id: u64,
    ceiling: U256,
}

impl PermitSigner {
    pub fn new(chain: Arc<dyn ChainReader>, chain_id: u64, ceiling: U256) -> Self {
        Self {
            chain,
            chain_id,
            ceiling,
        }
    }

    pub async fn sign(
        &self,
        account: &dyn SmartAccount,
        token: Address,
        spender: Address,
    ) -> Result<SignedPermit, PermitError> {
        let owner = account.address();
        let (domain, nonce) = tokio::try_join!(
            self.chain.permit_domain(token),
            self.chain.permit_nonce(token, owner),
        )
        .map_err(PermitError::TokenRead)?;

        let message = PermitMessage {
            owner,
            spender,
            value: self.ceiling,
            nonce,
            deadline: PERMIT_DEADLINE,
        };
        let typed_data = message.typed_data(&domain, self.chain_id, token)?;
        let signature = account.sign_typed_data(&typed_data).await?;
        let signature = unwrap_erc6492(&signature)
            .map_err(|e| PermitError::MalformedSignature(e.to_string()))?;
        if signature.len() < MIN_SIGNATURE_LEN {
            return Err(PermitError::MalformedSignature(format!(
                "expected at least {MIN_SIGNATURE_LEN} bytes, got {}",
                signature.len()
            )));
        }

        debug!(
            token = %domain.name,
            version = %domain.version,
            %nonce,
            value = %message.value,
            "Signed paymaster permit"
        );
        Ok(SignedPermit { message, signature })
    }
}
