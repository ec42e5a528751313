// src/chain.rs
//! Read-only access to the contracts the orchestration depends on.
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::AbiEncode;
use ethers::providers::Middleware;
use ethers::types::{Address, TransactionRequest, U256};
use serde::Serialize;
use tracing::debug;

use crate::contracts::token_paymaster::AdditionalGasChargeCall;
use crate::contracts::{ChipInFactory, ChipInPool, EntryPoint, LightAccountFactory, PermitToken};
use crate::error::ChainError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// The EIP-712 domain fields a permit token publishes on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitDomain {
    pub name: String,
    pub version: String,
}

/// Decoded `getPoolInfo()` of a ChipIn pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInfo {
    pub title: String,
    pub description: String,
    pub target_amount: U256,
    pub total_contributed: U256,
    pub contributor_count: U256,
    pub deadline: U256,
    pub goal_reached: bool,
    pub executed: bool,
    pub cancelled: bool,
}

impl PoolInfo {
    pub fn remaining(&self) -> U256 {
        self.target_amount.saturating_sub(self.total_contributed)
    }

    pub fn deadline_passed(&self, now: u64) -> bool {
        self.deadline < U256::from(now)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, ChainError>;

    async fn permit_domain(&self, token: Address) -> Result<PermitDomain, ChainError>;

    async fn permit_nonce(&self, token: Address, owner: Address) -> Result<U256, ChainError>;

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError>;

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError>;

    async fn pool_info(&self, pool: Address) -> Result<PoolInfo, ChainError>;

    async fn pool_target_token(&self, pool: Address) -> Result<Address, ChainError>;

    async fn pool_count(&self, factory: Address) -> Result<U256, ChainError>;

    async fn pool_address(&self, factory: Address, pool_id: U256) -> Result<Address, ChainError>;

    async fn preview_swap(
        &self,
        factory: Address,
        target_token: Address,
        amount: U256,
    ) -> Result<U256, ChainError>;

    async fn exchange_rate(&self, factory: Address, token: Address) -> Result<U256, ChainError>;

    /// Paymaster `additionalGasCharge()`, zero when the call returns no data.
    async fn additional_gas_charge(&self, paymaster: Address) -> Result<U256, ChainError>;

    async fn account_nonce(&self, entry_point: Address, sender: Address) -> Result<U256, ChainError>;

    async fn counterfactual_address(
        &self,
        account_factory: Address,
        owner: Address,
        salt: U256,
    ) -> Result<Address, ChainError>;

    async fn has_code(&self, address: Address) -> Result<bool, ChainError>;
}

/// [`ChainReader`] over any ethers middleware.
pub struct EthersChainReader<M> {
    client: Arc<M>,
}

impl<M: Middleware + 'static> EthersChainReader<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainReader for EthersChainReader<M> {
    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, ChainError> {
        let contract = PermitToken::new(token, self.client.clone());
        let (name, symbol, decimals) = (contract.name(), contract.symbol(), contract.decimals());
        let (name, symbol, decimals) = tokio::try_join!(
            async { name.call().await.map_err(|e| ChainError::call(token, "name()", e)) },
            async { symbol.call().await.map_err(|e| ChainError::call(token, "symbol()", e)) },
            async { decimals.call().await.map_err(|e| ChainError::call(token, "decimals()", e)) },
        )?;
        debug!(?token, %name, %symbol, decimals, "Read token metadata");
        Ok(TokenMetadata {
            name,
            symbol,
            decimals,
        })
    }

    async fn permit_domain(&self, token: Address) -> Result<PermitDomain, ChainError> {
        let contract = PermitToken::new(token, self.client.clone());
        let (name, version) = (contract.name(), contract.version());
        let (name, version) = tokio::try_join!(
            async { name.call().await.map_err(|e| ChainError::call(token, "name()", e)) },
            async { version.call().await.map_err(|e| ChainError::call(token, "version()", e)) },
        )?;
        Ok(PermitDomain { name, version })
    }

    async fn permit_nonce(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        PermitToken::new(token, self.client.clone())
            .nonces(owner)
            .call()
            .await
            .map_err(|e| ChainError::call(token, "nonces(address)", e))
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        PermitToken::new(token, self.client.clone())
            .balance_of(owner)
            .call()
            .await
            .map_err(|e| ChainError::call(token, "balanceOf(address)", e))
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        PermitToken::new(token, self.client.clone())
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| ChainError::call(token, "allowance(address,address)", e))
    }

    async fn pool_info(&self, pool: Address) -> Result<PoolInfo, ChainError> {
        let (
            title,
            description,
            target_amount,
            total_contributed,
            contributor_count,
            deadline,
            goal_reached,
            executed,
            cancelled,
        ) = ChipInPool::new(pool, self.client.clone())
            .get_pool_info()
            .call()
            .await
            .map_err(|e| ChainError::call(pool, "getPoolInfo()", e))?;
        Ok(PoolInfo {
            title,
            description,
            target_amount,
            total_contributed,
            contributor_count,
            deadline,
            goal_reached,
            executed,
            cancelled,
        })
    }

    async fn pool_target_token(&self, pool: Address) -> Result<Address, ChainError> {
        ChipInPool::new(pool, self.client.clone())
            .target_token()
            .call()
            .await
            .map_err(|e| ChainError::call(pool, "targetToken()", e))
    }

    async fn pool_count(&self, factory: Address) -> Result<U256, ChainError> {
        ChipInFactory::new(factory, self.client.clone())
            .pool_count()
            .call()
            .await
            .map_err(|e| ChainError::call(factory, "poolCount()", e))
    }

    async fn pool_address(&self, factory: Address, pool_id: U256) -> Result<Address, ChainError> {
        ChipInFactory::new(factory, self.client.clone())
            .get_pool(pool_id)
            .call()
            .await
            .map_err(|e| ChainError::call(factory, "getPool(uint256)", e))
    }

    async fn preview_swap(
        &self,
        factory: Address,
        target_token: Address,
        amount: U256,
    ) -> Result<U256, ChainError> {
        ChipInFactory::new(factory, self.client.clone())
            .preview_swap(target_token, amount)
            .call()
            .await
            .map_err(|e| ChainError::call(factory, "previewSwap(address,uint256)", e))
    }

    async fn exchange_rate(&self, factory: Address, token: Address) -> Result<U256, ChainError> {
        ChipInFactory::new(factory, self.client.clone())
            .exchange_rates(token)
            .call()
            .await
            .map_err(|e| ChainError::call(factory, "exchangeRates(address)", e))
    }

    async fn additional_gas_charge(&self, paymaster: Address) -> Result<U256, ChainError> {
        let tx = TransactionRequest::new()
            .to(paymaster)
            .data(AdditionalGasChargeCall.encode());
        let output = self
            .client
            .call(&tx.into(), None)
            .await
            .map_err(|e| ChainError::call(paymaster, "additionalGasCharge()", e))?;
        Ok(word_or_zero(&output))
    }

    async fn account_nonce(&self, entry_point: Address, sender: Address) -> Result<U256, ChainError> {
        EntryPoint::new(entry_point, self.client.clone())
            .get_nonce(sender, U256::zero())
            .call()
            .await
            .map_err(|e| ChainError::call(entry_point, "getNonce(address,uint192)", e))
    }

    async fn counterfactual_address(
        &self,
        account_factory: Address,
        owner: Address,
        salt: U256,
    ) -> Result<Address, ChainError> {
        LightAccountFactory::new(account_factory, self.client.clone())
            .get_address(owner, salt)
            .call()
            .await
            .map_err(|e| ChainError::call(account_factory, "getAddress(address,uint256)", e))
    }

    async fn has_code(&self, address: Address) -> Result<bool, ChainError> {
        let code = self
            .client
            .get_code(address, None)
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))?;
        Ok(!code.is_empty())
    }
}

/// First ABI word of `data` as an integer; empty return data reads as zero.
fn word_or_zero(data: &[u8]) -> U256 {
    if data.is_empty() {
        U256::zero()
    } else {
        U256::from_big_endian(&data[..data.len().min(32)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::Provider;
    use ethers::types::Bytes;

    #[test]
    fn empty_return_data_reads_as_zero() {
        assert_eq!(word_or_zero(&[]), U256::zero());
        let mut word = [0u8; 32];
        word[31] = 0x2a;
        assert_eq!(word_or_zero(&word), U256::from(42u64));
    }

    #[tokio::test]
    async fn additional_gas_charge_defaults_to_zero() {
        let (provider, mock) = Provider::mocked();
        mock.push::<Bytes, _>(Bytes::default()).unwrap();
        let reader = EthersChainReader::new(Arc::new(provider));

        let charge = reader.additional_gas_charge(Address::repeat_byte(0x31)).await.unwrap();
        assert_eq!(charge, U256::zero());
    }

    #[tokio::test]
    async fn additional_gas_charge_decodes_word() {
        let (provider, mock) = Provider::mocked();
        mock.push::<Bytes, _>(Bytes::from(U256::from(35_000u64).encode())).unwrap();
        let reader = EthersChainReader::new(Arc::new(provider));

        let charge = reader.additional_gas_charge(Address::repeat_byte(0x31)).await.unwrap();
        assert_eq!(charge, U256::from(35_000u64));
    }

    #[test]
    fn pool_remaining_and_deadline() {
        let pool = PoolInfo {
            target_amount: U256::from(500u64),
            total_contributed: U256::from(320u64),
            deadline: U256::from(1_000u64),
            ..Default::default()
        };
        assert_eq!(pool.remaining(), U256::from(180u64));
        assert!(!pool.deadline_passed(999));
        assert!(pool.deadline_passed(1_001));
    }
}
