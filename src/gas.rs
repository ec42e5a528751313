// src/gas.rs
use std::sync::Arc;

use ethers::types::Address;
use tracing::debug;

use crate::bundler::Bundler;
use crate::chain::ChainReader;
use crate::error::ChipInError;
use crate::types::GasQuote;

/// Collects the gas inputs of one operation. Quotes are never cached.
pub struct GasQuoteFetcher {
    chain: Arc<dyn ChainReader>,
    bundler: Arc<dyn Bundler>,
}

impl GasQuoteFetcher {
    pub fn new(chain: Arc<dyn ChainReader>, bundler: Arc<dyn Bundler>) -> Self {
        Self { chain, bundler }
    }

    /// Paymaster post-op charge and the bundler's `standard` fee tier, read concurrently.
    pub async fn fetch(&self, paymaster: Address) -> Result<GasQuote, ChipInError> {
        let (additional_gas_charge, tiers) = tokio::try_join!(
            async {
                self.chain
                    .additional_gas_charge(paymaster)
                    .await
                    .map_err(ChipInError::from)
            },
            async {
                self.bundler
                    .user_operation_gas_price()
                    .await
                    .map_err(ChipInError::GasQuote)
            },
        )?;

        debug!(
            %additional_gas_charge,
            max_fee_per_gas = %tiers.standard.max_fee_per_gas,
            max_priority_fee_per_gas = %tiers.standard.max_priority_fee_per_gas,
            "Fetched gas quote"
        );
        Ok(GasQuote {
            additional_gas_charge,
            fees: tiers.standard,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::MockBundler;
    use crate::chain::MockChainReader;
    use crate::error::{BundlerError, ErrorKind};
    use crate::types::{GasPrice, GasPriceTiers};
    use ethers::types::U256;

    fn tiers() -> GasPriceTiers {
        let tier = |fee: u64| GasPrice {
            max_fee_per_gas: U256::from(fee),
            max_priority_fee_per_gas: U256::from(fee / 10),
        };
        GasPriceTiers {
            slow: tier(100),
            standard: tier(200),
            fast: tier(300),
        }
    }

    #[tokio::test]
    async fn uses_standard_tier_and_paymaster_charge() {
        let mut chain = MockChainReader::new();
        chain
            .expect_additional_gas_charge()
            .times(1)
            .returning(|_| Ok(U256::from(35_000u64)));
        let mut bundler = MockBundler::new();
        bundler
            .expect_user_operation_gas_price()
            .times(1)
            .returning(|| Ok(tiers()));

        let quote = GasQuoteFetcher::new(Arc::new(chain), Arc::new(bundler))
            .fetch(Address::repeat_byte(0x31))
            .await
            .unwrap();
        assert_eq!(quote.additional_gas_charge, U256::from(35_000u64));
        assert_eq!(quote.fees, tiers().standard);
    }

    #[tokio::test]
    async fn gas_price_failure_is_a_bundler_error() {
        let mut chain = MockChainReader::new();
        chain
            .expect_additional_gas_charge()
            .returning(|_| Ok(U256::zero()));
        let mut bundler = MockBundler::new();
        bundler.expect_user_operation_gas_price().returning(|| {
            Err(BundlerError::Transport {
                method: "pimlico_getUserOperationGasPrice",
                message: "connection refused".into(),
            })
        });

        let err = GasQuoteFetcher::new(Arc::new(chain), Arc::new(bundler))
            .fetch(Address::repeat_byte(0x31))
            .await
            .unwrap_err();
        assert!(matches!(err, ChipInError::GasQuote(_)));
        assert_eq!(err.kind(), ErrorKind::Bundler);
    }
}
