// src/config.rs
//! Read-only runtime configuration, selected by network identifier.
use std::fmt;
use std::time::Duration;

use clap::ValueEnum;
use ethers::types::{Address, U256};
use url::Url;

use crate::error::ConfigError;

/// ERC-4337 EntryPoint v0.7, same address on every chain.
pub const ENTRY_POINT_V07: &str = "0x0000000071727De22E5E9d8BAf0edAc6f37da032";

/// `LightAccountFactory` v2.0.0, paired with EntryPoint v0.7.
pub const LIGHT_ACCOUNT_FACTORY_V2: &str = "0x0000000000400CdFef5E2714E63d8040b700BC24";

/// Circle token paymaster on the supported testnets.
pub const CIRCLE_PAYMASTER_TESTNET: &str = "0x31BE08D380A21fc740883c0BC434FcFc88740b58";

/// 1 USDC, the most the paymaster may pull for gas in a single operation.
pub const DEFAULT_MAX_GAS_USDC: u64 = 1_000_000;

pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Network {
    ArbitrumSepolia,
    BaseSepolia,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Self::ArbitrumSepolia => 421614,
            Self::BaseSepolia => 84532,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ArbitrumSepolia => "arbitrum-sepolia",
            Self::BaseSepolia => "base-sepolia",
        }
    }

    pub fn preset(&self) -> Result<NetworkConfig, ConfigError> {
        let chain_id = self.chain_id();
        let (rpc_url, usdc, factory) = match self {
            Self::ArbitrumSepolia => (
                "https://sepolia-rollup.arbitrum.io/rpc",
                "0x75faf114eafb1BDbe2F0316DF893fd58CE46AA4d",
                Some("0x108c416A6Cb34cea4A1C93F749B347e1dE3C65e8"),
            ),
            Self::BaseSepolia => (
                "https://sepolia.base.org",
                "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
                None,
            ),
        };

        Ok(NetworkConfig {
            network: *self,
            chain_id,
            rpc_url: parse_url(rpc_url)?,
            bundler_url: parse_url(&format!("https://public.pimlico.io/v2/{chain_id}/rpc"))?,
            entry_point: parse_address(ENTRY_POINT_V07)?,
            usdc: parse_address(usdc)?,
            paymaster: parse_address(CIRCLE_PAYMASTER_TESTNET)?,
            factory: factory.map(parse_address).transpose()?,
            account_factory: parse_address(LIGHT_ACCOUNT_FACTORY_V2)?,
        })
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contract addresses and endpoints of one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub network: Network,
    pub chain_id: u64,
    pub rpc_url: Url,
    pub bundler_url: Url,
    pub entry_point: Address,
    pub usdc: Address,
    pub paymaster: Address,
    /// ChipIn factory, when deployed on this network.
    pub factory: Option<Address>,
    pub account_factory: Address,
}

impl NetworkConfig {
    pub fn factory(&self) -> Result<Address, ConfigError> {
        self.factory
            .ok_or_else(|| ConfigError::MissingFactory(self.network.to_string()))
    }
}

/// Gas sponsorship terms shared by every action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    /// Permit ceiling granted to the paymaster, in token base units.
    pub max_gas_token_amount: U256,
    pub paymaster_mode: u8,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            max_gas_token_amount: U256::from(DEFAULT_MAX_GAS_USDC),
            paymaster_mode: crate::types::PAYMASTER_MODE_PERMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum PurchaseStrategyKind {
    /// Factory-side swap at a preset exchange rate.
    #[default]
    Mock,
    /// Swap routed through a DEX aggregator API.
    Aggregator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseConfig {
    pub kind: PurchaseStrategyKind,
    pub aggregator_url: Option<Url>,
    pub aggregator_api_key: Option<String>,
    pub slippage_bps: u16,
}

impl Default for PurchaseConfig {
    fn default() -> Self {
        Self {
            kind: PurchaseStrategyKind::Mock,
            aggregator_url: None,
            aggregator_api_key: None,
            slippage_bps: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub gas: GasPolicy,
    pub submission: SubmissionConfig,
    pub purchase: PurchaseConfig,
}

impl Config {
    pub fn for_network(network: Network) -> Result<Self, ConfigError> {
        Ok(Self {
            network: network.preset()?,
            gas: GasPolicy::default(),
            submission: SubmissionConfig::default(),
            purchase: PurchaseConfig::default(),
        })
    }
}

pub fn parse_address(raw: &str) -> Result<Address, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::InvalidAddress(raw.to_string()))
}

pub fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(format!("{raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_resolve() {
        let arbitrum = Network::ArbitrumSepolia.preset().unwrap();
        assert_eq!(arbitrum.chain_id, 421614);
        assert_eq!(arbitrum.bundler_url.as_str(), "https://public.pimlico.io/v2/421614/rpc");
        assert!(arbitrum.factory().is_ok());

        let base = Network::BaseSepolia.preset().unwrap();
        assert_eq!(base.chain_id, 84532);
        assert!(matches!(base.factory(), Err(ConfigError::MissingFactory(n)) if n == "base-sepolia"));
    }

    #[test]
    fn default_gas_ceiling_is_one_usdc() {
        let config = Config::for_network(Network::ArbitrumSepolia).unwrap();
        assert_eq!(config.gas.max_gas_token_amount, U256::from(1_000_000u64));
        assert_eq!(config.gas.paymaster_mode, 0);
        assert_eq!(config.submission.timeout, Duration::from_secs(60));
    }
}
