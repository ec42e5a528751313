// src/cli.rs
use std::time::Duration;

use clap::Parser;
use ethers::signers::LocalWallet;
use ethers::types::U256;
use tracing::Level;

use crate::config::{
    parse_address, parse_url, Config, GasPolicy, Network, PurchaseConfig, PurchaseStrategyKind,
    SubmissionConfig, DEFAULT_MAX_GAS_USDC,
};
use crate::error::ConfigError;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(short, long, env = "RPC_SERVER_ADDR", default_value = "127.0.0.1:8545")]
    pub rpc_server_addr: String,

    /// Owner key of the smart account.
    #[clap(short, long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,

    #[clap(short, long, value_enum, env = "CHIPIN_NETWORK", default_value = "arbitrum-sepolia")]
    pub network: Network,

    #[clap(short, long, env = "ETH_RPC_URL")]
    pub eth_rpc_url: Option<String>,

    #[clap(long, env = "BUNDLER_URL")]
    pub bundler_url: Option<String>,

    #[clap(long, env = "CHIPIN_FACTORY")]
    pub factory: Option<String>,

    #[clap(long, env = "PAYMASTER_ADDRESS")]
    pub paymaster: Option<String>,

    #[clap(long, env = "USDC_ADDRESS")]
    pub usdc: Option<String>,

    /// Salt of the counterfactual smart account.
    #[clap(long, env = "ACCOUNT_SALT", default_value_t = 0)]
    pub account_salt: u64,

    /// Most USDC (base units) the paymaster may take for gas per operation.
    #[clap(long, env = "MAX_GAS_USDC", default_value_t = DEFAULT_MAX_GAS_USDC)]
    pub max_gas_usdc: u64,

    #[clap(long, env = "CONFIRMATION_TIMEOUT_SECS", default_value_t = 60)]
    pub confirmation_timeout_secs: u64,

    #[clap(long, env = "RECEIPT_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    #[clap(long, value_enum, env = "PURCHASE_STRATEGY", default_value = "mock")]
    pub purchase_strategy: PurchaseStrategyKind,

    #[clap(long, env = "AGGREGATOR_URL")]
    pub aggregator_url: Option<String>,

    #[clap(long, env = "AGGREGATOR_API_KEY", hide_env_values = true)]
    pub aggregator_api_key: Option<String>,

    #[clap(long, env = "SWAP_SLIPPAGE_BPS", default_value_t = 100)]
    pub slippage_bps: u16,

    #[clap(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: Level,
}

impl Args {
    /// Network preset with command line overrides applied.
    pub fn config(&self) -> Result<Config, ConfigError> {
        let mut network = self.network.preset()?;
        if let Some(url) = &self.eth_rpc_url {
            network.rpc_url = parse_url(url)?;
        }
        if let Some(url) = &self.bundler_url {
            network.bundler_url = parse_url(url)?;
        }
        if let Some(factory) = &self.factory {
            network.factory = Some(parse_address(factory)?);
        }
        if let Some(paymaster) = &self.paymaster {
            network.paymaster = parse_address(paymaster)?;
        }
        if let Some(usdc) = &self.usdc {
            network.usdc = parse_address(usdc)?;
        }

        Ok(Config {
            network,
            gas: GasPolicy {
                max_gas_token_amount: U256::from(self.max_gas_usdc),
                ..GasPolicy::default()
            },
            submission: SubmissionConfig {
                timeout: Duration::from_secs(self.confirmation_timeout_secs),
                poll_interval: Duration::from_millis(self.poll_interval_ms),
            },
            purchase: PurchaseConfig {
                kind: self.purchase_strategy,
                aggregator_url: self.aggregator_url.as_deref().map(parse_url).transpose()?,
                aggregator_api_key: self.aggregator_api_key.clone(),
                slippage_bps: self.slippage_bps,
            },
        })
    }

    pub fn owner(&self) -> Result<LocalWallet, ConfigError> {
        self.private_key
            .trim()
            .parse()
            .map_err(|e: ethers::signers::WalletError| ConfigError::InvalidPrivateKey(e.to_string()))
    }
}
