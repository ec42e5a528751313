// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;

use chipin_sponsor::account::EcdsaSmartAccount;
use chipin_sponsor::bundler::{Bundler, BundlerClient};
use chipin_sponsor::chain::{ChainReader, EthersChainReader};
use chipin_sponsor::cli::Args;
use chipin_sponsor::orchestrator::Orchestrator;
use chipin_sponsor::purchase;
use chipin_sponsor::rpc::{ChipInApiServer, ChipInRpcImpl};
use clap::Parser;
use dotenv::dotenv;
use ethers::providers::{Http, Provider};
use ethers::signers::Signer;
use ethers::types::U256;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Arc::new(args.config()?);
    let network = &config.network;
    info!(
        network = %network.network,
        chain_id = network.chain_id,
        paymaster = ?network.paymaster,
        bundler = %network.bundler_url,
        "Loaded configuration"
    );

    let owner = args.owner()?.with_chain_id(network.chain_id);
    let provider = Provider::<Http>::try_from(network.rpc_url.as_str())?;
    let chain: Arc<dyn ChainReader> = Arc::new(EthersChainReader::new(Arc::new(provider)));
    let bundler: Arc<dyn Bundler> = Arc::new(BundlerClient::new(network.bundler_url.clone()));
    let account = EcdsaSmartAccount::connect(
        owner,
        network.account_factory,
        network.entry_point,
        U256::from(args.account_salt),
        network.chain_id,
        chain.clone(),
    )
    .await?;
    let purchase = purchase::from_config(&config)?;

    let orchestrator = Orchestrator::new(config.clone(), chain, bundler, Arc::new(account), purchase);

    let server_addr: SocketAddr = args.rpc_server_addr.parse()?;
    info!("Starting ChipIn sponsor RPC server on {}", server_addr);
    let server_handle = start_server(server_addr, ChipInRpcImpl::new(Arc::new(orchestrator))).await?;

    // Keep the server running until Ctrl+C is pressed
    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

async fn start_server(server_addr: SocketAddr, rpc: ChipInRpcImpl) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default().build(server_addr).await?;
    Ok(server.start(rpc.into_rpc()))
}
