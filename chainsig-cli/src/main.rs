//! Chainsig CLI
//!
//! Derives Ethereum and Bitcoin addresses from an MPC master public key,
//! signs a sample payload through the NEAR MPC signer and sends transfers
//! signed by it.

mod app;
mod config;
mod flags;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chainsig::signer::NearMpcSigner;
use chainsig::transaction::{BitcoinSender, EthereumSender};
use chainsig::{MpcAddressDeriver, Senders};

use crate::app::App;
use crate::config::Config;
use crate::flags::Flags;

#[tokio::main]
async fn main() -> Result<()> {
    let flags = Flags::from_args();

    // Initialize logging; stdout is reserved for results
    let log_level = if flags.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("chainsig={},chainsig_cli={}", log_level, log_level))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Chainsig CLI v{}", chainsig::VERSION);

    let config = Config::from_env()?;

    let deriver = Arc::new(MpcAddressDeriver::new(config.bitcoin_network));
    let signer = Arc::new(NearMpcSigner::new(config.near_signer_config())?);

    let senders = Senders::new()
        .with(Arc::new(EthereumSender::new(
            config.ethereum_provider(),
            config.ethereum_chain_id,
            config.path.clone(),
            signer.clone(),
        )))
        .with(Arc::new(BitcoinSender::new(
            config.bitcoin_provider(),
            config.bitcoin_network,
            config.bitcoin_fee_sats,
            config.path.clone(),
            signer.clone(),
        )));

    let app = App::new(config, deriver, signer, senders);
    app.run(&flags, &mut std::io::stdout().lock()).await
}
