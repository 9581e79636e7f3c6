//! Flag dispatch
//!
//! Branches run in a fixed order: derive Ethereum, derive Bitcoin, sign the
//! sample payload, send on Ethereum, send on Bitcoin. The first failure stops
//! the run.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;

use chainsig::signer::{sample_payload, SAMPLE_SIGN_PATH};
use chainsig::{AddressDeriver, Chain, DerivedAddress, PayloadSigner, Senders, Transfer};

use crate::config::Config;
use crate::flags::Flags;

pub struct App {
    config: Config,
    deriver: Arc<dyn AddressDeriver>,
    signer: Arc<dyn PayloadSigner>,
    senders: Senders,
}

impl App {
    pub fn new(
        config: Config,
        deriver: Arc<dyn AddressDeriver>,
        signer: Arc<dyn PayloadSigner>,
        senders: Senders,
    ) -> Self {
        Self {
            config,
            deriver,
            signer,
            senders,
        }
    }

    /// Run every enabled branch, writing result lines to `out`
    pub async fn run<W: Write>(&self, flags: &Flags, out: &mut W) -> Result<()> {
        if flags.derive_ethereum_address {
            let derived = self.derive(Chain::Ethereum)?;
            writeln!(out, "{}", derived.address)?;
        }

        if flags.derive_bitcoin_address {
            let derived = self.derive(Chain::Bitcoin)?;
            writeln!(out, "{}", derived.address)?;
        }

        if flags.sign_sample {
            let payload = sample_payload(&mut rand::thread_rng());
            let signature = self.signer.sign(&payload, SAMPLE_SIGN_PATH).await?;
            writeln!(out, "signature {}", signature)?;
        }

        if flags.send_ethereum_tx {
            let derived = self.derive(Chain::Ethereum)?;
            self.send(Chain::Ethereum, flags, derived.address, None).await?;
        }

        if flags.send_bitcoin_tx {
            let derived = self.derive(Chain::Bitcoin)?;
            self.send(Chain::Bitcoin, flags, derived.address, Some(derived.public_key))
                .await?;
        }

        Ok(())
    }

    fn derive(&self, chain: Chain) -> chainsig::Result<DerivedAddress> {
        self.deriver.derive(
            &self.config.master_public_key,
            &self.config.account_id,
            &self.config.path,
            chain,
        )
    }

    async fn send(
        &self,
        chain: Chain,
        flags: &Flags,
        from: String,
        public_key: Option<String>,
    ) -> chainsig::Result<()> {
        let transfer = Transfer {
            from,
            to: flags.to.clone().unwrap_or_default(),
            amount: flags.amount.clone().unwrap_or_default(),
            public_key,
        };

        let hash = self.senders.get(chain)?.send(&transfer).await?;
        tracing::debug!(%chain, %hash, "transfer submitted");
        Ok(())
    }
}
