//! Ethereum transaction functionality

use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, Signature, TransactionRequest as EthersTransactionRequest, U256};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::utils::parse_ether;
use reqwest::Url;

use crate::error::{Error, Result};
use crate::kdf::Chain;
use crate::signer::{MpcSignature, PayloadSigner};
use super::provider::ProviderConfig;
use super::{ChainSender, Transfer};

/// Sepolia chain ID
pub const DEFAULT_ETHEREUM_CHAIN_ID: u64 = 11155111;

/// Gas limit of a plain value transfer
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Ethereum sender
pub struct EthereumSender {
    /// Provider configuration
    config: ProviderConfig,
    /// Chain ID
    chain_id: u64,
    /// Derivation path of the sending key
    path: String,
    signer: Arc<dyn PayloadSigner>,
}

impl EthereumSender {
    /// Create a new Ethereum sender
    pub fn new(
        config: ProviderConfig,
        chain_id: u64,
        path: impl Into<String>,
        signer: Arc<dyn PayloadSigner>,
    ) -> Self {
        Self {
            config,
            chain_id,
            path: path.into(),
            signer,
        }
    }

    fn provider(&self) -> Result<Provider<Http>> {
        let url = Url::parse(&self.config.url)
            .map_err(|e| Error::Provider(format!("Invalid Ethereum RPC URL: {}", e)))?;
        let http = Http::new_with_client(url, self.config.http_client()?);
        Ok(Provider::new(http))
    }
}

/// Parsed sender, recipient and value of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthereumTransfer {
    pub from: Address,
    pub to: Address,
    /// Value in wei
    pub value: U256,
}

impl EthereumTransfer {
    /// Parse addresses and an ether-denominated amount
    pub fn parse(transfer: &Transfer) -> Result<Self> {
        let from = transfer.from.parse::<Address>()
            .map_err(|e| Error::Transaction(format!("Invalid from address: {}", e)))?;

        let to = transfer.to.parse::<Address>()
            .map_err(|e| Error::Transaction(format!("Invalid to address: {}", e)))?;

        let amount = transfer.amount.trim();
        if amount.is_empty() {
            return Err(Error::Transaction("Missing amount".to_string()));
        }
        let value = parse_ether(amount)
            .map_err(|e| Error::Transaction(format!("Invalid amount: {}", e)))?;

        Ok(Self { from, to, value })
    }

    /// Build the legacy EIP-155 transaction for this transfer
    pub fn to_transaction(&self, nonce: U256, gas_price: U256, chain_id: u64) -> TypedTransaction {
        EthersTransactionRequest::new()
            .from(self.from)
            .to(self.to)
            .value(self.value)
            .nonce(nonce)
            .gas(TRANSFER_GAS_LIMIT)
            .gas_price(gas_price)
            .chain_id(chain_id)
            .into()
    }
}

/// Convert an MPC signature into an EIP-155 signature for `chain_id`
pub fn eip155_signature(signature: &MpcSignature, chain_id: u64) -> Result<Signature> {
    let signature = signature.normalized()?;

    Ok(Signature {
        r: U256::from_big_endian(&signature.r),
        s: U256::from_big_endian(&signature.s),
        v: u64::from(signature.recovery_id) + 35 + chain_id * 2,
    })
}

#[async_trait]
impl ChainSender for EthereumSender {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    async fn send(&self, transfer: &Transfer) -> Result<String> {
        let parsed = EthereumTransfer::parse(transfer)?;
        let provider = self.provider()?;

        let nonce = provider.get_transaction_count(parsed.from, None)
            .await
            .map_err(|e| Error::Provider(format!("Failed to get nonce: {}", e)))?;

        let gas_price = provider.get_gas_price()
            .await
            .map_err(|e| Error::Provider(format!("Failed to get gas price: {}", e)))?;

        let tx = parsed.to_transaction(nonce, gas_price, self.chain_id);
        let sighash = tx.sighash();

        let signature = self.signer.sign(&sighash.0, &self.path).await?;
        let signature = eip155_signature(&signature, self.chain_id)?;

        let pending = provider.send_raw_transaction(tx.rlp_signed(&signature))
            .await
            .map_err(|e| Error::Provider(format!("Failed to broadcast transaction: {}", e)))?;

        let hash = format!("{:?}", pending.tx_hash());
        tracing::info!(
            chain = "ethereum",
            from = %transfer.from,
            to = %transfer.to,
            %hash,
            "transaction broadcast"
        );

        Ok(hash)
    }
}
