//! Transaction functionality
//!
//! This module provides native transfers on each supported chain. Senders
//! build the unsigned transaction, obtain signatures for its sighashes from a
//! [`PayloadSigner`](crate::signer::PayloadSigner) and broadcast the result.

pub mod provider;
mod ethereum;
mod bitcoin;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kdf::Chain;

pub use provider::*;
pub use self::ethereum::*;
pub use self::bitcoin::*;

/// A native transfer request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// From address
    pub from: String,
    /// To address
    pub to: String,
    /// Amount in the chain's main unit (ether, bitcoin)
    pub amount: String,
    /// Sender public key, required by chains that put it in the unlocking script
    pub public_key: Option<String>,
}

/// Submits transfers on one chain
#[async_trait]
pub trait ChainSender: Send + Sync {
    /// The chain this sender submits to
    fn chain(&self) -> Chain;

    /// Build, sign and broadcast a transfer, returning its transaction hash
    async fn send(&self, transfer: &Transfer) -> Result<String>;
}

/// Chain senders keyed by chain
#[derive(Clone, Default)]
pub struct Senders {
    senders: HashMap<Chain, Arc<dyn ChainSender>>,
}

impl Senders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sender, replacing any previous sender for the same chain
    pub fn register(&mut self, sender: Arc<dyn ChainSender>) {
        self.senders.insert(sender.chain(), sender);
    }

    pub fn with(mut self, sender: Arc<dyn ChainSender>) -> Self {
        self.register(sender);
        self
    }

    /// Get the sender for a chain
    pub fn get(&self, chain: Chain) -> Result<Arc<dyn ChainSender>> {
        self.senders
            .get(&chain)
            .cloned()
            .ok_or_else(|| Error::UnsupportedChain(format!("no sender registered for {}", chain)))
    }
}

impl fmt::Debug for Senders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.senders.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopSender(Chain);

    #[async_trait]
    impl ChainSender for NoopSender {
        fn chain(&self) -> Chain {
            self.0
        }

        async fn send(&self, transfer: &Transfer) -> Result<String> {
            Ok(format!("{}:{}", self.0, transfer.to))
        }
    }

    #[tokio::test]
    async fn test_registry_dispatch() {
        let senders = Senders::new()
            .with(Arc::new(NoopSender(Chain::Ethereum)))
            .with(Arc::new(NoopSender(Chain::Bitcoin)));

        let transfer = Transfer {
            from: "a".to_string(),
            to: "b".to_string(),
            amount: "1".to_string(),
            public_key: None,
        };

        let ethereum = senders.get(Chain::Ethereum).unwrap();
        assert_eq!(ethereum.send(&transfer).await.unwrap(), "ethereum:b");
        let bitcoin = senders.get(Chain::Bitcoin).unwrap();
        assert_eq!(bitcoin.send(&transfer).await.unwrap(), "bitcoin:b");
    }

    #[test]
    fn test_missing_sender() {
        let senders = Senders::new().with(Arc::new(NoopSender(Chain::Ethereum)));
        assert!(matches!(senders.get(Chain::Bitcoin), Err(Error::UnsupportedChain(_))));
    }
}
