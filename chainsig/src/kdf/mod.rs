//! Address derivation from an MPC master public key
//!
//! Child keys are derived additively: the master key is tweaked by a scalar
//! (`epsilon`) computed from the controlling account and a derivation path,
//! and the resulting secp256k1 key is rendered as a chain-native address.

pub mod bitcoin;
pub mod derivation;
pub mod ethereum;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use derivation::*;

/// Supported target chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Ethereum and EVM compatible chains
    Ethereum,
    /// Bitcoin
    Bitcoin,
}

impl Chain {
    /// Canonical lowercase chain name
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Bitcoin => "bitcoin",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ethereum" => Ok(Chain::Ethereum),
            "bitcoin" => Ok(Chain::Bitcoin),
            other => Err(Error::UnsupportedChain(other.to_string())),
        }
    }
}

/// A derived chain address together with the child public key behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAddress {
    /// The address string in the chain's native format
    pub address: String,
    /// Hex of the uncompressed (`04`-prefixed) child public key
    pub public_key: String,
}

/// Maps a master key, account and path to an address on a given chain
pub trait AddressDeriver: Send + Sync {
    fn derive(
        &self,
        public_key: &str,
        account_id: &str,
        path: &str,
        chain: Chain,
    ) -> Result<DerivedAddress>;
}

/// Production deriver using NEAR chain-signature key derivation
#[derive(Debug, Clone, Copy)]
pub struct MpcAddressDeriver {
    bitcoin_network: ::bitcoin::Network,
}

impl MpcAddressDeriver {
    /// Create a deriver that renders Bitcoin addresses for `bitcoin_network`
    pub fn new(bitcoin_network: ::bitcoin::Network) -> Self {
        Self { bitcoin_network }
    }
}

impl Default for MpcAddressDeriver {
    fn default() -> Self {
        Self::new(::bitcoin::Network::Testnet)
    }
}

impl AddressDeriver for MpcAddressDeriver {
    fn derive(
        &self,
        public_key: &str,
        account_id: &str,
        path: &str,
        chain: Chain,
    ) -> Result<DerivedAddress> {
        let master = parse_master_public_key(public_key)?;
        let child = derive_child_public_key(&master, account_id, path)?;

        let address = match chain {
            Chain::Ethereum => ethereum::public_key_to_address(&child),
            Chain::Bitcoin => bitcoin::public_key_to_address(&child, self.bitcoin_network),
        };

        tracing::debug!(%chain, %account_id, %path, %address, "derived address");

        Ok(DerivedAddress {
            address,
            public_key: hex::encode(child.serialize_uncompressed()),
        })
    }
}

/// Derive an address for a chain given by name
///
/// Unknown chain names fail with [`Error::UnsupportedChain`] before any key
/// material is touched.
pub fn generate_address(
    public_key: &str,
    account_id: &str,
    path: &str,
    chain: &str,
) -> Result<DerivedAddress> {
    let chain = chain.parse::<Chain>()?;
    MpcAddressDeriver::default().derive(public_key, account_id, path, chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_names() {
        assert_eq!("ethereum".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!("bitcoin".parse::<Chain>().unwrap(), Chain::Bitcoin);
        assert_eq!(Chain::Bitcoin.to_string(), "bitcoin");
    }

    #[test]
    fn test_unsupported_chain() {
        let err = "dogecoin".parse::<Chain>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedChain(name) if name == "dogecoin"));

        // The chain name is checked before the (empty) key is parsed
        let err = generate_address("", "", "", "solana").unwrap_err();
        assert!(matches!(err, Error::UnsupportedChain(_)));
    }

    #[test]
    fn test_invalid_master_key_fails() {
        let err =
            generate_address("not-a-key", "alice.testnet", "ethereum-1", "ethereum").unwrap_err();
        assert!(matches!(err, Error::KeyDerivation(_)));
    }
}
