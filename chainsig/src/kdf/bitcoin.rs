//! Bitcoin address rendering

use std::str::FromStr;

use bitcoin::{Address, Network, PublicKey as BitcoinPublicKey};
use secp256k1::PublicKey;

/// Get the legacy P2PKH address of a public key
///
/// The key hash is taken over the uncompressed serialization, so the same
/// key yields a different address than wallets using compressed keys.
pub fn public_key_to_address(public_key: &PublicKey, network: Network) -> String {
    let public_key = BitcoinPublicKey::new_uncompressed(*public_key);
    Address::p2pkh(&public_key, network).to_string()
}

/// Check that an address parses and belongs to `network`
pub fn is_valid_address(address: &str, network: Network) -> bool {
    Address::from_str(address)
        .map(|address| address.is_valid_for_network(network))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{Secp256k1, SecretKey};

    fn generator_key() -> PublicKey {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let secret_key = SecretKey::from_slice(&bytes).unwrap();
        PublicKey::from_secret_key(&Secp256k1::new(), &secret_key)
    }

    #[test]
    fn test_known_uncompressed_address() {
        // Private key 1, uncompressed, mainnet
        assert_eq!(
            public_key_to_address(&generator_key(), Network::Bitcoin),
            "1EHNa6Q4Jz2uvNExL497mE43ikXhwF6kZm"
        );
    }

    #[test]
    fn test_testnet_prefix() {
        let address = public_key_to_address(&generator_key(), Network::Testnet);
        assert!(address.starts_with('m') || address.starts_with('n'));
        assert!(is_valid_address(&address, Network::Testnet));
        assert!(!is_valid_address(&address, Network::Bitcoin));
    }
}
