//! Ethereum address rendering

use secp256k1::PublicKey;

/// Get the Ethereum address of a secp256k1 public key
pub fn public_key_to_address(public_key: &PublicKey) -> String {
    let public_key = public_key.serialize_uncompressed();

    // Skip the first byte (0x04) and hash the rest
    let key_hash = keccak256(&public_key[1..]);

    // Take the last 20 bytes of the hash
    format!("0x{}", hex::encode(&key_hash[12..]))
}

/// Check that a string looks like a hex Ethereum address
pub fn is_valid_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(body) if body.len() == 40 => hex::decode(body).is_ok(),
        _ => false,
    }
}

/// Calculate the Keccak-256 hash of data
pub(crate) fn keccak256(data: &[u8]) -> [u8; 32] {
    use sha3::{Digest, Keccak256};
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}
