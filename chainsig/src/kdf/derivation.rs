//! NEAR chain-signature key derivation

use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use sha3::{Digest, Sha3_256};

use crate::error::{Error, Result};

/// Domain separator hashed in front of every derivation input
pub const EPSILON_DERIVATION_PREFIX: &str = "near-mpc-recovery v0.1.0 epsilon derivation:";

/// Curve tag used by NEAR for secp256k1 public keys
const SECP256K1_KEY_PREFIX: &str = "secp256k1:";

/// Parse a NEAR-formatted secp256k1 public key (`secp256k1:<base58 x||y>`)
pub fn parse_master_public_key(public_key: &str) -> Result<PublicKey> {
    let encoded = public_key
        .strip_prefix(SECP256K1_KEY_PREFIX)
        .ok_or_else(|| Error::KeyDerivation(format!("Invalid MPC public key: {}", public_key)))?;

    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| Error::KeyDerivation(format!("Invalid MPC public key encoding: {}", e)))?;

    if bytes.len() != 64 {
        return Err(Error::KeyDerivation(format!(
            "Invalid MPC public key length: expected 64 bytes, got {}",
            bytes.len()
        )));
    }

    let mut uncompressed = [0u8; 65];
    uncompressed[0] = 0x04;
    uncompressed[1..].copy_from_slice(&bytes);

    PublicKey::from_slice(&uncompressed)
        .map_err(|e| Error::KeyDerivation(format!("Invalid MPC public key point: {}", e)))
}

/// Format a secp256k1 public key the way NEAR prints it
pub fn format_master_public_key(public_key: &PublicKey) -> String {
    let uncompressed = public_key.serialize_uncompressed();
    format!("{}{}", SECP256K1_KEY_PREFIX, bs58::encode(&uncompressed[1..]).into_string())
}

/// Compute the additive tweak for an account and derivation path
pub fn derive_epsilon(account_id: &str, path: &str) -> Result<Scalar> {
    let mut hasher = Sha3_256::new();
    hasher.update(EPSILON_DERIVATION_PREFIX.as_bytes());
    hasher.update(account_id.as_bytes());
    hasher.update(b",");
    hasher.update(path.as_bytes());
    let hash: [u8; 32] = hasher.finalize().into();

    Scalar::from_be_bytes(hash)
        .map_err(|_| Error::KeyDerivation("Derivation epsilon is out of range".to_string()))
}

/// Derive the child public key `master + epsilon * G`
pub fn derive_child_public_key(
    master: &PublicKey,
    account_id: &str,
    path: &str,
) -> Result<PublicKey> {
    let epsilon = derive_epsilon(account_id, path)?;
    let secp = Secp256k1::verification_only();

    master
        .add_exp_tweak(&secp, &epsilon)
        .map_err(|e| Error::KeyDerivation(format!("Child key derivation failed: {}", e)))
}

/// Derive the child secret key `master + epsilon`
///
/// Only meaningful when the master secret is known locally, which is never
/// the case for a real MPC key.
pub fn derive_child_secret_key(
    master: &SecretKey,
    account_id: &str,
    path: &str,
) -> Result<SecretKey> {
    let epsilon = derive_epsilon(account_id, path)?;

    master
        .add_tweak(&epsilon)
        .map_err(|e| Error::KeyDerivation(format!("Child key derivation failed: {}", e)))
}
