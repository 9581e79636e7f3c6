//! Threshold signing through the MPC signer
//!
//! The signer never holds key material: it submits a 32-byte payload and a
//! derivation path to the MPC network and returns the ECDSA signature
//! produced under the key derived for the caller's account and that path.

pub mod near;

use std::fmt;

use async_trait::async_trait;
use rand::Rng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use near::{NearMpcSigner, NearSignerConfig};

/// Derivation path used by the signing demo
pub const SAMPLE_SIGN_PATH: &str = "ethereum,1";

/// Exclusive upper bound of each sample payload byte
pub const SAMPLE_BYTE_BOUND: u8 = 255;

/// Signs 32-byte payloads under a derived MPC key
#[async_trait]
pub trait PayloadSigner: Send + Sync {
    async fn sign(&self, payload: &[u8; 32], path: &str) -> Result<MpcSignature>;
}

/// Build a demo payload of 32 bytes, each uniform in `[0, SAMPLE_BYTE_BOUND)`
pub fn sample_payload<R: Rng + ?Sized>(rng: &mut R) -> [u8; 32] {
    std::array::from_fn(|_| rng.gen_range(0..SAMPLE_BYTE_BOUND))
}

/// ECDSA signature returned by the MPC network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MpcSignature {
    /// Compressed `R` point as hex
    pub big_r: String,
    /// x coordinate of `R`
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

#[derive(Deserialize)]
struct SignResponse {
    big_r: AffinePoint,
    s: SerializedScalar,
    recovery_id: u8,
}

#[derive(Deserialize)]
struct AffinePoint {
    affine_point: String,
}

#[derive(Deserialize)]
struct SerializedScalar {
    scalar: String,
}

impl MpcSignature {
    /// Parse the JSON value returned by the signer contract's `sign` method
    pub fn from_response(bytes: &[u8]) -> Result<Self> {
        let response: SignResponse = serde_json::from_slice(bytes)
            .map_err(|e| Error::Signing(format!("Malformed signature response: {}", e)))?;

        let big_r = response.big_r.affine_point;
        let x = big_r
            .strip_prefix("02")
            .or_else(|| big_r.strip_prefix("03"))
            .filter(|x| x.len() == 64)
            .ok_or_else(|| Error::Signing(format!("Invalid R point: {}", big_r)))?;

        Ok(Self {
            r: decode_32(x, "r")?,
            s: decode_32(&response.s.scalar, "s")?,
            recovery_id: response.recovery_id,
            big_r,
        })
    }

    /// `r || s`
    pub fn to_compact(&self) -> [u8; 64] {
        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&self.r);
        compact[32..].copy_from_slice(&self.s);
        compact
    }

    /// Convert to a secp256k1 signature in low-s form
    pub fn to_ecdsa(&self) -> Result<Signature> {
        let mut signature = Signature::from_compact(&self.to_compact())
            .map_err(|e| Error::Signing(format!("Invalid signature: {}", e)))?;
        signature.normalize_s();
        Ok(signature)
    }

    /// Return the low-s form, flipping the recovery id when `s` was negated
    pub fn normalized(&self) -> Result<Self> {
        let compact = self.to_ecdsa()?.serialize_compact();
        if compact == self.to_compact() {
            return Ok(self.clone());
        }

        let mut s = [0u8; 32];
        s.copy_from_slice(&compact[32..]);
        Ok(Self {
            big_r: self.big_r.clone(),
            r: self.r,
            s,
            recovery_id: self.recovery_id ^ 1,
        })
    }

    /// Verify the signature over `payload` against a derived public key
    pub fn verify(&self, payload: &[u8; 32], public_key: &PublicKey) -> Result<bool> {
        let message = Message::from_digest_slice(payload)
            .map_err(|e| Error::InvalidInput(format!("Invalid payload: {}", e)))?;
        let signature = self.to_ecdsa()?;

        Ok(Secp256k1::verification_only()
            .verify_ecdsa(&message, &signature, public_key)
            .is_ok())
    }
}

impl fmt::Display for MpcSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ r: {}, s: {}, v: {} }}",
            hex::encode(self.r),
            hex::encode(self.s),
            self.recovery_id
        )
    }
}

fn decode_32(value: &str, field: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(value)
        .map_err(|e| Error::Signing(format!("Invalid {} encoding: {}", field, e)))?;
    bytes
        .try_into()
        .map_err(|_| Error::Signing(format!("Invalid {} length", field)))
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::testing::{sign_with, LocalSigner};
    use crate::kdf::{derive_child_public_key, derive_child_secret_key};
    use secp256k1::rand::rngs::OsRng;

    #[test]
    fn test_sample_payload_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let payload = sample_payload(&mut rng);
            assert_eq!(payload.len(), 32);
            assert!(payload.iter().all(|byte| *byte < SAMPLE_BYTE_BOUND));
        }
    }

    #[test]
    fn test_signature_verifies_against_derived_key() {
        let secp = Secp256k1::new();
        let (master_secret, master_public) = secp.generate_keypair(&mut OsRng);
        let child_secret =
            derive_child_secret_key(&master_secret, "alice.testnet", SAMPLE_SIGN_PATH).unwrap();
        let child_public =
            derive_child_public_key(&master_public, "alice.testnet", SAMPLE_SIGN_PATH).unwrap();

        let payload = sample_payload(&mut rand::thread_rng());
        let first = sign_with(&child_secret, &payload);
        let second = sign_with(&child_secret, &payload);

        assert!(first.verify(&payload, &child_public).unwrap());
        assert!(second.verify(&payload, &child_public).unwrap());
        assert!(!first.verify(&payload, &master_public).unwrap());
    }

    #[tokio::test]
    async fn test_local_signer_matches_derived_key() {
        let signer = LocalSigner::random("alice.testnet");
        let master_public = signer.master_public_key();
        let child_public =
            derive_child_public_key(&master_public, "alice.testnet", "bitcoin-1").unwrap();

        let payload = [42u8; 32];
        let signature = signer.sign(&payload, "bitcoin-1").await.unwrap();
        assert!(signature.verify(&payload, &child_public).unwrap());
    }

    #[test]
    fn test_from_response() {
        let json = br#"{
            "big_r": {"affine_point": "0279BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798"},
            "s": {"scalar": "0000000000000000000000000000000000000000000000000000000000000001"},
            "recovery_id": 1
        }"#;

        let signature = MpcSignature::from_response(json).unwrap();
        assert_eq!(
            hex::encode(signature.r),
            "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
        assert_eq!(signature.s[31], 1);
        assert_eq!(signature.recovery_id, 1);
        assert_eq!(
            signature.to_string(),
            "{ r: 79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798, \
             s: 0000000000000000000000000000000000000000000000000000000000000001, v: 1 }"
        );
    }

    #[test]
    fn test_from_response_rejects_garbage() {
        assert!(MpcSignature::from_response(b"{}").is_err());
        assert!(MpcSignature::from_response(
            br#"{"big_r":{"affine_point":"02"},"s":{"scalar":"00"},"recovery_id":0}"#
        )
        .is_err());

        // 66 bytes, but a multi-byte character straddles the prefix
        let response = serde_json::json!({
            "big_r": { "affine_point": format!("a\u{20ac}{}", "0".repeat(62)) },
            "s": { "scalar": "00".repeat(32) },
            "recovery_id": 0
        });
        let err = MpcSignature::from_response(response.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Signing(_)));

        // Uncompressed or untagged points are rejected
        let response = serde_json::json!({
            "big_r": { "affine_point": format!("04{}", "11".repeat(32)) },
            "s": { "scalar": "00".repeat(32) },
            "recovery_id": 0
        });
        assert!(MpcSignature::from_response(response.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_normalized_flips_recovery_id() {
        // n - 1 is a high s value; its low form is 1
        let high_s =
            hex::decode("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364140")
                .unwrap();
        let mut signature = MpcSignature {
            big_r: String::new(),
            r: [0u8; 32],
            s: high_s.try_into().unwrap(),
            recovery_id: 0,
        };
        signature.r[31] = 7;

        let normalized = signature.normalized().unwrap();
        assert_eq!(normalized.recovery_id, 1);
        assert_eq!(normalized.s[31], 1);
        assert!(normalized.s[..31].iter().all(|byte| *byte == 0));

        let again = normalized.normalized().unwrap();
        assert_eq!(again, normalized);
    }
}
