//! Chainsig - MPC chain-signature toolkit
//!
//! This library derives chain-native addresses from a NEAR MPC master public
//! key, requests signatures from the MPC signer contract, and submits native
//! transfers on Ethereum and Bitcoin signed through that contract.

pub mod error;
pub mod kdf;
pub mod signer;
pub mod transaction;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use kdf::{AddressDeriver, Chain, DerivedAddress, MpcAddressDeriver};
pub use signer::{MpcSignature, PayloadSigner};
pub use transaction::{ChainSender, Senders, Transfer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
