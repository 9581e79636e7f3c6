//! Error types for the chainsig library

use thiserror::Error;

/// Custom error type for chainsig operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for chainsig operations
pub type Result<T> = std::result::Result<T, Error>;
