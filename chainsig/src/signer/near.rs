//! MPC signer contract client over NEAR JSON-RPC

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use borsh::BorshSerialize;
use ed25519_dalek::{Signer, SigningKey};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use super::{MpcSignature, PayloadSigner};

/// Production MPC signer contract on NEAR testnet
pub const DEFAULT_MPC_CONTRACT_ID: &str = "v1.signer-prod.testnet";

/// Public NEAR testnet RPC endpoint
pub const DEFAULT_NEAR_RPC_URL: &str = "https://rpc.testnet.near.org";

/// Gas attached to the `sign` call (250 Tgas)
pub const DEFAULT_SIGN_GAS: u64 = 250_000_000_000_000;

/// Deposit attached to the `sign` call (0.05 NEAR in yoctoNEAR)
pub const DEFAULT_SIGN_DEPOSIT: u128 = 50_000_000_000_000_000_000_000;

const ED25519_KEY_PREFIX: &str = "ed25519:";
const ED25519_KEY_TYPE: u8 = 0;
const FUNCTION_CALL_ACTION_TAG: u8 = 2;
const KEY_VERSION: u32 = 0;

/// NEAR signer configuration
#[derive(Debug, Clone)]
pub struct NearSignerConfig {
    /// NEAR JSON-RPC URL
    pub rpc_url: String,
    /// Account that pays for and authorizes the `sign` call
    pub account_id: String,
    /// `ed25519:<base58>` full-access key of `account_id`
    pub secret_key: String,
    /// Signer contract account
    pub contract_id: String,
    pub gas: u64,
    pub deposit: u128,
    /// Timeout in seconds
    pub timeout: Option<u64>,
}

impl NearSignerConfig {
    /// Configuration for the testnet signer contract
    pub fn new(account_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            rpc_url: DEFAULT_NEAR_RPC_URL.to_string(),
            account_id: account_id.into(),
            secret_key: secret_key.into(),
            contract_id: DEFAULT_MPC_CONTRACT_ID.to_string(),
            gas: DEFAULT_SIGN_GAS,
            deposit: DEFAULT_SIGN_DEPOSIT,
            timeout: None,
        }
    }
}

#[derive(BorshSerialize)]
struct NearPublicKey {
    key_type: u8,
    data: [u8; 32],
}

#[derive(BorshSerialize)]
struct NearSignature {
    key_type: u8,
    data: [u8; 64],
}

#[derive(BorshSerialize)]
struct FunctionCallAction {
    method_name: String,
    args: Vec<u8>,
    gas: u64,
    deposit: u128,
}

enum Action {
    FunctionCall(FunctionCallAction),
}

impl BorshSerialize for Action {
    fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Action::FunctionCall(call) => {
                FUNCTION_CALL_ACTION_TAG.serialize(writer)?;
                call.serialize(writer)
            }
        }
    }
}

#[derive(BorshSerialize)]
struct Transaction {
    signer_id: String,
    public_key: NearPublicKey,
    nonce: u64,
    receiver_id: String,
    block_hash: [u8; 32],
    actions: Vec<Action>,
}

#[derive(BorshSerialize)]
struct SignedTransaction {
    transaction: Transaction,
    signature: NearSignature,
}

#[derive(Debug, Deserialize)]
struct AccessKeyView {
    nonce: u64,
    block_hash: String,
}

/// Signer backed by the MPC contract's `sign` method
pub struct NearMpcSigner {
    config: NearSignerConfig,
    client: reqwest::Client,
}

impl NearMpcSigner {
    /// Create a new NEAR MPC signer
    pub fn new(config: NearSignerConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let client = builder
            .build()
            .map_err(|e| Error::Provider(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Send a JSON-RPC request
    async fn send_request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": "dontcare",
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Failed to send request: {}", e)))?;

        let response_json: serde_json::Value = response.json()
            .await
            .map_err(|e| Error::Provider(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = response_json.get("error") {
            return Err(Error::Provider(format!("JSON-RPC error: {}", error)));
        }

        let result = response_json.get("result")
            .ok_or_else(|| Error::Provider("No result in response".to_string()))?;

        // `query` reports missing keys inside an otherwise successful result
        if let Some(error) = result.get("error") {
            return Err(Error::Provider(format!("{} failed: {}", method, error)));
        }

        serde_json::from_value(result.clone())
            .map_err(|e| Error::Provider(format!("Failed to parse result: {}", e)))
    }

    async fn view_access_key(&self, public_key: &str) -> Result<AccessKeyView> {
        self.send_request("query", serde_json::json!({
            "request_type": "view_access_key",
            "finality": "final",
            "account_id": self.config.account_id,
            "public_key": public_key,
        }))
        .await
    }
}

#[async_trait]
impl PayloadSigner for NearMpcSigner {
    async fn sign(&self, payload: &[u8; 32], path: &str) -> Result<MpcSignature> {
        let signing_key = parse_secret_key(&self.config.secret_key)?;
        let public_key = format_public_key(&signing_key);

        let access_key = self.view_access_key(&public_key).await?;
        let block_hash = decode_block_hash(&access_key.block_hash)?;

        let signed = build_sign_transaction(
            &self.config,
            &signing_key,
            access_key.nonce + 1,
            block_hash,
            payload,
            path,
        )?;

        tracing::info!(
            contract = %self.config.contract_id,
            %path,
            "requesting MPC signature"
        );

        let outcome: serde_json::Value = self
            .send_request("broadcast_tx_commit", serde_json::json!([BASE64.encode(signed)]))
            .await?;

        let value = success_value(&outcome)?;
        MpcSignature::from_response(&value)
    }
}

/// Parse an `ed25519:<base58>` secret key (64-byte keypair or 32-byte seed)
fn parse_secret_key(secret_key: &str) -> Result<SigningKey> {
    let encoded = secret_key
        .strip_prefix(ED25519_KEY_PREFIX)
        .ok_or_else(|| Error::Signing("NEAR private key must start with ed25519:".to_string()))?;

    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| Error::Signing(format!("Invalid NEAR private key encoding: {}", e)))?;

    if bytes.len() != 64 && bytes.len() != 32 {
        return Err(Error::Signing(format!("Invalid NEAR private key length: {}", bytes.len())));
    }

    let mut seed = [0u8; 32];
    seed.copy_from_slice(&bytes[..32]);
    Ok(SigningKey::from_bytes(&seed))
}

fn format_public_key(signing_key: &SigningKey) -> String {
    format!(
        "{}{}",
        ED25519_KEY_PREFIX,
        bs58::encode(signing_key.verifying_key().to_bytes()).into_string()
    )
}

fn decode_block_hash(block_hash: &str) -> Result<[u8; 32]> {
    bs58::decode(block_hash)
        .into_vec()
        .map_err(|e| Error::Provider(format!("Invalid block hash: {}", e)))?
        .try_into()
        .map_err(|_| Error::Provider(format!("Invalid block hash length: {}", block_hash)))
}

/// Build and sign the borsh-encoded `sign` function call transaction
fn build_sign_transaction(
    config: &NearSignerConfig,
    signing_key: &SigningKey,
    nonce: u64,
    block_hash: [u8; 32],
    payload: &[u8; 32],
    path: &str,
) -> Result<Vec<u8>> {
    let args = serde_json::to_vec(&serde_json::json!({
        "request": {
            "payload": payload.to_vec(),
            "path": path,
            "key_version": KEY_VERSION,
        }
    }))
    .map_err(|e| Error::Serialization(e.to_string()))?;

    let transaction = Transaction {
        signer_id: config.account_id.clone(),
        public_key: NearPublicKey {
            key_type: ED25519_KEY_TYPE,
            data: signing_key.verifying_key().to_bytes(),
        },
        nonce,
        receiver_id: config.contract_id.clone(),
        block_hash,
        actions: vec![Action::FunctionCall(FunctionCallAction {
            method_name: "sign".to_string(),
            args,
            gas: config.gas,
            deposit: config.deposit,
        })],
    };

    let encoded = transaction
        .try_to_vec()
        .map_err(|e| Error::Serialization(e.to_string()))?;
    let hash = Sha256::digest(&encoded);

    SignedTransaction {
        transaction,
        signature: NearSignature {
            key_type: ED25519_KEY_TYPE,
            data: signing_key.sign(&hash).to_bytes(),
        },
    }
    .try_to_vec()
    .map_err(|e| Error::Serialization(e.to_string()))
}

/// Extract the decoded `SuccessValue` of a final execution outcome
fn success_value(outcome: &serde_json::Value) -> Result<Vec<u8>> {
    let status = outcome
        .get("status")
        .ok_or_else(|| Error::Signing("Missing execution status".to_string()))?;

    if let Some(failure) = status.get("Failure") {
        return Err(Error::Signing(format!("sign call failed: {}", failure)));
    }

    let value = status
        .get("SuccessValue")
        .and_then(|value| value.as_str())
        .ok_or_else(|| Error::Signing(format!("Unexpected execution status: {}", status)))?;

    BASE64
        .decode(value)
        .map_err(|e| Error::Signing(format!("Invalid SuccessValue: {}", e)))
}
