//! Bitcoin transaction functionality
//!
//! Spends legacy P2PKH outputs of a derived address. UTXOs are fetched from
//! and the signed transaction is pushed to an Esplora compatible API.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::amount::Denomination;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Network, OutPoint, PublicKey as BitcoinPublicKey, Script, ScriptBuf,
    Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kdf::Chain;
use crate::signer::{MpcSignature, PayloadSigner};
use super::provider::ProviderConfig;
use super::{ChainSender, Transfer};

/// Outputs below this value are not relayed
pub const DUST_LIMIT_SATS: u64 = 546;

/// Fixed fee used when none is configured
pub const DEFAULT_FEE_SATS: u64 = 1000;

/// Unspent output as listed by `GET /address/{address}/utxo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    /// Value in satoshis
    pub value: u64,
}

impl Utxo {
    fn outpoint(&self) -> Result<OutPoint> {
        let txid = Txid::from_str(&self.txid)
            .map_err(|e| Error::Transaction(format!("Invalid UTXO txid {}: {}", self.txid, e)))?;
        Ok(OutPoint::new(txid, self.vout))
    }
}

/// Bitcoin sender
pub struct BitcoinSender {
    /// Esplora API configuration
    config: ProviderConfig,
    network: Network,
    fee: Amount,
    /// Derivation path of the sending key
    path: String,
    signer: Arc<dyn PayloadSigner>,
}

impl BitcoinSender {
    /// Create a new Bitcoin sender
    pub fn new(
        config: ProviderConfig,
        network: Network,
        fee_sats: u64,
        path: impl Into<String>,
        signer: Arc<dyn PayloadSigner>,
    ) -> Self {
        Self {
            config,
            network,
            fee: Amount::from_sat(fee_sats),
            path: path.into(),
            signer,
        }
    }

    async fn fetch_utxos(&self, client: &reqwest::Client, address: &str) -> Result<Vec<Utxo>> {
        let url = format!("{}/address/{}/utxo", self.config.base_url(), address);

        let response = client.get(&url)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Failed to fetch UTXOs: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::Provider(format!("Failed to fetch UTXOs: {}", e)))?;

        response.json::<Vec<Utxo>>()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse UTXOs: {}", e)))
    }

    async fn broadcast(&self, client: &reqwest::Client, raw_tx: String) -> Result<String> {
        let url = format!("{}/tx", self.config.base_url());

        let response = client.post(&url)
            .body(raw_tx)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Failed to broadcast transaction: {}", e)))?;

        let status = response.status();
        let body = response.text()
            .await
            .map_err(|e| Error::Provider(format!("Failed to read broadcast response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Provider(format!("Broadcast rejected ({}): {}", status, body)));
        }

        Ok(body.trim().to_string())
    }
}

/// Parse an address and check it belongs to `network`
pub fn parse_address(address: &str, network: Network) -> Result<Address> {
    Address::from_str(address)
        .map_err(|e| Error::Transaction(format!("Invalid address {}: {}", address, e)))?
        .require_network(network)
        .map_err(|e| Error::Transaction(format!("Invalid address {}: {}", address, e)))
}

/// Parse a BTC-denominated amount
pub fn parse_amount(amount: &str) -> Result<Amount> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(Error::Transaction("Missing amount".to_string()));
    }

    let amount = Amount::from_str_in(amount, Denomination::Bitcoin)
        .map_err(|e| Error::Transaction(format!("Invalid amount: {}", e)))?;
    if amount == Amount::ZERO {
        return Err(Error::Transaction("Amount must be positive".to_string()));
    }

    Ok(amount)
}

/// Pick the largest UTXOs until `target` is covered
///
/// Returns the selected outputs and their total value.
pub fn select_utxos(utxos: &[Utxo], target: Amount) -> Result<(Vec<Utxo>, Amount)> {
    let mut candidates = utxos.to_vec();
    candidates.sort_by(|a, b| b.value.cmp(&a.value));

    let mut selected = Vec::new();
    let mut total = Amount::ZERO;
    for utxo in candidates {
        if total >= target {
            break;
        }
        total += Amount::from_sat(utxo.value);
        selected.push(utxo);
    }

    if total < target {
        return Err(Error::Transaction(format!(
            "Insufficient funds: have {}, need {}",
            total, target
        )));
    }

    Ok((selected, total))
}

/// Build the unsigned spend of `inputs`, returning change above dust to `change_address`
pub fn build_unsigned_transaction(
    inputs: &[Utxo],
    total: Amount,
    to: &Address,
    amount: Amount,
    change_address: &Address,
    fee: Amount,
) -> Result<Transaction> {
    let change = total
        .checked_sub(amount)
        .and_then(|rest| rest.checked_sub(fee))
        .ok_or_else(|| Error::Transaction("Inputs do not cover amount and fee".to_string()))?;

    let input = inputs
        .iter()
        .map(|utxo| {
            Ok(TxIn {
                previous_output: utxo.outpoint()?,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut output = vec![TxOut {
        value: amount,
        script_pubkey: to.script_pubkey(),
    }];
    if change >= Amount::from_sat(DUST_LIMIT_SATS) {
        output.push(TxOut {
            value: change,
            script_pubkey: change_address.script_pubkey(),
        });
    }

    Ok(Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    })
}

/// Legacy `SIGHASH_ALL` digests of every input, all spending `script_pubkey`
pub fn legacy_sighashes(tx: &Transaction, script_pubkey: &Script) -> Result<Vec<[u8; 32]>> {
    let cache = SighashCache::new(tx);

    (0..tx.input.len())
        .map(|index| {
            cache
                .legacy_signature_hash(index, script_pubkey, EcdsaSighashType::All.to_u32())
                .map(|sighash| sighash.to_byte_array())
                .map_err(|e| Error::Transaction(format!("Failed to compute sighash: {}", e)))
        })
        .collect()
}

/// `<DER signature || SIGHASH_ALL> <public key>`
pub fn script_sig(signature: &MpcSignature, public_key: &BitcoinPublicKey) -> Result<ScriptBuf> {
    let mut sig = signature.to_ecdsa()?.serialize_der().to_vec();
    sig.push(EcdsaSighashType::All.to_u32() as u8);

    let sig = PushBytesBuf::try_from(sig)
        .map_err(|e| Error::Transaction(format!("Invalid signature push: {}", e)))?;

    Ok(Builder::new()
        .push_slice(sig)
        .push_key(public_key)
        .into_script())
}

/// The sender's public key, which must hash to the `from` address
fn sender_public_key(
    transfer: &Transfer,
    from: &Address,
    network: Network,
) -> Result<BitcoinPublicKey> {
    let hex_key = transfer.public_key.as_deref()
        .ok_or_else(|| Error::Transaction("Missing sender public key".to_string()))?;

    let public_key = BitcoinPublicKey::from_str(hex_key)
        .map_err(|e| Error::Transaction(format!("Invalid sender public key: {}", e)))?;

    if Address::p2pkh(&public_key, network) != *from {
        return Err(Error::Transaction("Public key does not match from address".to_string()));
    }

    Ok(public_key)
}

#[async_trait]
impl ChainSender for BitcoinSender {
    fn chain(&self) -> Chain {
        Chain::Bitcoin
    }

    async fn send(&self, transfer: &Transfer) -> Result<String> {
        let from = parse_address(&transfer.from, self.network)?;
        let to = parse_address(&transfer.to, self.network)?;
        let amount = parse_amount(&transfer.amount)?;
        let public_key = sender_public_key(transfer, &from, self.network)?;

        let client = self.config.http_client()?;
        let utxos = self.fetch_utxos(&client, &transfer.from).await?;
        tracing::debug!(address = %transfer.from, count = utxos.len(), "fetched utxos");

        let target = amount
            .checked_add(self.fee)
            .ok_or_else(|| Error::Transaction("Amount overflow".to_string()))?;
        let (selected, total) = select_utxos(&utxos, target)?;

        let mut tx = build_unsigned_transaction(&selected, total, &to, amount, &from, self.fee)?;
        let sighashes = legacy_sighashes(&tx, &from.script_pubkey())?;

        for (input, sighash) in tx.input.iter_mut().zip(sighashes) {
            let signature = self.signer.sign(&sighash, &self.path).await?;
            input.script_sig = script_sig(&signature, &public_key)?;
        }

        let txid = self.broadcast(&client, serialize_hex(&tx)).await?;
        tracing::info!(
            chain = "bitcoin",
            from = %transfer.from,
            to = %transfer.to,
            %txid,
            "transaction broadcast"
        );

        Ok(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::derive_child_secret_key;
    use crate::signer::testing::LocalSigner;
    use secp256k1::{Message, Secp256k1};

    fn utxo(value: u64, vout: u32) -> Utxo {
        Utxo {
            txid: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".to_string(),
            vout,
            value,
        }
    }

    fn addresses() -> (Address, Address) {
        let secp = Secp256k1::new();
        let (_, first) = secp.generate_keypair(&mut secp256k1::rand::rngs::OsRng);
        let (_, second) = secp.generate_keypair(&mut secp256k1::rand::rngs::OsRng);
        (
            Address::p2pkh(&BitcoinPublicKey::new_uncompressed(first), Network::Testnet),
            Address::p2pkh(&BitcoinPublicKey::new_uncompressed(second), Network::Testnet),
        )
    }

    #[test]
    fn test_select_largest_first() {
        let utxos = vec![utxo(1_000, 0), utxo(50_000, 1), utxo(20_000, 2)];

        let (selected, total) = select_utxos(&utxos, Amount::from_sat(60_000)).unwrap();
        assert_eq!(selected.iter().map(|u| u.vout).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(total, Amount::from_sat(70_000));

        let (selected, _) = select_utxos(&utxos, Amount::from_sat(10_000)).unwrap();
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_select_insufficient_funds() {
        let utxos = vec![utxo(1_000, 0), utxo(2_000, 1)];

        match select_utxos(&utxos, Amount::from_sat(5_000)) {
            Err(Error::Transaction(message)) => assert!(message.starts_with("Insufficient funds")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(select_utxos(&[], Amount::from_sat(1)).is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("0.0001").unwrap(), Amount::from_sat(10_000));
        assert!(parse_amount("").is_err());
        assert!(parse_amount("0").is_err());
        assert!(parse_amount("lots").is_err());
    }

    #[test]
    fn test_parse_address_network() {
        let (from, _) = addresses();
        let encoded = from.to_string();

        assert!(parse_address(&encoded, Network::Testnet).is_ok());
        assert!(parse_address(&encoded, Network::Bitcoin).is_err());
        assert!(parse_address("not-an-address", Network::Testnet).is_err());
    }

    #[test]
    fn test_change_output() {
        let (from, to) = addresses();
        let fee = Amount::from_sat(DEFAULT_FEE_SATS);
        let inputs = vec![utxo(50_000, 0)];

        let total = Amount::from_sat(50_000);

        let amount = Amount::from_sat(10_000);
        let tx = build_unsigned_transaction(&inputs, total, &to, amount, &from, fee).unwrap();
        assert_eq!(tx.version, Version::TWO);
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[0].script_pubkey, to.script_pubkey());
        assert_eq!(tx.output[1].value, Amount::from_sat(39_000));
        assert_eq!(tx.output[1].script_pubkey, from.script_pubkey());

        // Change below dust is left to the miner
        let amount = Amount::from_sat(48_700);
        let tx = build_unsigned_transaction(&inputs, total, &to, amount, &from, fee).unwrap();
        assert_eq!(tx.output.len(), 1);

        let overspend = Amount::from_sat(49_500);
        assert!(build_unsigned_transaction(&inputs, total, &to, overspend, &from, fee).is_err());
    }

    #[tokio::test]
    async fn test_signed_inputs_verify() {
        let signer = LocalSigner::random("alice.testnet");
        let secp = Secp256k1::new();
        let child = derive_child_secret_key(signer.master(), "alice.testnet", "bitcoin-1").unwrap();
        let child_public = secp256k1::PublicKey::from_secret_key(&secp, &child);
        let public_key = BitcoinPublicKey::new_uncompressed(child_public);
        let from = Address::p2pkh(&public_key, Network::Testnet);
        let (_, to) = addresses();

        let inputs = vec![utxo(30_000, 0), utxo(30_000, 1)];
        let mut tx = build_unsigned_transaction(
            &inputs,
            Amount::from_sat(60_000),
            &to,
            Amount::from_sat(40_000),
            &from,
            Amount::from_sat(DEFAULT_FEE_SATS),
        )
        .unwrap();
        let sighashes = legacy_sighashes(&tx, &from.script_pubkey()).unwrap();
        assert_eq!(sighashes.len(), 2);
        assert_ne!(sighashes[0], sighashes[1]);

        for (input, sighash) in tx.input.iter_mut().zip(sighashes.iter()) {
            let signature = signer.sign(sighash, "bitcoin-1").await.unwrap();
            let message = Message::from_digest_slice(sighash).unwrap();
            secp.verify_ecdsa(&message, &signature.to_ecdsa().unwrap(), &public_key.inner).unwrap();

            input.script_sig = script_sig(&signature, &public_key).unwrap();
        }

        for input in &tx.input {
            let bytes = input.script_sig.as_bytes();
            let sig_len = bytes[0] as usize;
            assert_eq!(bytes[sig_len], 0x01);
            assert_eq!(bytes[sig_len + 1] as usize, 65);
            assert_eq!(&bytes[sig_len + 2..], &public_key.to_bytes()[..]);
        }
    }

    #[test]
    fn test_sender_public_key_must_match() {
        let secp = Secp256k1::new();
        let (_, key) = secp.generate_keypair(&mut secp256k1::rand::rngs::OsRng);
        let public_key = BitcoinPublicKey::new_uncompressed(key);
        let from = Address::p2pkh(&public_key, Network::Testnet);
        let (other, to) = addresses();

        let mut transfer = Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount: "0.001".to_string(),
            public_key: Some(public_key.to_string()),
        };
        assert_eq!(sender_public_key(&transfer, &from, Network::Testnet).unwrap(), public_key);
        assert!(sender_public_key(&transfer, &other, Network::Testnet).is_err());

        transfer.public_key = None;
        assert!(sender_public_key(&transfer, &from, Network::Testnet).is_err());
    }
}
