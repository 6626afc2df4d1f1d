//! Transaction Codec
//!
//! Encoded transactions are JSON documents. An unsigned transaction is the
//! bare [`Transaction`] object; a signed one wraps it as
//! `{"txn": .., "sig": .., "sgnr": ..}`. Signatures cover `b"TX"` followed
//! by the encoded unsigned transaction.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};
use std::collections::BTreeMap;

use crate::keys::{account::verify, LocalAccount};
use crate::providers::ProviderError;

/// Domain separation prefix for transaction signatures
const SIGN_PREFIX: &[u8] = b"TX";

/// Transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnType {
    /// Payment
    Pay,
    /// Key registration
    Keyreg,
    /// Asset configuration
    Acfg,
    /// Asset transfer
    Axfer,
    /// Asset freeze
    Afrz,
    /// Application call
    Appl,
    /// State proof
    Stpf,
}

impl std::fmt::Display for TxnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TxnType::Pay => "pay",
            TxnType::Keyreg => "keyreg",
            TxnType::Acfg => "acfg",
            TxnType::Axfer => "axfer",
            TxnType::Afrz => "afrz",
            TxnType::Appl => "appl",
            TxnType::Stpf => "stpf",
        };
        write!(f, "{}", s)
    }
}

/// Unsigned transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub kind: TxnType,
    #[serde(rename = "snd")]
    pub sender: String,
    #[serde(rename = "rcv", default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(rename = "amt", default)]
    pub amount: u64,
    #[serde(default)]
    pub fee: u64,
    #[serde(rename = "fv")]
    pub first_valid: u64,
    #[serde(rename = "lv")]
    pub last_valid: u64,
    #[serde(rename = "gen", default, skip_serializing_if = "Option::is_none")]
    pub genesis_id: Option<String>,
    #[serde(rename = "gh", default, skip_serializing_if = "Option::is_none")]
    pub genesis_hash: Option<String>,
    /// Base64 group id
    #[serde(rename = "grp", default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Base64 note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(rename = "xaid", default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<u64>,
    #[serde(rename = "rekey", default, skip_serializing_if = "Option::is_none")]
    pub rekey_to: Option<String>,
}

impl Transaction {
    /// Build a payment
    pub fn payment(sender: &str, receiver: &str, amount: u64, first_valid: u64, last_valid: u64) -> Self {
        Self {
            kind: TxnType::Pay,
            sender: sender.to_string(),
            receiver: Some(receiver.to_string()),
            amount,
            fee: 1000,
            first_valid,
            last_valid,
            genesis_id: None,
            genesis_hash: None,
            group: None,
            note: None,
            asset_id: None,
            rekey_to: None,
        }
    }

    /// Encoded bytes of this transaction
    pub fn encode(&self) -> Vec<u8> {
        // plain structs with string keys always serialize
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Bytes covered by a signature
    pub fn bytes_to_sign(&self) -> Vec<u8> {
        let mut bytes = SIGN_PREFIX.to_vec();
        bytes.extend_from_slice(&self.encode());
        bytes
    }

    /// Transaction id: hex SHA-512/256 of the signing payload
    pub fn id(&self) -> String {
        hex::encode(Sha512_256::digest(self.bytes_to_sign()))
    }

    /// Sign with a local account.
    ///
    /// The account may be the sender itself or a rekey authority; in the
    /// latter case the envelope records the authority.
    pub fn sign(&self, account: &LocalAccount) -> SignedTransaction {
        let sig = account.sign_bytes(&self.bytes_to_sign());
        let auth_addr = (account.address() != self.sender).then(|| account.address().to_string());
        SignedTransaction {
            txn: self.clone(),
            sig: STANDARD.encode(sig),
            auth_addr,
        }
    }

    /// Validity window length in rounds
    pub fn validity_rounds(&self) -> u64 {
        self.last_valid.saturating_sub(self.first_valid)
    }
}

/// Signed transaction envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub txn: Transaction,
    /// Base64 ed25519 signature
    pub sig: String,
    /// Signing authority when it differs from the sender
    #[serde(rename = "sgnr", default, skip_serializing_if = "Option::is_none")]
    pub auth_addr: Option<String>,
}

impl SignedTransaction {
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn id(&self) -> String {
        self.txn.id()
    }

    /// Address whose key produced the signature
    pub fn signer(&self) -> &str {
        self.auth_addr.as_deref().unwrap_or(&self.txn.sender)
    }

    /// Check the signature against the signer address
    pub fn verify(&self) -> Result<(), ProviderError> {
        let sig = decode_base64(&self.sig)?;
        verify(self.signer(), &self.txn.bytes_to_sign(), &sig)?;
        Ok(())
    }
}

/// Either form of encoded transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedTransaction {
    Unsigned(Transaction),
    Signed(SignedTransaction),
}

impl DecodedTransaction {
    pub fn txn(&self) -> &Transaction {
        match self {
            DecodedTransaction::Unsigned(txn) => txn,
            DecodedTransaction::Signed(stxn) => &stxn.txn,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, DecodedTransaction::Signed(_))
    }

    pub fn sender(&self) -> &str {
        &self.txn().sender
    }
}

/// Decode encoded transaction bytes of either form
pub fn decode_transaction(bytes: &[u8]) -> Result<DecodedTransaction, ProviderError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| ProviderError::MalformedInput(format!("Undecodable transaction: {}", e)))?;
    if value.get("txn").is_some() {
        let stxn: SignedTransaction = serde_json::from_value(value)
            .map_err(|e| ProviderError::MalformedInput(format!("Invalid signed transaction: {}", e)))?;
        Ok(DecodedTransaction::Signed(stxn))
    } else {
        let txn: Transaction = serde_json::from_value(value)
            .map_err(|e| ProviderError::MalformedInput(format!("Invalid transaction: {}", e)))?;
        Ok(DecodedTransaction::Unsigned(txn))
    }
}

/// Decode a base64 transaction, checking that its signed state matches `is_signed`
pub fn decode_base64_transaction(txn: &str, is_signed: bool) -> Result<Transaction, ProviderError> {
    let bytes = decode_base64(txn)?;
    match (decode_transaction(&bytes)?, is_signed) {
        (DecodedTransaction::Unsigned(txn), false) => Ok(txn),
        (DecodedTransaction::Signed(stxn), true) => Ok(stxn.txn),
        (_, expected) => Err(ProviderError::MalformedInput(format!(
            "Expected a {} transaction",
            if expected { "signed" } else { "unsigned" }
        ))),
    }
}

/// Emit a decoded transaction as a debug event
pub fn log_encoded_transaction(txn: &str, is_signed: bool) {
    match decode_base64_transaction(txn, is_signed) {
        Ok(decoded) => tracing::debug!(
            id = %decoded.id(),
            kind = %decoded.kind,
            sender = %decoded.sender,
            receiver = ?decoded.receiver,
            amount = decoded.amount,
            fee = decoded.fee,
            first_valid = decoded.first_valid,
            last_valid = decoded.last_valid,
            signed = is_signed,
            "Decoded transaction"
        ),
        Err(e) => tracing::warn!("Could not decode transaction: {}", e),
    }
}

/// Decode base64 bytes
pub fn decode_base64(data: &str) -> Result<Vec<u8>, ProviderError> {
    STANDARD
        .decode(data)
        .map_err(|e| ProviderError::MalformedInput(format!("Invalid base64: {}", e)))
}

/// Encode bytes to base64
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Marker used by name-service style transaction arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnMarker {
    #[serde(rename = "u")]
    Unsigned,
    #[serde(rename = "s")]
    Signed,
}

/// `[["u" | "s", base64], ...]`
pub type TransactionsArray = Vec<(TxnMarker, String)>;

/// Summary of one transaction for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnInfo {
    pub group_index: usize,
    pub amount: u64,
    pub from: String,
    pub to: Option<String>,
    #[serde(rename = "type")]
    pub kind: TxnType,
    /// Base64 unsigned transaction
    pub txn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_txn: Option<Vec<u8>>,
}

/// Decode a transactions array into raw bytes
pub fn encode_nfd_transactions_array(transactions: &[(TxnMarker, String)]) -> Result<Vec<Vec<u8>>, ProviderError> {
    transactions
        .iter()
        .map(|(_, txn)| decode_base64(txn))
        .collect()
}

/// Group a transactions array by sender, keeping original positions
pub fn group_transactions_by_sender(
    transactions: &[(TxnMarker, String)],
) -> Result<BTreeMap<String, Vec<TxnInfo>>, ProviderError> {
    let mut grouped: BTreeMap<String, Vec<TxnInfo>> = BTreeMap::new();

    for (index, (marker, encoded)) in transactions.iter().enumerate() {
        let bytes = decode_base64(encoded)?;
        let (txn, signed_txn) = match (decode_transaction(&bytes)?, marker) {
            (DecodedTransaction::Unsigned(txn), TxnMarker::Unsigned) => (txn, None),
            (DecodedTransaction::Signed(stxn), TxnMarker::Signed) => (stxn.txn, Some(bytes)),
            _ => {
                return Err(ProviderError::MalformedInput(format!(
                    "Transaction {} does not match its marker",
                    index
                )))
            }
        };

        grouped.entry(txn.sender.clone()).or_default().push(TxnInfo {
            group_index: index,
            amount: txn.amount,
            from: txn.sender.clone(),
            to: txn.receiver.clone(),
            kind: txn.kind,
            txn: encode_base64(&txn.encode()),
            signed_txn,
        });
    }

    Ok(grouped)
}
