//! Common types shared by every provider adapter.

use serde::{Deserialize, Serialize};

use crate::constants::ProviderId;

/// Account exposed by a wallet provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub provider_id: ProviderId,
    pub name: String,
    pub address: String,
    /// Rekeyed signing authority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_addr: Option<String>,
}

impl Account {
    pub fn new(provider_id: ProviderId, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            provider_id,
            name: name.into(),
            address: address.into(),
            auth_addr: None,
        }
    }

    pub fn with_auth_addr(mut self, auth_addr: Option<String>) -> Self {
        self.auth_addr = auth_addr;
        self
    }

    /// Address whose key signs for this account
    pub fn signer(&self) -> &str {
        self.auth_addr.as_deref().unwrap_or(&self.address)
    }
}

/// Static description of a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: ProviderId,
    pub name: String,
    /// Data URI or URL of the provider icon
    pub icon: String,
    pub is_wallet_connect: bool,
}

impl Metadata {
    pub fn new(id: ProviderId, name: &str, icon: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            icon: icon.to_string(),
            is_wallet_connect: false,
        }
    }

    pub fn wallet_connect(mut self) -> Self {
        self.is_wallet_connect = true;
        self
    }
}

/// Snapshot returned by `connect` and `reconnect`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Option<ProviderId>,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub is_wallet_connect: Option<bool>,
    pub accounts: Vec<Account>,
}

impl Wallet {
    pub fn from_metadata(metadata: &Metadata, accounts: Vec<Account>) -> Self {
        Self {
            id: Some(metadata.id),
            name: Some(metadata.name.clone()),
            icon: Some(metadata.icon.clone()),
            is_wallet_connect: Some(metadata.is_wallet_connect),
            accounts,
        }
    }
}

/// Asset holding of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Asset {
    pub asset_id: u64,
    pub amount: u64,
    #[serde(default)]
    pub is_frozen: bool,
}

/// Account state reported by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccountInfo {
    pub address: String,
    pub amount: u64,
    #[serde(default)]
    pub min_balance: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_addr: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// Transaction entry in the wallet signing request format.
///
/// An empty `signers` list asks the wallet not to sign the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    /// Base64 unsigned transaction
    pub txn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_addr: Option<String>,
}

impl WalletTransaction {
    pub fn sign(txn: String, auth_addr: Option<String>) -> Self {
        Self {
            txn,
            signers: None,
            auth_addr,
        }
    }

    pub fn skip(txn: String) -> Self {
        Self {
            txn,
            signers: Some(Vec::new()),
            auth_addr: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(&self.signers, Some(signers) if signers.is_empty())
    }
}

/// Transaction group input: a flat list or a list of groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnGroups {
    Flat(Vec<Vec<u8>>),
    Nested(Vec<Vec<Vec<u8>>>),
}

impl TxnGroups {
    /// Flattened view; indexes refer to these positions
    pub fn flatten(&self) -> Vec<&[u8]> {
        match self {
            TxnGroups::Flat(txns) => txns.iter().map(Vec::as_slice).collect(),
            TxnGroups::Nested(groups) => groups
                .iter()
                .flat_map(|group| group.iter().map(Vec::as_slice))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TxnGroups::Flat(txns) => txns.len(),
            TxnGroups::Nested(groups) => groups.iter().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Vec<u8>>> for TxnGroups {
    fn from(txns: Vec<Vec<u8>>) -> Self {
        TxnGroups::Flat(txns)
    }
}

impl From<Vec<Vec<Vec<u8>>>> for TxnGroups {
    fn from(groups: Vec<Vec<Vec<u8>>>) -> Self {
        TxnGroups::Nested(groups)
    }
}
