//! Provider identifiers, networks and node defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_NETWORK: Network = Network::Mainnet;
pub const DEFAULT_NODE_BASEURL: &str = "https://mainnet-api.algonode.cloud";
pub const DEFAULT_NODE_TOKEN: &str = "";
pub const DEFAULT_NODE_PORT: &str = "";

/// Number of rounds to wait for confirmation when nothing better is known
pub const DEFAULT_WAIT_ROUNDS: u64 = 4;

/// Identifies a wallet provider integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Kmd,
    Custom,
    Pera,
    Daffi,
    Myalgo,
    Algosigner,
    Defly,
    Exodus,
    Walletconnect,
    Mnemonic,
    Magic,
    Lute,
    Kibisis,
}

impl ProviderId {
    pub const ALL: [ProviderId; 13] = [
        ProviderId::Kmd,
        ProviderId::Custom,
        ProviderId::Pera,
        ProviderId::Daffi,
        ProviderId::Myalgo,
        ProviderId::Algosigner,
        ProviderId::Defly,
        ProviderId::Exodus,
        ProviderId::Walletconnect,
        ProviderId::Mnemonic,
        ProviderId::Magic,
        ProviderId::Lute,
        ProviderId::Kibisis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Kmd => "kmd",
            ProviderId::Custom => "custom",
            ProviderId::Pera => "pera",
            ProviderId::Daffi => "daffi",
            ProviderId::Myalgo => "myalgo",
            ProviderId::Algosigner => "algosigner",
            ProviderId::Defly => "defly",
            ProviderId::Exodus => "exodus",
            ProviderId::Walletconnect => "walletconnect",
            ProviderId::Mnemonic => "mnemonic",
            ProviderId::Magic => "magic",
            ProviderId::Lute => "lute",
            ProviderId::Kibisis => "kibisis",
        }
    }

    /// Connection model this provider belongs to
    pub fn class(&self) -> ProviderClass {
        match self {
            ProviderId::Pera | ProviderId::Defly | ProviderId::Daffi | ProviderId::Walletconnect => {
                ProviderClass::Relay
            }
            ProviderId::Algosigner
            | ProviderId::Exodus
            | ProviderId::Myalgo
            | ProviderId::Lute
            | ProviderId::Kibisis => ProviderClass::Injected,
            ProviderId::Kmd => ProviderClass::Keystore,
            ProviderId::Magic => ProviderClass::HostedKey,
            ProviderId::Mnemonic => ProviderClass::Mnemonic,
            ProviderId::Custom => ProviderClass::Custom,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .iter()
            .find(|id| id.as_str() == s.to_lowercase())
            .copied()
            .ok_or_else(|| format!("Unknown provider: {}", s))
    }
}

/// Connection model classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderClass {
    /// Persistent remote session approved from a mobile wallet
    Relay,
    /// Signer object injected into the host page
    Injected,
    /// Local keystore daemon holding keys behind a password
    Keystore,
    /// Hosted key service unlocked with an email login
    HostedKey,
    /// Raw mnemonic supplied by the user
    Mnemonic,
    /// Caller-supplied implementation
    Custom,
}

/// Ledger network
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Network {
    Mainnet,
    Testnet,
    Betanet,
    Custom(String),
}

impl Network {
    pub fn as_str(&self) -> &str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Betanet => "betanet",
            Network::Custom(name) => name,
        }
    }

    /// Genesis id the injected signers expect, e.g. `mainnet-v1.0`
    pub fn genesis_id(&self) -> String {
        format!("{}-v1.0", self.as_str())
    }

    /// Genesis hash of the public networks
    pub fn genesis_hash(&self) -> Option<&'static str> {
        match self {
            Network::Mainnet => Some("wGHE2Pwdvd7S12BL5FaOP20EGYesN73ktiC1qzkkit8="),
            Network::Testnet => Some("SGO1GKSzyE7IEPItTxCByw9x8FmnrCDexi9/cOUJOiI="),
            Network::Betanet => Some("mFgazF-2uRS1tMiL9dsj01hJGySEmPN28B/TjjvpVW0="),
            Network::Custom(_) => None,
        }
    }

    /// Numeric chain id used by the relay wallets
    pub fn relay_chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 416001,
            Network::Testnet => 416002,
            Network::Betanet => 416003,
            Network::Custom(_) => 4160,
        }
    }

    /// CAIP-2 chain reference, built from the first 32 chars of the genesis hash
    pub fn caip2_chain(&self) -> Option<String> {
        self.genesis_hash()
            .map(|hash| format!("algorand:{}", &hash[..32]))
    }
}

impl Default for Network {
    fn default() -> Self {
        DEFAULT_NETWORK
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for Network {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "mainnet" => Network::Mainnet,
            "testnet" => Network::Testnet,
            "betanet" => Network::Betanet,
            _ => Network::Custom(s),
        }
    }
}

impl From<Network> for String {
    fn from(network: Network) -> Self {
        network.as_str().to_string()
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("Network name cannot be empty".to_string());
        }
        Ok(Network::from(s.to_string()))
    }
}
