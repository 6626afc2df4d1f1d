//! algo-connect - wallet provider adapters for an ed25519 ledger
//!
//! One adapter contract over relay, injected, keystore, hosted-key,
//! mnemonic and custom wallets, with a registry that builds them from
//! declarations and a manager that tracks the connected accounts.

pub mod constants;
pub mod keys;
pub mod manager;
pub mod node;
pub mod providers;
pub mod registry;
pub mod session;
pub mod txn;

pub use constants::{Network, ProviderClass, ProviderId};
pub use manager::{ConnectionStatus, ProviderView, WalletManager, WalletState};
pub use node::{AlgodClient, NodeClient, NodeConfig};
pub use providers::{Account, ProviderError, TxnGroups, Wallet, WalletAdapter};
pub use registry::{
    initialize_providers, initialize_providers_with_node, reconnect_providers, HostEnvironment,
    ProviderDef, ProviderOptions, Registry,
};
pub use session::{FileSessionStore, MemorySessionStore, SessionStore};
