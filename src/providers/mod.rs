//! Wallet Provider Adapters
//!
//! Every wallet integration implements the `WalletAdapter` trait, giving the
//! manager one contract for:
//! - Session lifecycle (connect, reconnect, disconnect)
//! - Transaction signing with uniform selection rules
//! - Node helpers (account info, assets, broadcast and confirmation)
//!
//! Adapters are grouped by connection model; see `ProviderClass`.

pub mod custom;
pub mod error;
pub mod injected;
pub mod kmd;
pub mod loader;
pub mod magic;
pub mod mnemonic;
pub mod relay;
pub mod signing;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use custom::{CustomAdapter, CustomOptions, CustomProvider};
pub use error::ProviderError;
pub use injected::{EnableRequest, ExodusOptions, InjectedAccount, InjectedAdapter, InjectedProvider};
pub use kmd::{KeystoreClient, KmdAdapter, KmdHttpClient, KmdOptions, KmdWallet};
pub use loader::ClientLoader;
pub use magic::{HostedKeyClient, MagicAdapter, MagicOptions, MagicUser};
pub use mnemonic::{MnemonicAdapter, SecretPrompt};
pub use relay::{
    AppMetadata, RelayAdapter, RelayClient, RelayConnectRequest, RelayOptions, RelaySession,
};
pub use signing::SigningPlan;
pub use types::*;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::constants::{Network, ProviderId};
use crate::node::{self, ConfirmedTransaction, NodeClient, PendingTransaction};
use crate::txn::{self, Transaction, TxnInfo, TxnMarker};

/// Callback fired when a session ends without a local `disconnect`
pub type OnDisconnect = Arc<dyn Fn() + Send + Sync>;

/// Callback that ignores the event
pub fn ignore_disconnect() -> OnDisconnect {
    Arc::new(|| {})
}

/// Base trait for all wallet provider adapters
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    /// Shared adapter state
    fn core(&self) -> &AdapterCore;

    fn metadata(&self) -> &Metadata {
        self.core().metadata()
    }

    fn id(&self) -> ProviderId {
        self.metadata().id
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Open a session and return the accounts it exposes
    async fn connect(
        &self,
        on_disconnect: OnDisconnect,
        email: Option<&str>,
    ) -> Result<Wallet, ProviderError>;

    /// End the session. Calling it again is a no-op.
    async fn disconnect(&self) -> Result<(), ProviderError>;

    /// Restore a previous session, `None` when there is nothing to restore
    async fn reconnect(&self, on_disconnect: OnDisconnect) -> Result<Option<Wallet>, ProviderError>;

    // =========================================================================
    // Signing
    // =========================================================================

    /// Sign the transactions of `groups` selected by `SigningPlan`
    async fn sign_transactions(
        &self,
        connected_accounts: &[Account],
        groups: &TxnGroups,
        indexes_to_sign: Option<&[usize]>,
        return_group: bool,
    ) -> Result<Vec<Vec<u8>>, ProviderError>;

    // =========================================================================
    // Node helpers
    // =========================================================================

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.core().node().health().await
    }

    async fn get_account_info(&self, address: &str) -> Result<AccountInfo, ProviderError> {
        self.core().node().account_information(address).await
    }

    async fn get_assets(&self, address: &str) -> Result<Vec<Asset>, ProviderError> {
        Ok(self.get_account_info(address).await?.assets)
    }

    async fn wait_for_confirmation(
        &self,
        txid: &str,
        rounds: u64,
    ) -> Result<PendingTransaction, ProviderError> {
        node::wait_for_confirmation(self.core().node().as_ref(), txid, rounds).await
    }

    async fn send_raw_transactions(
        &self,
        txns: &[Vec<u8>],
        rounds: Option<u64>,
    ) -> Result<ConfirmedTransaction, ProviderError> {
        node::send_raw_transactions(self.core().node().as_ref(), txns, rounds).await
    }

    fn decode_transaction(&self, txn: &str, is_signed: bool) -> Result<Transaction, ProviderError> {
        txn::decode_base64_transaction(txn, is_signed)
    }

    fn log_encoded_transaction(&self, txn: &str, is_signed: bool) {
        txn::log_encoded_transaction(txn, is_signed)
    }

    fn group_transactions_by_sender(
        &self,
        transactions: &[(TxnMarker, String)],
    ) -> Result<BTreeMap<String, Vec<TxnInfo>>, ProviderError> {
        txn::group_transactions_by_sender(transactions)
    }
}

/// State every adapter carries
pub struct AdapterCore {
    metadata: Metadata,
    network: Network,
    node: Arc<dyn NodeClient>,
    /// Connection status
    connected: Arc<RwLock<bool>>,
    signing: AtomicBool,
}

impl AdapterCore {
    pub fn new(metadata: Metadata, network: Network, node: Arc<dyn NodeClient>) -> Self {
        Self {
            metadata,
            network,
            node,
            connected: Arc::new(RwLock::new(false)),
            signing: AtomicBool::new(false),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn id(&self) -> ProviderId {
        self.metadata.id
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn node(&self) -> &Arc<dyn NodeClient> {
        &self.node
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Shared handle for tasks that outlive a call
    pub fn connected_flag(&self) -> Arc<RwLock<bool>> {
        self.connected.clone()
    }

    pub async fn set_connected(&self, connected: bool) {
        *self.connected.write().await = connected;
    }

    pub async fn ensure_connected(&self) -> Result<(), ProviderError> {
        if self.is_connected().await {
            Ok(())
        } else {
            Err(ProviderError::NotConnected(self.id()))
        }
    }

    /// Claim the signing slot; a second claim fails until the guard drops
    pub fn begin_signing(&self) -> Result<SigningGuard<'_>, ProviderError> {
        if self.signing.swap(true, Ordering::AcqRel) {
            return Err(ProviderError::SigningInProgress(self.id()));
        }
        Ok(SigningGuard(&self.signing))
    }

    /// Wallet snapshot tagged with this adapter's metadata
    pub fn wallet(&self, accounts: Vec<Account>) -> Wallet {
        Wallet::from_metadata(&self.metadata, accounts)
    }
}

/// Releases the signing slot on drop
pub struct SigningGuard<'a>(&'a AtomicBool);

impl Drop for SigningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Default metadata for each provider
pub fn default_metadata(id: ProviderId) -> Metadata {
    let (name, icon) = match id {
        ProviderId::Kmd => ("KMD", "data:image/svg+xml;base64,a21k"),
        ProviderId::Custom => ("Custom", "data:image/svg+xml;base64,Y3VzdG9t"),
        ProviderId::Pera => ("Pera", "data:image/svg+xml;base64,cGVyYQ=="),
        ProviderId::Daffi => ("Daffi", "data:image/svg+xml;base64,ZGFmZmk="),
        ProviderId::Myalgo => ("MyAlgo", "data:image/svg+xml;base64,bXlhbGdv"),
        ProviderId::Algosigner => ("AlgoSigner", "data:image/svg+xml;base64,YWxnb3NpZ25lcg=="),
        ProviderId::Defly => ("Defly", "data:image/svg+xml;base64,ZGVmbHk="),
        ProviderId::Exodus => ("Exodus", "data:image/svg+xml;base64,ZXhvZHVz"),
        ProviderId::Walletconnect => ("WalletConnect", "data:image/svg+xml;base64,d2M="),
        ProviderId::Mnemonic => ("MNEMONIC", "data:image/svg+xml;base64,bW5lbW9uaWM="),
        ProviderId::Magic => ("Magic", "data:image/svg+xml;base64,bWFnaWM="),
        ProviderId::Lute => ("Lute", "data:image/svg+xml;base64,bHV0ZQ=="),
        ProviderId::Kibisis => ("Kibisis", "data:image/svg+xml;base64,a2liaXNpcw=="),
    };
    let metadata = Metadata::new(id, name, icon);
    if id.class() == crate::constants::ProviderClass::Relay {
        metadata.wallet_connect()
    } else {
        metadata
    }
}
