//! Relay Wallet Adapter
//!
//! Mobile wallets reached through a relay/bridge session (Pera, Defly,
//! Daffi, WalletConnect). The session id is persisted so a later process
//! can resume it; a watcher task reports sessions closed from the wallet
//! side.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    Account, AdapterCore, ClientLoader, OnDisconnect, ProviderError, SigningPlan, TxnGroups,
    Wallet, WalletAdapter, WalletTransaction,
};
use crate::constants::{ProviderClass, ProviderId};
use crate::session::{session_key, SessionStore};

/// Application identity shown in the wallet's approval screen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    pub icons: Vec<String>,
}

/// Relay provider options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayOptions {
    /// Required by walletconnect
    pub project_id: Option<String>,
    pub relay_url: Option<String>,
    pub app: Option<AppMetadata>,
}

/// Session request sent to the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConnectRequest {
    pub provider: ProviderId,
    pub chain_id: u64,
    pub caip2_chain: Option<String>,
    pub options: RelayOptions,
}

/// Live relay session
#[derive(Debug)]
pub struct RelaySession {
    pub session_id: String,
    pub accounts: Vec<String>,
    /// Resolves when the wallet ends the session
    pub closed: oneshot::Receiver<()>,
}

/// Relay wallet SDK
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Ask the wallet to approve a new session
    async fn connect(&self, request: &RelayConnectRequest) -> Result<RelaySession, ProviderError>;

    /// Resume a stored session, `None` if the relay no longer knows it
    async fn reconnect_session(&self, session_id: &str) -> Result<Option<RelaySession>, ProviderError>;

    async fn disconnect(&self, session_id: &str) -> Result<(), ProviderError>;

    /// Returns signed bytes for every entry not marked to skip, in order
    async fn sign_transactions(
        &self,
        session_id: &str,
        chain_id: u64,
        txns: Vec<WalletTransaction>,
    ) -> Result<Vec<Vec<u8>>, ProviderError>;
}

struct ActiveSession {
    id: String,
    watcher: JoinHandle<()>,
}

/// Adapter for relay-connected wallets
pub struct RelayAdapter {
    core: AdapterCore,
    client: ClientLoader<dyn RelayClient>,
    options: RelayOptions,
    store: Arc<dyn SessionStore>,
    session: RwLock<Option<ActiveSession>>,
}

impl RelayAdapter {
    pub fn new(
        core: AdapterCore,
        client: ClientLoader<dyn RelayClient>,
        options: RelayOptions,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, ProviderError> {
        if core.id().class() != ProviderClass::Relay {
            return Err(ProviderError::InvalidConfig(format!(
                "{} is not a relay provider",
                core.id()
            )));
        }
        if core.id() == ProviderId::Walletconnect
            && options.project_id.as_deref().map_or(true, str::is_empty)
        {
            return Err(ProviderError::InvalidConfig(
                "walletconnect requires a project_id".to_string(),
            ));
        }

        Ok(Self {
            core,
            client,
            options,
            store,
            session: RwLock::new(None),
        })
    }

    fn request(&self) -> RelayConnectRequest {
        RelayConnectRequest {
            provider: self.core.id(),
            chain_id: self.core.network().relay_chain_id(),
            caip2_chain: self.core.network().caip2_chain(),
            options: self.options.clone(),
        }
    }

    fn accounts(&self, addresses: &[String]) -> Vec<Account> {
        addresses
            .iter()
            .enumerate()
            .map(|(i, address)| {
                Account::new(
                    self.core.id(),
                    format!("{} Wallet {}", self.core.metadata().name, i + 1),
                    address.clone(),
                )
            })
            .collect()
    }

    /// Adopt a session and start watching for remote closure
    async fn install(&self, session: RelaySession, on_disconnect: OnDisconnect) -> Result<Wallet, ProviderError> {
        let key = session_key(self.core.id());
        self.store.set(&key, &session.session_id).await?;

        let id = self.core.id();
        let store = self.store.clone();
        let connected = self.core.connected_flag();
        let closed = session.closed;
        let watcher = tokio::spawn(async move {
            if closed.await.is_ok() {
                info!("{} session closed by the wallet", id);
                *connected.write().await = false;
                if let Err(e) = store.remove(&key).await {
                    warn!("Failed to clear {} session: {}", id, e);
                }
                on_disconnect();
            }
        });

        let previous = self.session.write().await.replace(ActiveSession {
            id: session.session_id,
            watcher,
        });
        if let Some(previous) = previous {
            previous.watcher.abort();
        }

        self.core.set_connected(true).await;
        Ok(self.core.wallet(self.accounts(&session.accounts)))
    }
}

#[async_trait]
impl WalletAdapter for RelayAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn connect(
        &self,
        on_disconnect: OnDisconnect,
        _email: Option<&str>,
    ) -> Result<Wallet, ProviderError> {
        let client = self.client.get().await?;
        let session = client.connect(&self.request()).await?;
        debug!("{} approved session {}", self.core.id(), session.session_id);

        let wallet = self.install(session, on_disconnect).await?;
        info!("{} connected with {} account(s)", self.core.id(), wallet.accounts.len());
        Ok(wallet)
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        if let Some(session) = self.session.write().await.take() {
            session.watcher.abort();
            match self.client.get().await {
                Ok(client) => {
                    if let Err(e) = client.disconnect(&session.id).await {
                        warn!("{} disconnect failed: {}", self.core.id(), e);
                    }
                }
                Err(e) => warn!("{} client unavailable on disconnect: {}", self.core.id(), e),
            }
            info!("{} disconnected", self.core.id());
        }

        self.store.remove(&session_key(self.core.id())).await?;
        self.core.set_connected(false).await;
        Ok(())
    }

    async fn reconnect(&self, on_disconnect: OnDisconnect) -> Result<Option<Wallet>, ProviderError> {
        let key = session_key(self.core.id());
        let Some(session_id) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let client = self.client.get().await?;
        match client.reconnect_session(&session_id).await? {
            Some(session) => {
                let wallet = self.install(session, on_disconnect).await?;
                info!("{} session restored", self.core.id());
                Ok(Some(wallet))
            }
            None => {
                info!("{} session {} no longer exists", self.core.id(), session_id);
                self.store.remove(&key).await?;
                self.core.set_connected(false).await;
                on_disconnect();
                Ok(None)
            }
        }
    }

    async fn sign_transactions(
        &self,
        connected_accounts: &[Account],
        groups: &TxnGroups,
        indexes_to_sign: Option<&[usize]>,
        return_group: bool,
    ) -> Result<Vec<Vec<u8>>, ProviderError> {
        let _guard = self.core.begin_signing()?;
        self.core.ensure_connected().await?;

        let plan = SigningPlan::build(connected_accounts, groups, indexes_to_sign)?;
        if plan.candidate_count() == 0 {
            return plan.merge(Vec::new(), return_group);
        }

        let session_id = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.id.clone())
            .ok_or(ProviderError::NotConnected(self.core.id()))?;

        let client = self.client.get().await?;
        let signed = client
            .sign_transactions(
                &session_id,
                self.core.network().relay_chain_id(),
                plan.wallet_transactions(),
            )
            .await?;

        plan.merge(signed, return_group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::Network;
    use crate::providers::default_metadata;
    use crate::providers::ignore_disconnect;
    use crate::providers::testing::{counting_disconnect, unsigned_txn, MockNode, MockRelay};
    use crate::session::MemorySessionStore;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn adapter(id: ProviderId, relay: Arc<MockRelay>, store: Arc<dyn SessionStore>) -> RelayAdapter {
        let core = AdapterCore::new(default_metadata(id), Network::Testnet, Arc::new(MockNode::new()));
        let client: Arc<dyn RelayClient> = relay;
        RelayAdapter::new(core, ClientLoader::ready(client), RelayOptions::default(), store).unwrap()
    }

    #[tokio::test]
    async fn test_connect_tags_accounts_and_persists() {
        let relay = Arc::new(MockRelay::new(&["A", "B"]));
        let store = Arc::new(MemorySessionStore::new());
        let pera = adapter(ProviderId::Pera, relay.clone(), store.clone());

        let wallet = pera.connect(ignore_disconnect(), None).await.unwrap();
        assert_eq!(wallet.accounts.len(), 2);
        assert!(wallet.accounts.iter().all(|a| a.provider_id == ProviderId::Pera));
        assert_eq!(wallet.accounts[1].name, "Pera Wallet 2");
        assert_eq!(wallet.is_wallet_connect, Some(true));
        assert!(store.get(&session_key(ProviderId::Pera)).await.unwrap().is_some());
        assert_eq!(relay.last_request().unwrap().chain_id, 416002);
    }

    #[tokio::test]
    async fn test_connect_rejected() {
        let relay = Arc::new(MockRelay::new(&["A"]).rejecting_connect());
        let pera = adapter(ProviderId::Pera, relay, Arc::new(MemorySessionStore::new()));
        let err = pera.connect(ignore_disconnect(), None).await.unwrap_err();
        assert!(matches!(err, ProviderError::ConnectionRejected(_)));
    }

    #[tokio::test]
    async fn test_reconnect_without_session() {
        let relay = Arc::new(MockRelay::new(&["A"]));
        let defly = adapter(ProviderId::Defly, relay, Arc::new(MemorySessionStore::new()));
        assert!(defly.reconnect(ignore_disconnect()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reconnect_restores_in_new_instance() {
        let relay = Arc::new(MockRelay::new(&["A"]));
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let first = adapter(ProviderId::Defly, relay.clone(), store.clone());
        first.connect(ignore_disconnect(), None).await.unwrap();

        let second = adapter(ProviderId::Defly, relay, store);
        let wallet = second.reconnect(ignore_disconnect()).await.unwrap().unwrap();
        assert_eq!(wallet.accounts[0].address, "A");
        assert!(second.core().is_connected().await);
    }

    #[tokio::test]
    async fn test_reconnect_dropped_session_clears_and_notifies() {
        let relay = Arc::new(MockRelay::new(&["A"]));
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let first = adapter(ProviderId::Daffi, relay.clone(), store.clone());
        first.connect(ignore_disconnect(), None).await.unwrap();
        relay.forget_sessions();

        let second = adapter(ProviderId::Daffi, relay, store.clone());
        let (callback, count, _) = counting_disconnect();
        assert!(second.reconnect(callback).await.unwrap().is_none());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(store.get(&session_key(ProviderId::Daffi)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_close_fires_callback_once() {
        let relay = Arc::new(MockRelay::new(&["A"]));
        let pera = adapter(ProviderId::Pera, relay.clone(), Arc::new(MemorySessionStore::new()));
        let (callback, count, notify) = counting_disconnect();
        pera.connect(callback, None).await.unwrap();

        relay.close_sessions();
        tokio::time::timeout(Duration::from_secs(1), notify.notified())
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!pera.core().is_connected().await);
    }

    #[tokio::test]
    async fn test_local_disconnect_is_silent_and_idempotent() {
        let relay = Arc::new(MockRelay::new(&["A"]));
        let pera = adapter(ProviderId::Pera, relay.clone(), Arc::new(MemorySessionStore::new()));
        let (callback, count, _) = counting_disconnect();
        pera.connect(callback, None).await.unwrap();

        pera.disconnect().await.unwrap();
        pera.disconnect().await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(relay.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_sign_three_transactions_with_indexes() {
        let relay = Arc::new(MockRelay::new(&["A"]));
        let pera = adapter(ProviderId::Pera, relay.clone(), Arc::new(MemorySessionStore::new()));
        let wallet = pera.connect(ignore_disconnect(), None).await.unwrap();

        let txns = vec![unsigned_txn("A"), unsigned_txn("A"), unsigned_txn("A")];
        let groups = TxnGroups::Flat(txns.clone());
        let out = pera
            .sign_transactions(&wallet.accounts, &groups, Some(&[0, 2]), true)
            .await
            .unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out[1], txns[1]);
        assert_ne!(out[0], txns[0]);
        assert_ne!(out[2], txns[2]);

        let request = &relay.sign_requests()[0];
        assert!(request[1].is_skipped());
        assert!(!request[0].is_skipped());
    }

    #[tokio::test]
    async fn test_sign_requires_connection() {
        let relay = Arc::new(MockRelay::new(&["A"]));
        let pera = adapter(ProviderId::Pera, relay, Arc::new(MemorySessionStore::new()));
        let accounts = vec![Account::new(ProviderId::Pera, "a", "A")];
        let groups = TxnGroups::Flat(vec![unsigned_txn("A")]);
        let err = pera
            .sign_transactions(&accounts, &groups, None, false)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::NotConnected(ProviderId::Pera));
    }

    #[tokio::test]
    async fn test_concurrent_sign_rejected() {
        let relay = Arc::new(MockRelay::new(&["A"]).with_sign_delay(Duration::from_millis(20)));
        let pera = adapter(ProviderId::Pera, relay, Arc::new(MemorySessionStore::new()));
        let wallet = pera.connect(ignore_disconnect(), None).await.unwrap();
        let groups = TxnGroups::Flat(vec![unsigned_txn("A")]);

        let (first, second) = tokio::join!(
            pera.sign_transactions(&wallet.accounts, &groups, None, false),
            pera.sign_transactions(&wallet.accounts, &groups, None, false),
        );
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), ProviderError::SigningInProgress(ProviderId::Pera));

        // slot is free again
        assert!(pera
            .sign_transactions(&wallet.accounts, &groups, None, false)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_user_rejects_signing() {
        let relay = Arc::new(MockRelay::new(&["A"]).rejecting_sign());
        let pera = adapter(ProviderId::Pera, relay, Arc::new(MemorySessionStore::new()));
        let wallet = pera.connect(ignore_disconnect(), None).await.unwrap();
        let groups = TxnGroups::Flat(vec![unsigned_txn("A")]);
        let err = pera
            .sign_transactions(&wallet.accounts, &groups, None, true)
            .await
            .unwrap_err();
        assert!(err.is_user_rejection());
    }

    #[test]
    fn test_walletconnect_requires_project_id() {
        let core = AdapterCore::new(
            default_metadata(ProviderId::Walletconnect),
            Network::Mainnet,
            Arc::new(MockNode::new()),
        );
        let result = RelayAdapter::new(
            core,
            ClientLoader::ready(Arc::new(MockRelay::new(&[])) as Arc<dyn RelayClient>),
            RelayOptions::default(),
            Arc::new(MemorySessionStore::new()),
        );
        assert!(matches!(result, Err(ProviderError::InvalidConfig(_))));
    }
}
