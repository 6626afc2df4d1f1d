//! Wallet Manager
//!
//! Application-facing facade over the registry. Holds the connected
//! accounts and the active account in a watch channel, dispatches signing
//! and node queries to the adapter owning the active account, and can
//! persist its state across restarts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::ProviderId;
use crate::node::ConfirmedTransaction;
use crate::providers::{
    Account, AccountInfo, Asset, Metadata, OnDisconnect, ProviderError, TxnGroups, Wallet,
    WalletAdapter,
};
use crate::registry::{reconnect_providers, ReconnectOutcome, Registry};
use crate::session::SessionStore;
use crate::txn::{Transaction, TxnInfo, TxnMarker};

/// Storage key of the persisted manager state
pub const STATE_KEY: &str = "algo-connect:state";

/// Observable manager state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    pub accounts: Vec<Account>,
    pub active_account: Option<Account>,
    /// Set once the startup reconnect sweep has finished
    #[serde(skip)]
    pub hydrated: bool,
}

impl WalletState {
    /// Add accounts, skipping ones already known for the same provider
    pub fn add_accounts(&mut self, accounts: &[Account]) {
        for account in accounts {
            let exists = self
                .accounts
                .iter()
                .any(|a| a.provider_id == account.provider_id && a.address == account.address);
            if !exists {
                self.accounts.push(account.clone());
            }
        }
    }

    /// Drop a provider's accounts, clearing the active account if it was one
    pub fn remove_provider(&mut self, provider: ProviderId) {
        self.accounts.retain(|a| a.provider_id != provider);
        if self
            .active_account
            .as_ref()
            .is_some_and(|a| a.provider_id == provider)
        {
            self.active_account = None;
        }
    }

    /// Replace a provider's accounts with a fresh list
    pub fn replace_provider(&mut self, provider: ProviderId, accounts: &[Account]) {
        let active = self.active_account.take();
        self.accounts.retain(|a| a.provider_id != provider);
        self.add_accounts(accounts);
        self.active_account = active.filter(|a| {
            a.provider_id != provider || accounts.iter().any(|n| n.address == a.address)
        });
    }

    pub fn status(&self) -> ConnectionStatus {
        if !self.hydrated {
            ConnectionStatus::Initializing
        } else if self.active_account.is_some() {
            ConnectionStatus::Active
        } else if !self.accounts.is_empty() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }
}

/// Overall connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Initializing,
    Disconnected,
    Connected,
    Active,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Initializing => write!(f, "initializing"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Active => write!(f, "active"),
        }
    }
}

/// Per-provider view for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderView {
    pub metadata: Metadata,
    pub accounts: Vec<Account>,
    pub is_active: bool,
    pub is_connected: bool,
}

/// Facade over the provider registry
pub struct WalletManager {
    registry: Registry,
    state: Arc<watch::Sender<WalletState>>,
    persistence: Mutex<Option<JoinHandle<()>>>,
}

impl WalletManager {
    pub fn new(registry: Registry) -> Self {
        let (state, _) = watch::channel(WalletState::default());
        Self {
            registry,
            state: Arc::new(state),
            persistence: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<WalletState> {
        self.state.subscribe()
    }

    /// Current state snapshot
    pub fn state(&self) -> WalletState {
        self.state.borrow().clone()
    }

    fn adapter(&self, provider: ProviderId) -> Result<Arc<dyn WalletAdapter>, ProviderError> {
        self.registry.get(provider).ok_or_else(|| {
            ProviderError::ProviderUnavailable(format!("{} is not initialized", provider))
        })
    }

    /// Callback removing a provider's accounts when its session ends remotely
    fn disconnect_callback(&self, provider: ProviderId) -> OnDisconnect {
        let state = self.state.clone();
        Arc::new(move || {
            info!("{} disconnected remotely", provider);
            state.send_modify(|s| s.remove_provider(provider));
        })
    }

    fn active_adapter(&self) -> Result<(Account, Arc<dyn WalletAdapter>), ProviderError> {
        let active = self.active_account().ok_or(ProviderError::NoActiveAccount)?;
        let adapter = self.adapter(active.provider_id)?;
        Ok((active, adapter))
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Connect a provider and make its first account active
    pub async fn connect(
        &self,
        provider: ProviderId,
        email: Option<&str>,
    ) -> Result<Wallet, ProviderError> {
        let adapter = self.adapter(provider)?;
        let wallet = adapter
            .connect(self.disconnect_callback(provider), email)
            .await?;

        let Some(first) = wallet.accounts.first().cloned() else {
            if let Err(e) = adapter.disconnect().await {
                debug!("Cleanup after empty {} connect failed: {}", provider, e);
            }
            return Err(ProviderError::ConnectionRejected(format!(
                "No accounts found for {}",
                provider
            )));
        };

        self.state.send_modify(|s| {
            s.replace_provider(provider, &wallet.accounts);
            s.active_account = Some(first);
        });
        Ok(wallet)
    }

    pub async fn disconnect(&self, provider: ProviderId) -> Result<(), ProviderError> {
        self.adapter(provider)?.disconnect().await?;
        self.state.send_modify(|s| s.remove_provider(provider));
        Ok(())
    }

    /// Restore one provider's session
    pub async fn reconnect(&self, provider: ProviderId) -> Result<Option<Wallet>, ProviderError> {
        let adapter = self.adapter(provider)?;
        let wallet = adapter.reconnect(self.disconnect_callback(provider)).await?;
        if let Some(wallet) = &wallet {
            self.apply_restored(provider, wallet);
        }
        Ok(wallet)
    }

    /// Reconnect every provider and mark the state hydrated
    pub async fn reconnect_all(&self) -> Vec<ReconnectOutcome> {
        let outcomes = reconnect_providers(&self.registry, |p| self.disconnect_callback(p)).await;
        for outcome in &outcomes {
            if let Ok(Some(wallet)) = &outcome.result {
                self.apply_restored(outcome.provider, wallet);
            }
        }

        // saved accounts whose adapter holds no live session cannot sign
        let mut stale = Vec::new();
        for (id, adapter) in self.registry.iter() {
            let live = match adapter {
                Some(adapter) => adapter.core().is_connected().await,
                None => false,
            };
            if !live {
                stale.push(id);
            }
        }

        self.state.send_modify(|s| {
            for id in &stale {
                if s.accounts.iter().any(|a| a.provider_id == *id) {
                    debug!("Dropping saved {} accounts without a session", id);
                }
                s.remove_provider(*id);
            }
            if s.active_account.is_none() {
                s.active_account = s.accounts.first().cloned();
            }
            s.hydrated = true;
        });
        outcomes
    }

    fn apply_restored(&self, provider: ProviderId, wallet: &Wallet) {
        self.state.send_modify(|s| {
            s.replace_provider(provider, &wallet.accounts);
            if s.active_account.is_none() {
                s.active_account = wallet.accounts.first().cloned();
            }
        });
    }

    /// Make the first account of `provider` active
    pub fn set_active_provider(&self, provider: ProviderId) -> Result<(), ProviderError> {
        let account = self
            .state
            .borrow()
            .accounts
            .iter()
            .find(|a| a.provider_id == provider)
            .cloned()
            .ok_or(ProviderError::NotConnected(provider))?;
        self.state.send_modify(|s| s.active_account = Some(account));
        Ok(())
    }

    /// Make an account active.
    ///
    /// Without `provider`, the address must belong to a single provider.
    pub fn set_active_account(
        &self,
        address: &str,
        provider: Option<ProviderId>,
    ) -> Result<(), ProviderError> {
        let matches: Vec<Account> = self
            .state
            .borrow()
            .accounts
            .iter()
            .filter(|a| a.address == address && provider.map_or(true, |p| a.provider_id == p))
            .cloned()
            .collect();

        let account = match matches.as_slice() {
            [account] => account.clone(),
            [] => {
                return Err(ProviderError::MalformedInput(format!(
                    "No accounts with address {} found",
                    address
                )))
            }
            _ => {
                return Err(ProviderError::MalformedInput(format!(
                    "Address {} is connected through several providers",
                    address
                )))
            }
        };
        self.state.send_modify(|s| s.active_account = Some(account));
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn connected_accounts(&self) -> Vec<Account> {
        self.state.borrow().accounts.clone()
    }

    /// Accounts of the provider owning the active account
    pub fn connected_active_accounts(&self) -> Vec<Account> {
        let state = self.state.borrow();
        match &state.active_account {
            Some(active) => state
                .accounts
                .iter()
                .filter(|a| a.provider_id == active.provider_id)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn active_account(&self) -> Option<Account> {
        self.state.borrow().active_account.clone()
    }

    pub fn active_address(&self) -> Option<String> {
        self.state
            .borrow()
            .active_account
            .as_ref()
            .map(|a| a.address.clone())
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status()
    }

    /// View of every initialized provider in registry order
    pub fn providers(&self) -> Vec<ProviderView> {
        let state = self.state.borrow();
        self.registry
            .adapters()
            .map(|adapter| {
                let id = adapter.id();
                let accounts: Vec<Account> = state
                    .accounts
                    .iter()
                    .filter(|a| a.provider_id == id)
                    .cloned()
                    .collect();
                ProviderView {
                    metadata: adapter.metadata().clone(),
                    is_connected: !accounts.is_empty(),
                    is_active: state
                        .active_account
                        .as_ref()
                        .is_some_and(|a| a.provider_id == id),
                    accounts,
                }
            })
            .collect()
    }

    // =========================================================================
    // Signing and node access
    // =========================================================================

    pub async fn sign_transactions(
        &self,
        groups: &TxnGroups,
        indexes_to_sign: Option<&[usize]>,
        return_group: bool,
    ) -> Result<Vec<Vec<u8>>, ProviderError> {
        let (_, adapter) = self.active_adapter()?;
        let connected = self.connected_active_accounts();
        adapter
            .sign_transactions(&connected, groups, indexes_to_sign, return_group)
            .await
    }

    /// Sign the whole group, then broadcast it and wait for confirmation
    pub async fn send_transactions(
        &self,
        groups: &TxnGroups,
        indexes_to_sign: Option<&[usize]>,
        wait_rounds: Option<u64>,
    ) -> Result<ConfirmedTransaction, ProviderError> {
        let (_, adapter) = self.active_adapter()?;
        let connected = self.connected_active_accounts();
        let signed = adapter
            .sign_transactions(&connected, groups, indexes_to_sign, true)
            .await?;
        adapter.send_raw_transactions(&signed, wait_rounds).await
    }

    /// Signer in the `(group, indexes) -> signed` shape used by composers
    pub async fn sign_group(
        &self,
        txns: &[Transaction],
        indexes_to_sign: &[usize],
    ) -> Result<Vec<Vec<u8>>, ProviderError> {
        let groups = TxnGroups::Flat(txns.iter().map(Transaction::encode).collect());
        self.sign_transactions(&groups, Some(indexes_to_sign), false)
            .await
    }

    pub async fn get_account_info(&self) -> Result<AccountInfo, ProviderError> {
        let (active, adapter) = self.active_adapter()?;
        adapter.get_account_info(&active.address).await
    }

    pub async fn get_assets(&self) -> Result<Vec<Asset>, ProviderError> {
        let (active, adapter) = self.active_adapter()?;
        adapter.get_assets(&active.address).await
    }

    pub fn group_transactions_by_sender(
        &self,
        transactions: &[(TxnMarker, String)],
    ) -> Result<BTreeMap<String, Vec<TxnInfo>>, ProviderError> {
        let (_, adapter) = self.active_adapter()?;
        adapter.group_transactions_by_sender(transactions)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Restore saved accounts from `store` and keep it updated on every change
    pub async fn enable_persistence(&self, store: Arc<dyn SessionStore>) -> Result<(), ProviderError> {
        if let Some(saved) = store.get(STATE_KEY).await? {
            match serde_json::from_str::<WalletState>(&saved) {
                Ok(saved) => {
                    // only providers that exist in this registry
                    let known = |a: &Account| self.registry.get(a.provider_id).is_some();
                    let accounts: Vec<Account> =
                        saved.accounts.into_iter().filter(|a| known(a)).collect();
                    let active = saved.active_account.filter(|a| known(a));
                    self.state.send_modify(|s| {
                        s.add_accounts(&accounts);
                        if s.active_account.is_none() {
                            s.active_account = active;
                        }
                    });
                    debug!("Restored {} account(s)", accounts.len());
                }
                Err(e) => warn!("Ignoring unreadable saved state: {}", e),
            }
        }

        let mut rx = self.state.subscribe();
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                let saved = match serde_json::to_string(&snapshot) {
                    Ok(saved) => saved,
                    Err(e) => {
                        warn!("Failed to serialize state: {}", e);
                        continue;
                    }
                };
                if let Err(e) = store.set(STATE_KEY, &saved).await {
                    warn!("Failed to persist state: {}", e);
                }
            }
        });

        if let Ok(mut slot) = self.persistence.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
        Ok(())
    }
}

impl Drop for WalletManager {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.persistence.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}
