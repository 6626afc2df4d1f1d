//! Keystore Daemon Adapter
//!
//! Signs with keys held by a local kmd daemon. The wallet is located by
//! name, and every operation opens a short-lived handle token from the
//! configured password and releases it afterwards.

mod api;

pub use api::KmdHttpClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{
    Account, AdapterCore, ClientLoader, OnDisconnect, ProviderError, SigningPlan, TxnGroups,
    Wallet, WalletAdapter,
};
use crate::constants::ProviderId;
use crate::keys::decode_address;
use crate::session::{session_key, SessionStore};
use crate::txn::Transaction;

/// Keystore connection options
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmdOptions {
    pub wallet: String,
    pub password: String,
    pub host: String,
    pub token: String,
    pub port: String,
}

impl Default for KmdOptions {
    fn default() -> Self {
        Self {
            wallet: "unencrypted-default-wallet".to_string(),
            password: String::new(),
            host: "http://127.0.0.1".to_string(),
            token: "a".repeat(64),
            port: "4002".to_string(),
        }
    }
}

impl std::fmt::Debug for KmdOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmdOptions")
            .field("wallet", &self.wallet)
            .field("password", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl KmdOptions {
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.wallet.is_empty() {
            return Err(ProviderError::InvalidConfig("kmd wallet name is empty".to_string()));
        }
        if self.host.is_empty() {
            return Err(ProviderError::InvalidConfig("kmd host is empty".to_string()));
        }
        if !self.port.is_empty() && self.port.parse::<u16>().is_err() {
            return Err(ProviderError::InvalidConfig(format!("Invalid kmd port: {}", self.port)));
        }
        Ok(())
    }
}

/// Wallet known to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmdWallet {
    pub id: String,
    pub name: String,
}

/// Keystore daemon API
#[async_trait]
pub trait KeystoreClient: Send + Sync {
    async fn list_wallets(&self) -> Result<Vec<KmdWallet>, ProviderError>;

    /// Open a handle token for a wallet
    async fn init_wallet_handle(&self, wallet_id: &str, password: &str) -> Result<String, ProviderError>;

    async fn release_wallet_handle(&self, token: &str) -> Result<(), ProviderError>;

    async fn list_keys(&self, token: &str) -> Result<Vec<String>, ProviderError>;

    /// Sign with the key for `public_key`, or the sender's key when unset
    async fn sign_transaction(
        &self,
        token: &str,
        password: &str,
        txn: &Transaction,
        public_key: Option<[u8; 32]>,
    ) -> Result<Vec<u8>, ProviderError>;
}

/// Adapter for the local keystore daemon
pub struct KmdAdapter {
    core: AdapterCore,
    client: ClientLoader<dyn KeystoreClient>,
    options: KmdOptions,
    store: Arc<dyn SessionStore>,
    wallet_id: RwLock<Option<String>>,
}

impl KmdAdapter {
    /// Validate options and check the daemon is reachable
    pub async fn init(
        core: AdapterCore,
        client: ClientLoader<dyn KeystoreClient>,
        options: KmdOptions,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, ProviderError> {
        if core.id() != ProviderId::Kmd {
            return Err(ProviderError::InvalidConfig(format!("{} is not kmd", core.id())));
        }
        options.validate()?;

        let wallets = client.get().await?.list_wallets().await?;
        debug!("kmd reachable with {} wallet(s)", wallets.len());

        Ok(Self {
            core,
            client,
            options,
            store,
            wallet_id: RwLock::new(None),
        })
    }

    async fn release(&self, client: &dyn KeystoreClient, token: &str) {
        if let Err(e) = client.release_wallet_handle(token).await {
            warn!("Failed to release kmd handle: {}", e);
        }
    }

    async fn list_accounts(
        &self,
        client: &dyn KeystoreClient,
        wallet_id: &str,
    ) -> Result<Vec<Account>, ProviderError> {
        let token = client
            .init_wallet_handle(wallet_id, &self.options.password)
            .await?;
        let keys = client.list_keys(&token).await;
        self.release(client, &token).await;

        Ok(keys?
            .into_iter()
            .enumerate()
            .map(|(i, address)| Account::new(ProviderId::Kmd, format!("KMDWallet {}", i + 1), address))
            .collect())
    }

    async fn sign_candidates(
        &self,
        client: &dyn KeystoreClient,
        token: &str,
        plan: &SigningPlan,
    ) -> Result<Vec<Vec<u8>>, ProviderError> {
        let mut signed = Vec::with_capacity(plan.candidate_count());
        for candidate in plan.candidates() {
            let public_key = match candidate.auth_addr {
                Some(auth) => Some(decode_address(auth)?),
                None => None,
            };
            signed.push(
                client
                    .sign_transaction(token, &self.options.password, candidate.txn, public_key)
                    .await?,
            );
        }
        Ok(signed)
    }
}

#[async_trait]
impl WalletAdapter for KmdAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn connect(
        &self,
        _on_disconnect: OnDisconnect,
        _email: Option<&str>,
    ) -> Result<Wallet, ProviderError> {
        let client = self.client.get().await?;
        let wallet = client
            .list_wallets()
            .await?
            .into_iter()
            .find(|w| w.name == self.options.wallet)
            .ok_or_else(|| {
                ProviderError::ConnectionRejected(format!("No wallet named: {}", self.options.wallet))
            })?;

        let accounts = self.list_accounts(client.as_ref(), &wallet.id).await?;
        self.store
            .set(&session_key(ProviderId::Kmd), &wallet.id)
            .await?;
        *self.wallet_id.write().await = Some(wallet.id);
        self.core.set_connected(true).await;

        info!("kmd wallet {} connected with {} account(s)", wallet.name, accounts.len());
        Ok(self.core.wallet(accounts))
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        if self.wallet_id.write().await.take().is_some() {
            info!("kmd disconnected");
        }
        self.store.remove(&session_key(ProviderId::Kmd)).await?;
        self.core.set_connected(false).await;
        Ok(())
    }

    async fn reconnect(&self, _on_disconnect: OnDisconnect) -> Result<Option<Wallet>, ProviderError> {
        let key = session_key(ProviderId::Kmd);
        let Some(wallet_id) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let client = self.client.get().await?;
        let exists = client.list_wallets().await?.iter().any(|w| w.id == wallet_id);
        if !exists {
            info!("kmd wallet {} no longer exists", wallet_id);
            self.store.remove(&key).await?;
            return Ok(None);
        }

        let accounts = self.list_accounts(client.as_ref(), &wallet_id).await?;
        *self.wallet_id.write().await = Some(wallet_id);
        self.core.set_connected(true).await;
        Ok(Some(self.core.wallet(accounts)))
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
        let wallet_id = self
            .wallet_id
            .read()
            .await
            .clone()
            .ok_or(ProviderError::NotConnected(ProviderId::Kmd))?;

        let plan = SigningPlan::build(connected_accounts, groups, indexes_to_sign)?;
        if plan.candidate_count() == 0 {
            return plan.merge(Vec::new(), return_group);
        }

        let client = self.client.get().await?;
        let token = client
            .init_wallet_handle(&wallet_id, &self.options.password)
            .await?;
        let signed = self.sign_candidates(client.as_ref(), &token, &plan).await;
        self.release(client.as_ref(), &token).await;

        plan.merge(signed?, return_group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::Network;
    use crate::keys::LocalAccount;
    use crate::providers::testing::{MockKeystore, MockNode};
    use crate::providers::{default_metadata, ignore_disconnect};
    use crate::session::MemorySessionStore;
    use crate::txn::{decode_transaction, DecodedTransaction};

    async fn adapter(keystore: Arc<MockKeystore>, store: Arc<dyn SessionStore>) -> KmdAdapter {
        let core = AdapterCore::new(
            default_metadata(ProviderId::Kmd),
            Network::Custom("localnet".into()),
            Arc::new(MockNode::new()),
        );
        let client: Arc<dyn KeystoreClient> = keystore;
        KmdAdapter::init(core, ClientLoader::ready(client), KmdOptions::default(), store)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_init_fails_when_unreachable() {
        let core = AdapterCore::new(
            default_metadata(ProviderId::Kmd),
            Network::Testnet,
            Arc::new(MockNode::new()),
        );
        let client: Arc<dyn KeystoreClient> = Arc::new(MockKeystore::unreachable());
        let result = KmdAdapter::init(
            core,
            ClientLoader::ready(client),
            KmdOptions::default(),
            Arc::new(MemorySessionStore::new()),
        )
        .await;
        assert!(matches!(result, Err(ProviderError::ProviderUnavailable(_))));
    }

    #[test]
    fn test_options_validation() {
        let mut options = KmdOptions::default();
        assert!(options.validate().is_ok());
        options.port = "not-a-port".into();
        assert!(options.validate().is_err());
        assert!(!format!("{:?}", KmdOptions::default()).contains(&"a".repeat(64)));
    }

    #[tokio::test]
    async fn test_connect_lists_keys_and_releases() {
        let key = LocalAccount::from_secret(&[11u8; 32]).unwrap();
        let keystore = Arc::new(MockKeystore::new(vec![key]));
        let kmd = adapter(keystore.clone(), Arc::new(MemorySessionStore::new())).await;

        let wallet = kmd.connect(ignore_disconnect(), None).await.unwrap();
        assert_eq!(wallet.accounts[0].name, "KMDWallet 1");
        assert_eq!(keystore.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_connect_unknown_wallet() {
        let keystore = Arc::new(MockKeystore::new(vec![]).with_wallet_name("other"));
        let kmd = adapter(keystore, Arc::new(MemorySessionStore::new())).await;
        let err = kmd.connect(ignore_disconnect(), None).await.unwrap_err();
        assert!(err.to_string().contains("No wallet named"));
    }

    #[tokio::test]
    async fn test_token_released_on_error() {
        let keystore = Arc::new(MockKeystore::new(vec![]).failing_list_keys());
        let kmd = adapter(keystore.clone(), Arc::new(MemorySessionStore::new())).await;
        assert!(kmd.connect(ignore_disconnect(), None).await.is_err());
        assert_eq!(keystore.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_from_stored_wallet() {
        let key = LocalAccount::from_secret(&[12u8; 32]).unwrap();
        let keystore = Arc::new(MockKeystore::new(vec![key]));
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());

        let first = adapter(keystore.clone(), store.clone()).await;
        assert!(first.reconnect(ignore_disconnect()).await.unwrap().is_none());
        first.connect(ignore_disconnect(), None).await.unwrap();

        let second = adapter(keystore, store).await;
        let wallet = second.reconnect(ignore_disconnect()).await.unwrap().unwrap();
        assert_eq!(wallet.accounts.len(), 1);

        second.disconnect().await.unwrap();
        second.disconnect().await.unwrap();
        assert!(second.reconnect(ignore_disconnect()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_with_rekeyed_authority() {
        let authority = LocalAccount::from_secret(&[13u8; 32]).unwrap();
        let authority_address = authority.address().to_string();
        let keystore = Arc::new(MockKeystore::new(vec![authority]));
        let kmd = adapter(keystore.clone(), Arc::new(MemorySessionStore::new())).await;
        kmd.connect(ignore_disconnect(), None).await.unwrap();

        let sender = LocalAccount::from_secret(&[14u8; 32]).unwrap();
        let connected = vec![Account::new(ProviderId::Kmd, "rekeyed", sender.address())
            .with_auth_addr(Some(authority_address.clone()))];
        let txn = Transaction::payment(sender.address(), "r", 5, 1, 100);
        let groups = TxnGroups::Flat(vec![txn.encode()]);

        let out = kmd
            .sign_transactions(&connected, &groups, None, true)
            .await
            .unwrap();
        let DecodedTransaction::Signed(stxn) = decode_transaction(&out[0]).unwrap() else {
            panic!("expected a signed transaction");
        };
        assert_eq!(stxn.auth_addr.as_deref(), Some(authority_address.as_str()));
        assert!(stxn.verify().is_ok());
        assert_eq!(keystore.open_handles(), 0);
    }
}
