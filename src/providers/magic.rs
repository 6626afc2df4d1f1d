//! Hosted Key Adapter
//!
//! Keys held by a hosted service and unlocked by an email login (Magic).
//! The service keeps the login; the adapter only caches the user.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{
    Account, AdapterCore, ClientLoader, OnDisconnect, ProviderError, SigningPlan, TxnGroups,
    Wallet, WalletAdapter, WalletTransaction,
};
use crate::constants::ProviderId;

/// Hosted key options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicOptions {
    pub api_key: String,
}

/// Logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicUser {
    pub email: Option<String>,
    pub public_address: String,
}

/// Hosted key service SDK
#[async_trait]
pub trait HostedKeyClient: Send + Sync {
    async fn login_with_email(&self, email: &str) -> Result<(), ProviderError>;

    async fn is_logged_in(&self) -> Result<bool, ProviderError>;

    async fn user_info(&self) -> Result<MagicUser, ProviderError>;

    async fn logout(&self) -> Result<(), ProviderError>;

    /// One result per entry; skipped entries come back as `None`
    async fn sign_group(
        &self,
        txns: Vec<WalletTransaction>,
    ) -> Result<Vec<Option<Vec<u8>>>, ProviderError>;
}

/// Adapter for the hosted key service
pub struct MagicAdapter {
    core: AdapterCore,
    client: ClientLoader<dyn HostedKeyClient>,
    user: RwLock<Option<MagicUser>>,
}

impl MagicAdapter {
    pub fn new(
        core: AdapterCore,
        client: ClientLoader<dyn HostedKeyClient>,
        options: MagicOptions,
    ) -> Result<Self, ProviderError> {
        if core.id() != ProviderId::Magic {
            return Err(ProviderError::InvalidConfig(format!("{} is not magic", core.id())));
        }
        if options.api_key.is_empty() {
            return Err(ProviderError::InvalidConfig("magic requires an api_key".to_string()));
        }
        Ok(Self {
            core,
            client,
            user: RwLock::new(None),
        })
    }

    async fn adopt(&self, user: MagicUser) -> Wallet {
        let name = format!("Magic Wallet {}", user.email.as_deref().unwrap_or_default());
        let account = Account::new(ProviderId::Magic, name.trim_end(), user.public_address.clone());
        *self.user.write().await = Some(user);
        self.core.set_connected(true).await;
        self.core.wallet(vec![account])
    }
}

#[async_trait]
impl WalletAdapter for MagicAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn connect(
        &self,
        _on_disconnect: OnDisconnect,
        email: Option<&str>,
    ) -> Result<Wallet, ProviderError> {
        let email = email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ProviderError::ConnectionRejected("Magic requires an email".to_string()))?;

        let client = self.client.get().await?;
        client.login_with_email(email).await?;
        let user = client.user_info().await?;

        info!("magic logged in {}", user.public_address);
        Ok(self.adopt(user).await)
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        if self.user.write().await.take().is_some() {
            match self.client.get().await {
                Ok(client) => {
                    if let Err(e) = client.logout().await {
                        warn!("magic logout failed: {}", e);
                    }
                }
                Err(e) => warn!("magic client unavailable on disconnect: {}", e),
            }
            info!("magic disconnected");
        }
        self.core.set_connected(false).await;
        Ok(())
    }

    async fn reconnect(&self, _on_disconnect: OnDisconnect) -> Result<Option<Wallet>, ProviderError> {
        let client = self.client.get().await?;
        if !client.is_logged_in().await? {
            return Ok(None);
        }
        let user = client.user_info().await?;
        Ok(Some(self.adopt(user).await))
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

        let client = self.client.get().await?;
        let results = client.sign_group(plan.wallet_transactions()).await?;
        let signed = plan.collect_positional(results)?;
        plan.merge(signed, return_group)
    }
}
