//! Custom Provider Adapter
//!
//! Wraps a caller-supplied implementation. Session handling is entirely
//! the caller's; the adapter keeps account tagging and output shape
//! consistent with the other providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    Account, AdapterCore, ClientLoader, Metadata, OnDisconnect, ProviderError, SigningPlan,
    TxnGroups, Wallet, WalletAdapter,
};
use crate::constants::ProviderId;

/// Display options for a custom provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomOptions {
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Caller-supplied provider implementation
#[async_trait]
pub trait CustomProvider: Send + Sync {
    async fn connect(&self, metadata: &Metadata) -> Result<Wallet, ProviderError>;

    async fn disconnect(&self) -> Result<(), ProviderError>;

    async fn reconnect(&self, metadata: &Metadata) -> Result<Option<Wallet>, ProviderError>;

    async fn sign_transactions(
        &self,
        connected_accounts: &[Account],
        groups: &TxnGroups,
        indexes_to_sign: Option<&[usize]>,
        return_group: bool,
    ) -> Result<Vec<Vec<u8>>, ProviderError>;
}

/// Adapter delegating to a `CustomProvider`
pub struct CustomAdapter {
    core: AdapterCore,
    provider: ClientLoader<dyn CustomProvider>,
}

impl CustomAdapter {
    pub fn new(
        core: AdapterCore,
        provider: ClientLoader<dyn CustomProvider>,
        options: CustomOptions,
    ) -> Result<Self, ProviderError> {
        if core.id() != ProviderId::Custom {
            return Err(ProviderError::InvalidConfig(format!("{} is not custom", core.id())));
        }
        if options.name.is_empty() {
            return Err(ProviderError::InvalidConfig("custom provider needs a name".to_string()));
        }

        let mut metadata = core.metadata().clone();
        metadata.name = options.name;
        if let Some(icon) = options.icon {
            metadata.icon = icon;
        }
        let core = AdapterCore::new(metadata, core.network().clone(), core.node().clone());

        Ok(Self { core, provider })
    }

    /// Force our own tag and metadata onto whatever the caller returned
    fn normalize(&self, wallet: Wallet) -> Wallet {
        let accounts = wallet
            .accounts
            .into_iter()
            .map(|account| Account {
                provider_id: ProviderId::Custom,
                ..account
            })
            .collect();
        self.core.wallet(accounts)
    }
}

#[async_trait]
impl WalletAdapter for CustomAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn connect(
        &self,
        _on_disconnect: OnDisconnect,
        _email: Option<&str>,
    ) -> Result<Wallet, ProviderError> {
        let provider = self.provider.get().await?;
        let wallet = self.normalize(provider.connect(self.core.metadata()).await?);
        self.core.set_connected(true).await;
        info!("custom provider {} connected", self.core.metadata().name);
        Ok(wallet)
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        if self.core.is_connected().await {
            match self.provider.get().await {
                Ok(provider) => {
                    if let Err(e) = provider.disconnect().await {
                        warn!("custom provider disconnect failed: {}", e);
                    }
                }
                Err(e) => warn!("custom provider unavailable on disconnect: {}", e),
            }
        }
        self.core.set_connected(false).await;
        Ok(())
    }

    async fn reconnect(&self, _on_disconnect: OnDisconnect) -> Result<Option<Wallet>, ProviderError> {
        let provider = self.provider.get().await?;
        match provider.reconnect(self.core.metadata()).await? {
            Some(wallet) => {
                self.core.set_connected(true).await;
                Ok(Some(self.normalize(wallet)))
            }
            None => Ok(None),
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

        // validates indexes and fixes the expected output length
        let plan = SigningPlan::build(connected_accounts, groups, indexes_to_sign)?;
        let expected = if return_group { plan.len() } else { plan.candidate_count() };

        let provider = self.provider.get().await?;
        let signed = provider
            .sign_transactions(connected_accounts, groups, indexes_to_sign, return_group)
            .await?;

        if signed.len() != expected {
            return Err(ProviderError::InvalidResponse(format!(
                "Custom provider returned {} transactions, expected {}",
                signed.len(),
                expected
            )));
        }
        Ok(signed)
    }
}
