//! Injected Signer Adapter
//!
//! Signers that the host environment exposes directly (AlgoSigner, Exodus,
//! MyAlgo, Lute, Kibisis). There is no session to persist: the signer is
//! either present or not, and every connect re-enables it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    Account, AdapterCore, ClientLoader, OnDisconnect, ProviderError, SigningPlan, TxnGroups,
    Wallet, WalletAdapter, WalletTransaction,
};
use crate::constants::{ProviderClass, ProviderId};

/// Parameters of the signer's enable call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableRequest {
    pub genesis_id: Option<String>,
    pub genesis_hash: Option<String>,
    pub only_if_trusted: bool,
}

/// Account as reported by the signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectedAccount {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Exodus options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExodusOptions {
    pub only_if_trusted: bool,
}

/// Signer object injected by the host
#[async_trait]
pub trait InjectedProvider: Send + Sync {
    async fn enable(&self, request: &EnableRequest) -> Result<Vec<InjectedAccount>, ProviderError>;

    /// One result per entry; skipped entries come back as `None`
    async fn sign_txns(
        &self,
        txns: Vec<WalletTransaction>,
    ) -> Result<Vec<Option<Vec<u8>>>, ProviderError>;

    async fn disconnect(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Adapter for injected signers
pub struct InjectedAdapter {
    core: AdapterCore,
    provider: ClientLoader<dyn InjectedProvider>,
    options: ExodusOptions,
}

impl InjectedAdapter {
    pub fn new(
        core: AdapterCore,
        provider: ClientLoader<dyn InjectedProvider>,
        options: ExodusOptions,
    ) -> Result<Self, ProviderError> {
        if core.id().class() != ProviderClass::Injected {
            return Err(ProviderError::InvalidConfig(format!(
                "{} is not an injected provider",
                core.id()
            )));
        }
        if core.id() == ProviderId::Kibisis && core.network().genesis_hash().is_none() {
            return Err(ProviderError::InvalidConfig(format!(
                "kibisis needs a known genesis hash for {}",
                core.network()
            )));
        }

        Ok(Self {
            core,
            provider,
            options,
        })
    }

    fn enable_request(&self) -> EnableRequest {
        let network = self.core.network();
        match self.core.id() {
            ProviderId::Kibisis => EnableRequest {
                genesis_id: None,
                genesis_hash: network.genesis_hash().map(str::to_string),
                only_if_trusted: false,
            },
            ProviderId::Exodus => EnableRequest {
                genesis_id: Some(network.genesis_id()),
                genesis_hash: None,
                only_if_trusted: self.options.only_if_trusted,
            },
            _ => EnableRequest {
                genesis_id: Some(network.genesis_id()),
                genesis_hash: None,
                only_if_trusted: false,
            },
        }
    }

    /// Rekey lookup for AlgoSigner accounts. Lookup failures leave it unset.
    async fn resolve_auth_addr(&self, address: &str) -> Option<String> {
        match self.core.node().account_information(address).await {
            Ok(info) => info.auth_addr,
            Err(e) => {
                warn!("Could not resolve auth address for {}: {}", address, e);
                None
            }
        }
    }
}

#[async_trait]
impl WalletAdapter for InjectedAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn connect(
        &self,
        _on_disconnect: OnDisconnect,
        _email: Option<&str>,
    ) -> Result<Wallet, ProviderError> {
        let provider = self.provider.get().await?;
        let enabled = provider.enable(&self.enable_request()).await?;

        let mut accounts = Vec::with_capacity(enabled.len());
        for (i, account) in enabled.into_iter().enumerate() {
            let name = account
                .name
                .unwrap_or_else(|| format!("{} Wallet {}", self.core.metadata().name, i + 1));
            let auth_addr = if self.core.id() == ProviderId::Algosigner {
                self.resolve_auth_addr(&account.address).await
            } else {
                None
            };
            accounts.push(Account::new(self.core.id(), name, account.address).with_auth_addr(auth_addr));
        }

        self.core.set_connected(true).await;
        info!("{} enabled {} account(s)", self.core.id(), accounts.len());
        Ok(self.core.wallet(accounts))
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        if self.core.is_connected().await {
            if let Ok(provider) = self.provider.get().await {
                if let Err(e) = provider.disconnect().await {
                    warn!("{} disconnect failed: {}", self.core.id(), e);
                }
            }
            info!("{} disconnected", self.core.id());
        }
        self.core.set_connected(false).await;
        Ok(())
    }

    async fn reconnect(&self, _on_disconnect: OnDisconnect) -> Result<Option<Wallet>, ProviderError> {
        Ok(None)
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

        let provider = self.provider.get().await?;
        let results = provider.sign_txns(plan.wallet_transactions()).await?;
        let signed = plan.collect_positional(results)?;
        plan.merge(signed, return_group)
    }
}
