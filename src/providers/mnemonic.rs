//! Mnemonic Adapter
//!
//! Signs locally with a key derived from a 24-word phrase. The phrase is
//! requested on every operation that needs it and dropped right after, so
//! nothing secret outlives a call. Intended for test networks only.

use async_trait::async_trait;
use tracing::info;
use zeroize::Zeroizing;

use std::sync::Arc;

use super::{
    Account, AdapterCore, OnDisconnect, ProviderError, SigningPlan, TxnGroups, Wallet,
    WalletAdapter,
};
use crate::constants::{Network, ProviderId};
use crate::keys::{mnemonic_to_account, LocalAccount};
use crate::txn::{decode_base64, decode_base64_transaction, TxnMarker};

const PROMPT: &str = "Paste your mnemonic here. This will be used once to sign the transactions.";

/// Source of the secret phrase
#[async_trait]
pub trait SecretPrompt: Send + Sync {
    async fn prompt(&self, message: &str) -> Result<Zeroizing<String>, ProviderError>;
}

/// Adapter signing with a user supplied phrase
pub struct MnemonicAdapter {
    core: AdapterCore,
    prompt: Arc<dyn SecretPrompt>,
}

impl MnemonicAdapter {
    pub fn new(core: AdapterCore, prompt: Arc<dyn SecretPrompt>) -> Result<Self, ProviderError> {
        if core.id() != ProviderId::Mnemonic {
            return Err(ProviderError::InvalidConfig(format!("{} is not mnemonic", core.id())));
        }
        if *core.network() == Network::Mainnet {
            return Err(ProviderError::InvalidConfig(
                "The mnemonic provider is insecure and not supported on mainnet".to_string(),
            ));
        }
        Ok(Self { core, prompt })
    }

    async fn account(&self) -> Result<LocalAccount, ProviderError> {
        let phrase = self.prompt.prompt(PROMPT).await?;
        if phrase.trim().is_empty() {
            return Err(ProviderError::UserRejected("No mnemonic supplied".to_string()));
        }
        Ok(mnemonic_to_account(&phrase)?)
    }

    /// Sign every unsigned entry of a `["u" | "s", base64]` list.
    ///
    /// Signed entries are returned as their raw bytes.
    pub async fn sign_encoded_transactions(
        &self,
        transactions: &[(TxnMarker, String)],
    ) -> Result<Vec<Vec<u8>>, ProviderError> {
        let _guard = self.core.begin_signing()?;
        self.core.ensure_connected().await?;
        let key = self.account().await?;

        transactions
            .iter()
            .map(|(marker, txn)| match marker {
                TxnMarker::Unsigned => Ok(decode_base64_transaction(txn, false)?.sign(&key).encode()),
                TxnMarker::Signed => decode_base64(txn),
            })
            .collect()
    }
}

#[async_trait]
impl WalletAdapter for MnemonicAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn connect(
        &self,
        _on_disconnect: OnDisconnect,
        _email: Option<&str>,
    ) -> Result<Wallet, ProviderError> {
        let key = self.account().await?;
        let account = Account::new(ProviderId::Mnemonic, "MnemonicWallet 1", key.address());
        drop(key);

        self.core.set_connected(true).await;
        info!("mnemonic account {} connected", account.address);
        Ok(self.core.wallet(vec![account]))
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
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

        let key = self.account().await?;
        let signed = plan
            .candidates()
            .map(|candidate| {
                if candidate.signer() != key.address() {
                    return Err(ProviderError::Key(format!(
                        "Mnemonic does not control {}",
                        candidate.signer()
                    )));
                }
                Ok(candidate.txn.sign(&key).encode())
            })
            .collect::<Result<Vec<_>, _>>()?;

        plan.merge(signed, return_group)
    }
}
