//! Provider Registry
//!
//! Turns a list of provider declarations into adapters. Every declaration
//! is validated on its own; a bad or failing one leaves a `None` entry and
//! never affects its siblings.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::constants::{Network, ProviderClass, ProviderId};
use crate::node::{AlgodClient, NodeClient, NodeConfig};
use crate::providers::{
    default_metadata, AdapterCore, ClientLoader, CustomAdapter, CustomOptions, CustomProvider,
    ExodusOptions, HostedKeyClient, InjectedAdapter, InjectedProvider, KeystoreClient, KmdAdapter,
    KmdHttpClient, KmdOptions, MagicAdapter, MagicOptions, MnemonicAdapter, OnDisconnect,
    ProviderError, RelayAdapter, RelayClient, RelayOptions, SecretPrompt, Wallet, WalletAdapter,
};
use crate::session::{MemorySessionStore, SessionStore};

/// Per-provider options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderOptions {
    /// pera, defly, daffi
    Relay(RelayOptions),
    WalletConnect(RelayOptions),
    Kmd(KmdOptions),
    Exodus(ExodusOptions),
    Magic(MagicOptions),
    Custom(CustomOptions),
}

impl ProviderOptions {
    fn kind(&self) -> &'static str {
        match self {
            ProviderOptions::Relay(_) => "relay",
            ProviderOptions::WalletConnect(_) => "wallet_connect",
            ProviderOptions::Kmd(_) => "kmd",
            ProviderOptions::Exodus(_) => "exodus",
            ProviderOptions::Magic(_) => "magic",
            ProviderOptions::Custom(_) => "custom",
        }
    }
}

/// Provider SDK supplied with a declaration
pub enum ClientSource {
    Relay(ClientLoader<dyn RelayClient>),
    Injected(ClientLoader<dyn InjectedProvider>),
    Keystore(ClientLoader<dyn KeystoreClient>),
    HostedKey(ClientLoader<dyn HostedKeyClient>),
    Custom(ClientLoader<dyn CustomProvider>),
}

impl ClientSource {
    fn kind(&self) -> &'static str {
        match self {
            ClientSource::Relay(_) => "relay",
            ClientSource::Injected(_) => "injected",
            ClientSource::Keystore(_) => "keystore",
            ClientSource::HostedKey(_) => "hosted key",
            ClientSource::Custom(_) => "custom",
        }
    }
}

/// One entry of the provider list
pub struct ProviderDef {
    pub id: ProviderId,
    pub options: Option<ProviderOptions>,
    pub client: Option<ClientSource>,
}

impl ProviderDef {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            options: None,
            client: None,
        }
    }

    pub fn with_options(mut self, options: ProviderOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_client(mut self, client: ClientSource) -> Self {
        self.client = Some(client);
        self
    }
}

impl From<ProviderId> for ProviderDef {
    fn from(id: ProviderId) -> Self {
        Self::new(id)
    }
}

/// What the host process provides to adapters
pub struct HostEnvironment {
    /// Injected signers present in the host, by provider
    pub injected: HashMap<ProviderId, Arc<dyn InjectedProvider>>,
    /// Secret source for the mnemonic provider
    pub prompt: Option<Arc<dyn SecretPrompt>>,
    pub store: Arc<dyn SessionStore>,
}

impl Default for HostEnvironment {
    fn default() -> Self {
        Self {
            injected: HashMap::new(),
            prompt: None,
            store: Arc::new(MemorySessionStore::new()),
        }
    }
}

/// Ordered provider map
#[derive(Default, Clone)]
pub struct Registry {
    entries: Vec<(ProviderId, Option<Arc<dyn WalletAdapter>>)>,
}

impl Registry {
    pub fn get(&self, id: ProviderId) -> Option<Arc<dyn WalletAdapter>> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == id)
            .and_then(|(_, adapter)| adapter.clone())
    }

    pub fn contains(&self, id: ProviderId) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    /// Swap the adapter of an existing entry, returning the old one
    pub fn replace(
        &mut self,
        id: ProviderId,
        adapter: Option<Arc<dyn WalletAdapter>>,
    ) -> Result<Option<Arc<dyn WalletAdapter>>, ProviderError> {
        let slot = self
            .entries
            .iter_mut()
            .find(|(entry, _)| *entry == id)
            .ok_or_else(|| ProviderError::InvalidConfig(format!("{} is not registered", id)))?;
        Ok(std::mem::replace(&mut slot.1, adapter))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProviderId, Option<&Arc<dyn WalletAdapter>>)> {
        self.entries.iter().map(|(id, adapter)| (*id, adapter.as_ref()))
    }

    /// Initialized adapters in order
    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn WalletAdapter>> {
        self.entries.iter().filter_map(|(_, adapter)| adapter.as_ref())
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(id, a)| (id, a.is_some())))
            .finish()
    }
}

/// Build adapters against an HTTP node client
pub async fn initialize_providers(
    defs: Vec<ProviderDef>,
    node_config: &NodeConfig,
    env: &HostEnvironment,
) -> Result<Registry, ProviderError> {
    let node: Arc<dyn NodeClient> = Arc::new(AlgodClient::new(node_config)?);
    initialize_providers_with_node(defs, node_config.network.clone(), node, env).await
}

/// Build adapters against an existing node client
pub async fn initialize_providers_with_node(
    defs: Vec<ProviderDef>,
    network: Network,
    node: Arc<dyn NodeClient>,
    env: &HostEnvironment,
) -> Result<Registry, ProviderError> {
    if defs.is_empty() {
        return Err(ProviderError::InvalidConfig(
            "At least one provider is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(defs.len());
    for def in defs {
        if seen.insert(def.id) {
            unique.push(def);
        } else {
            warn!("Duplicate provider {} ignored", def.id);
        }
    }

    let builds = unique.into_iter().map(|def| {
        let core = AdapterCore::new(default_metadata(def.id), network.clone(), node.clone());
        async move {
            let id = def.id;
            match init_provider(def, core, env).await {
                Ok(adapter) => {
                    info!("Initialized provider {}", id);
                    (id, Some(adapter))
                }
                Err(e) => {
                    warn!("Provider {} unavailable: {}", id, e);
                    (id, None)
                }
            }
        }
    });

    Ok(Registry {
        entries: join_all(builds).await,
    })
}

fn mismatch(id: ProviderId, what: &str, kind: &str) -> ProviderError {
    ProviderError::InvalidConfig(format!("{} does not accept {} {}", id, kind, what))
}

/// Validate one declaration and build its adapter
async fn init_provider(
    def: ProviderDef,
    core: AdapterCore,
    env: &HostEnvironment,
) -> Result<Arc<dyn WalletAdapter>, ProviderError> {
    let ProviderDef {
        id,
        options,
        client,
    } = def;

    match id.class() {
        ProviderClass::Relay => {
            let options = match (id, options) {
                (ProviderId::Walletconnect, Some(ProviderOptions::WalletConnect(o))) => o,
                (ProviderId::Walletconnect, None) => {
                    return Err(ProviderError::InvalidConfig(
                        "walletconnect requires options".to_string(),
                    ))
                }
                (ProviderId::Walletconnect, Some(other)) => return Err(mismatch(id, "options", other.kind())),
                (_, Some(ProviderOptions::Relay(o))) => o,
                (_, None) => RelayOptions::default(),
                (_, Some(other)) => return Err(mismatch(id, "options", other.kind())),
            };
            let client = match client {
                Some(ClientSource::Relay(loader)) => loader,
                Some(other) => return Err(mismatch(id, "client", other.kind())),
                None => {
                    return Err(ProviderError::ProviderUnavailable(format!(
                        "{} requires a relay client",
                        id
                    )))
                }
            };
            Ok(Arc::new(RelayAdapter::new(core, client, options, env.store.clone())?))
        }

        ProviderClass::Injected => {
            let options = match options {
                Some(ProviderOptions::Exodus(o)) if id == ProviderId::Exodus => o,
                Some(other) => return Err(mismatch(id, "options", other.kind())),
                None => ExodusOptions::default(),
            };
            let provider = match client {
                Some(ClientSource::Injected(loader)) => loader,
                Some(other) => return Err(mismatch(id, "client", other.kind())),
                None => {
                    let found = env.injected.get(&id).cloned().ok_or_else(|| {
                        ProviderError::ProviderUnavailable(format!("{} is not installed", id))
                    })?;
                    ClientLoader::ready(found)
                }
            };
            Ok(Arc::new(InjectedAdapter::new(core, provider, options)?))
        }

        ProviderClass::Keystore => {
            let options = match options {
                Some(ProviderOptions::Kmd(o)) => o,
                Some(other) => return Err(mismatch(id, "options", other.kind())),
                None => KmdOptions::default(),
            };
            let client = match client {
                Some(ClientSource::Keystore(loader)) => loader,
                Some(other) => return Err(mismatch(id, "client", other.kind())),
                None => {
                    let http: Arc<dyn KeystoreClient> = Arc::new(KmdHttpClient::new(&options));
                    ClientLoader::ready(http)
                }
            };
            Ok(Arc::new(
                KmdAdapter::init(core, client, options, env.store.clone()).await?,
            ))
        }

        ProviderClass::HostedKey => {
            let options = match options {
                Some(ProviderOptions::Magic(o)) => o,
                Some(other) => return Err(mismatch(id, "options", other.kind())),
                None => {
                    return Err(ProviderError::InvalidConfig("magic requires options".to_string()))
                }
            };
            let client = match client {
                Some(ClientSource::HostedKey(loader)) => loader,
                Some(other) => return Err(mismatch(id, "client", other.kind())),
                None => {
                    return Err(ProviderError::ProviderUnavailable(
                        "magic requires a hosted key client".to_string(),
                    ))
                }
            };
            Ok(Arc::new(MagicAdapter::new(core, client, options)?))
        }

        ProviderClass::Mnemonic => {
            if let Some(other) = options {
                return Err(mismatch(id, "options", other.kind()));
            }
            if let Some(other) = client {
                return Err(mismatch(id, "client", other.kind()));
            }
            let prompt = env.prompt.clone().ok_or_else(|| {
                ProviderError::ProviderUnavailable("No secret prompt available".to_string())
            })?;
            Ok(Arc::new(MnemonicAdapter::new(core, prompt)?))
        }

        ProviderClass::Custom => {
            let options = match options {
                Some(ProviderOptions::Custom(o)) => o,
                Some(other) => return Err(mismatch(id, "options", other.kind())),
                None => {
                    return Err(ProviderError::InvalidConfig("custom requires options".to_string()))
                }
            };
            let provider = match client {
                Some(ClientSource::Custom(loader)) => loader,
                Some(other) => return Err(mismatch(id, "client", other.kind())),
                None => {
                    return Err(ProviderError::InvalidConfig(
                        "custom requires a provider".to_string(),
                    ))
                }
            };
            Ok(Arc::new(CustomAdapter::new(core, provider, options)?))
        }
    }
}

/// Result of one adapter's reconnect
#[derive(Debug)]
pub struct ReconnectOutcome {
    pub provider: ProviderId,
    pub result: Result<Option<Wallet>, ProviderError>,
}

/// Reconnect every initialized adapter concurrently.
///
/// Outcomes follow registry order; a failure is logged and kept in its
/// outcome without affecting the others.
pub async fn reconnect_providers<F>(registry: &Registry, on_disconnect: F) -> Vec<ReconnectOutcome>
where
    F: Fn(ProviderId) -> OnDisconnect,
{
    let sweeps = registry.adapters().map(|adapter| {
        let provider = adapter.id();
        let callback = on_disconnect(provider);
        async move {
            let result = adapter.reconnect(callback).await;
            match &result {
                Ok(Some(wallet)) => {
                    info!("Reconnected {} with {} account(s)", provider, wallet.accounts.len())
                }
                Ok(None) => {}
                Err(e) => warn!("Reconnect of {} failed: {}", provider, e),
            }
            ReconnectOutcome { provider, result }
        }
    });

    join_all(sweeps).await
}
