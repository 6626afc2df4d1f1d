//! In-crate mock SDKs for adapter, registry and manager tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use zeroize::Zeroizing;

use super::custom::CustomProvider;
use super::injected::{EnableRequest, InjectedAccount, InjectedProvider};
use super::kmd::{KeystoreClient, KmdWallet};
use super::magic::{HostedKeyClient, MagicUser};
use super::mnemonic::SecretPrompt;
use super::relay::{RelayClient, RelayConnectRequest, RelaySession};
use super::{
    Account, AccountInfo, Metadata, OnDisconnect, ProviderError, SigningPlan, TxnGroups, Wallet,
    WalletTransaction,
};
use crate::constants::ProviderId;
use crate::keys::{encode_address, LocalAccount};
use crate::node::{NodeClient, NodeStatus, PendingTransaction};
use crate::txn::{decode_transaction, DecodedTransaction, Transaction};

/// Deterministic unsigned payment from `sender`
pub fn unsigned_txn(sender: &str) -> Vec<u8> {
    Transaction::payment(sender, "RECEIVER", 1, 1, 1000).encode()
}

/// Callback counting its invocations and waking a `Notify`
pub fn counting_disconnect() -> (OnDisconnect, Arc<AtomicUsize>, Arc<Notify>) {
    let count = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(Notify::new());
    let (c, n) = (count.clone(), notify.clone());
    let callback: OnDisconnect = Arc::new(move || {
        c.fetch_add(1, Ordering::SeqCst);
        n.notify_one();
    });
    (callback, count, notify)
}

fn fake_signature(txn: &str) -> Vec<u8> {
    format!("signed:{}", txn).into_bytes()
}

// =============================================================================
// Node
// =============================================================================

pub struct MockNode {
    round: AtomicU64,
    waited: AtomicU64,
    lookups: AtomicUsize,
    confirm_after: Option<usize>,
    pool_error: Option<String>,
    accounts: HashMap<String, AccountInfo>,
    fail_unknown: bool,
    sent: Mutex<Vec<Vec<Vec<u8>>>>,
}

impl MockNode {
    pub fn new() -> Self {
        Self {
            round: AtomicU64::new(1000),
            waited: AtomicU64::new(0),
            lookups: AtomicUsize::new(0),
            confirm_after: None,
            pool_error: None,
            accounts: HashMap::new(),
            fail_unknown: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Confirm on the lookup following `lookups` unconfirmed ones
    pub fn confirm_after(mut self, lookups: usize) -> Self {
        self.confirm_after = Some(lookups);
        self
    }

    pub fn pool_error(mut self, error: &str) -> Self {
        self.pool_error = Some(error.to_string());
        self
    }

    pub fn with_account(mut self, info: AccountInfo) -> Self {
        self.accounts.insert(info.address.clone(), info);
        self
    }

    pub fn failing_unknown_accounts(mut self) -> Self {
        self.fail_unknown = true;
        self
    }

    pub fn rounds_waited(&self) -> u64 {
        self.waited.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Vec<Vec<u8>>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn health(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn status(&self) -> Result<NodeStatus, ProviderError> {
        Ok(NodeStatus {
            last_round: self.round.load(Ordering::SeqCst),
        })
    }

    async fn status_after_block(&self, round: u64) -> Result<NodeStatus, ProviderError> {
        self.waited.fetch_add(1, Ordering::SeqCst);
        self.round.store(round + 1, Ordering::SeqCst);
        Ok(NodeStatus {
            last_round: round + 1,
        })
    }

    async fn account_information(&self, address: &str) -> Result<AccountInfo, ProviderError> {
        if let Some(info) = self.accounts.get(address) {
            return Ok(info.clone());
        }
        if self.fail_unknown {
            return Err(ProviderError::Node {
                status: 404,
                message: "account not found".to_string(),
            });
        }
        Ok(AccountInfo {
            address: address.to_string(),
            amount: 0,
            min_balance: 100_000,
            auth_addr: None,
            assets: vec![],
        })
    }

    async fn send_raw_transactions(&self, txns: &[Vec<u8>]) -> Result<String, ProviderError> {
        let first = txns
            .first()
            .ok_or_else(|| ProviderError::MalformedInput("empty".to_string()))?;
        let id = match decode_transaction(first)? {
            DecodedTransaction::Signed(stxn) => stxn.id(),
            DecodedTransaction::Unsigned(_) => {
                return Err(ProviderError::Node {
                    status: 400,
                    message: "unsigned".to_string(),
                })
            }
        };
        self.sent.lock().unwrap().push(txns.to_vec());
        Ok(id)
    }

    async fn pending_transaction_information(
        &self,
        _txid: &str,
    ) -> Result<PendingTransaction, ProviderError> {
        if let Some(error) = &self.pool_error {
            return Ok(PendingTransaction {
                pool_error: error.clone(),
                ..Default::default()
            });
        }
        let n = self.lookups.fetch_add(1, Ordering::SeqCst);
        match self.confirm_after {
            Some(k) if n >= k => Ok(PendingTransaction {
                confirmed_round: Some(self.round.load(Ordering::SeqCst)),
                ..Default::default()
            }),
            _ => Ok(PendingTransaction::default()),
        }
    }
}

// =============================================================================
// Relay
// =============================================================================

pub struct MockRelay {
    accounts: Vec<String>,
    reject_connect: bool,
    reject_sign: bool,
    sign_delay: Option<Duration>,
    counter: AtomicUsize,
    live: Mutex<HashSet<String>>,
    closers: Mutex<Vec<oneshot::Sender<()>>>,
    requests: Mutex<Vec<RelayConnectRequest>>,
    sign_requests: Mutex<Vec<Vec<WalletTransaction>>>,
    disconnects: AtomicUsize,
}

impl MockRelay {
    pub fn new(accounts: &[&str]) -> Self {
        Self {
            accounts: accounts.iter().map(|a| a.to_string()).collect(),
            reject_connect: false,
            reject_sign: false,
            sign_delay: None,
            counter: AtomicUsize::new(0),
            live: Mutex::new(HashSet::new()),
            closers: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            sign_requests: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn rejecting_connect(mut self) -> Self {
        self.reject_connect = true;
        self
    }

    pub fn rejecting_sign(mut self) -> Self {
        self.reject_sign = true;
        self
    }

    pub fn with_sign_delay(mut self, delay: Duration) -> Self {
        self.sign_delay = Some(delay);
        self
    }

    /// Relay forgets every session without telling the watchers
    pub fn forget_sessions(&self) {
        self.live.lock().unwrap().clear();
    }

    /// Wallet ends every session
    pub fn close_sessions(&self) {
        self.live.lock().unwrap().clear();
        for closer in self.closers.lock().unwrap().drain(..) {
            let _ = closer.send(());
        }
    }

    pub fn last_request(&self) -> Option<RelayConnectRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn sign_requests(&self) -> Vec<Vec<WalletTransaction>> {
        self.sign_requests.lock().unwrap().clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn session(&self, session_id: String) -> RelaySession {
        let (tx, rx) = oneshot::channel();
        self.closers.lock().unwrap().push(tx);
        self.live.lock().unwrap().insert(session_id.clone());
        RelaySession {
            session_id,
            accounts: self.accounts.clone(),
            closed: rx,
        }
    }
}

#[async_trait]
impl RelayClient for MockRelay {
    async fn connect(&self, request: &RelayConnectRequest) -> Result<RelaySession, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.reject_connect {
            return Err(ProviderError::ConnectionRejected("modal closed".to_string()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(self.session(format!("session-{}", n)))
    }

    async fn reconnect_session(&self, session_id: &str) -> Result<Option<RelaySession>, ProviderError> {
        if !self.live.lock().unwrap().contains(session_id) {
            return Ok(None);
        }
        Ok(Some(self.session(session_id.to_string())))
    }

    async fn disconnect(&self, session_id: &str) -> Result<(), ProviderError> {
        self.live.lock().unwrap().remove(session_id);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_transactions(
        &self,
        _session_id: &str,
        _chain_id: u64,
        txns: Vec<WalletTransaction>,
    ) -> Result<Vec<Vec<u8>>, ProviderError> {
        if let Some(delay) = self.sign_delay {
            tokio::time::sleep(delay).await;
        }
        self.sign_requests.lock().unwrap().push(txns.clone());
        if self.reject_sign {
            return Err(ProviderError::UserRejected("request rejected".to_string()));
        }
        Ok(txns
            .iter()
            .filter(|t| !t.is_skipped())
            .map(|t| fake_signature(&t.txn))
            .collect())
    }
}

// =============================================================================
// Injected
// =============================================================================

pub struct MockInjected {
    accounts: Vec<String>,
    reject_sign: bool,
    enables: Mutex<Vec<EnableRequest>>,
}

impl MockInjected {
    pub fn new(accounts: &[&str]) -> Self {
        Self {
            accounts: accounts.iter().map(|a| a.to_string()).collect(),
            reject_sign: false,
            enables: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting_sign(mut self) -> Self {
        self.reject_sign = true;
        self
    }

    pub fn last_enable(&self) -> Option<EnableRequest> {
        self.enables.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl InjectedProvider for MockInjected {
    async fn enable(&self, request: &EnableRequest) -> Result<Vec<InjectedAccount>, ProviderError> {
        self.enables.lock().unwrap().push(request.clone());
        Ok(self
            .accounts
            .iter()
            .map(|address| InjectedAccount {
                address: address.clone(),
                name: None,
            })
            .collect())
    }

    async fn sign_txns(
        &self,
        txns: Vec<WalletTransaction>,
    ) -> Result<Vec<Option<Vec<u8>>>, ProviderError> {
        if self.reject_sign {
            return Err(ProviderError::UserRejected("user declined".to_string()));
        }
        Ok(txns
            .iter()
            .map(|t| (!t.is_skipped()).then(|| fake_signature(&t.txn)))
            .collect())
    }
}

// =============================================================================
// Keystore
// =============================================================================

pub struct MockKeystore {
    keys: Vec<LocalAccount>,
    wallet_name: String,
    reachable: bool,
    fail_list_keys: bool,
    counter: AtomicUsize,
    open: Mutex<HashSet<String>>,
}

impl MockKeystore {
    pub const WALLET_ID: &'static str = "wallet-1";

    pub fn new(keys: Vec<LocalAccount>) -> Self {
        Self {
            keys,
            wallet_name: "unencrypted-default-wallet".to_string(),
            reachable: true,
            fail_list_keys: false,
            counter: AtomicUsize::new(0),
            open: Mutex::new(HashSet::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_wallet_name(mut self, name: &str) -> Self {
        self.wallet_name = name.to_string();
        self
    }

    pub fn failing_list_keys(mut self) -> Self {
        self.fail_list_keys = true;
        self
    }

    pub fn open_handles(&self) -> usize {
        self.open.lock().unwrap().len()
    }
}

#[async_trait]
impl KeystoreClient for MockKeystore {
    async fn list_wallets(&self) -> Result<Vec<KmdWallet>, ProviderError> {
        if !self.reachable {
            return Err(ProviderError::ProviderUnavailable("connection refused".to_string()));
        }
        Ok(vec![KmdWallet {
            id: Self::WALLET_ID.to_string(),
            name: self.wallet_name.clone(),
        }])
    }

    async fn init_wallet_handle(&self, wallet_id: &str, _password: &str) -> Result<String, ProviderError> {
        if wallet_id != Self::WALLET_ID {
            return Err(ProviderError::Node {
                status: 404,
                message: "wallet not found".to_string(),
            });
        }
        let token = format!("token-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.open.lock().unwrap().insert(token.clone());
        Ok(token)
    }

    async fn release_wallet_handle(&self, token: &str) -> Result<(), ProviderError> {
        self.open.lock().unwrap().remove(token);
        Ok(())
    }

    async fn list_keys(&self, _token: &str) -> Result<Vec<String>, ProviderError> {
        if self.fail_list_keys {
            return Err(ProviderError::Node {
                status: 500,
                message: "keystore locked".to_string(),
            });
        }
        Ok(self.keys.iter().map(|k| k.address().to_string()).collect())
    }

    async fn sign_transaction(
        &self,
        _token: &str,
        _password: &str,
        txn: &Transaction,
        public_key: Option<[u8; 32]>,
    ) -> Result<Vec<u8>, ProviderError> {
        let wanted = public_key
            .map(|pk| encode_address(&pk))
            .unwrap_or_else(|| txn.sender.clone());
        let key = self
            .keys
            .iter()
            .find(|k| k.address() == wanted)
            .ok_or_else(|| ProviderError::Key(format!("no key for {}", wanted)))?;
        Ok(txn.sign(key).encode())
    }
}

// =============================================================================
// Hosted key
// =============================================================================

pub struct MockHostedKey {
    address: String,
    logged_in: AtomicBool,
    email: Mutex<Option<String>>,
}

impl MockHostedKey {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            logged_in: AtomicBool::new(false),
            email: Mutex::new(None),
        }
    }
}

#[async_trait]
impl HostedKeyClient for MockHostedKey {
    async fn login_with_email(&self, email: &str) -> Result<(), ProviderError> {
        *self.email.lock().unwrap() = Some(email.to_string());
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_logged_in(&self) -> Result<bool, ProviderError> {
        Ok(self.logged_in.load(Ordering::SeqCst))
    }

    async fn user_info(&self) -> Result<MagicUser, ProviderError> {
        if !self.logged_in.load(Ordering::SeqCst) {
            return Err(ProviderError::NotConnected(ProviderId::Magic));
        }
        Ok(MagicUser {
            email: self.email.lock().unwrap().clone(),
            public_address: self.address.clone(),
        })
    }

    async fn logout(&self) -> Result<(), ProviderError> {
        self.logged_in.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_group(
        &self,
        txns: Vec<WalletTransaction>,
    ) -> Result<Vec<Option<Vec<u8>>>, ProviderError> {
        Ok(txns
            .iter()
            .map(|t| (!t.is_skipped()).then(|| fake_signature(&t.txn)))
            .collect())
    }
}

// =============================================================================
// Mnemonic prompt
// =============================================================================

pub struct StaticPrompt {
    phrase: String,
}

impl StaticPrompt {
    pub fn new(phrase: &str) -> Self {
        Self {
            phrase: phrase.to_string(),
        }
    }
}

#[async_trait]
impl SecretPrompt for StaticPrompt {
    async fn prompt(&self, _message: &str) -> Result<Zeroizing<String>, ProviderError> {
        Ok(Zeroizing::new(self.phrase.clone()))
    }
}

// =============================================================================
// Custom
// =============================================================================

pub struct MockCustom {
    accounts: Vec<String>,
    session: AtomicBool,
    return_nothing: bool,
    fail_reconnect: bool,
}

impl MockCustom {
    pub fn new(accounts: &[&str]) -> Self {
        Self {
            accounts: accounts.iter().map(|a| a.to_string()).collect(),
            session: AtomicBool::new(false),
            return_nothing: false,
            fail_reconnect: false,
        }
    }

    pub fn remember_session(&self) {
        self.session.store(true, Ordering::SeqCst);
    }

    pub fn failing_reconnect(mut self) -> Self {
        self.fail_reconnect = true;
        self
    }

    pub fn returning_nothing(mut self) -> Self {
        self.return_nothing = true;
        self
    }

    fn wallet(&self, metadata: &Metadata) -> Wallet {
        // deliberately mis-tagged; the adapter must fix it
        let accounts = self
            .accounts
            .iter()
            .map(|a| Account::new(ProviderId::Pera, "custom", a.clone()))
            .collect();
        Wallet::from_metadata(metadata, accounts)
    }
}

#[async_trait]
impl CustomProvider for MockCustom {
    async fn connect(&self, metadata: &Metadata) -> Result<Wallet, ProviderError> {
        Ok(self.wallet(metadata))
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.session.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn reconnect(&self, metadata: &Metadata) -> Result<Option<Wallet>, ProviderError> {
        if self.fail_reconnect {
            return Err(ProviderError::Network("backend unreachable".to_string()));
        }
        Ok(self
            .session
            .load(Ordering::SeqCst)
            .then(|| self.wallet(metadata)))
    }

    async fn sign_transactions(
        &self,
        connected_accounts: &[Account],
        groups: &TxnGroups,
        indexes_to_sign: Option<&[usize]>,
        return_group: bool,
    ) -> Result<Vec<Vec<u8>>, ProviderError> {
        if self.return_nothing {
            return Ok(Vec::new());
        }
        let plan = SigningPlan::build(connected_accounts, groups, indexes_to_sign)?;
        let signed = plan
            .candidates()
            .map(|c| fake_signature(&c.index.to_string()))
            .collect();
        plan.merge(signed, return_group)
    }
}
