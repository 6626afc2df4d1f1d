//! Ledger Node Access
//!
//! The `NodeClient` trait covers the handful of node calls the adapters need:
//! health, round status, account lookup, raw submission and pending lookup.
//! `AlgodClient` is the HTTP implementation.

pub mod algod;

pub use algod::AlgodClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::constants::{
    Network, DEFAULT_NETWORK, DEFAULT_NODE_BASEURL, DEFAULT_NODE_PORT, DEFAULT_NODE_TOKEN,
    DEFAULT_WAIT_ROUNDS,
};
use crate::providers::{AccountInfo, ProviderError};
use crate::txn::{decode_transaction, DecodedTransaction};

/// Node connection settings shared by every adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network: Network,
    pub node_server: String,
    pub node_token: String,
    pub node_port: String,
    pub node_headers: BTreeMap<String, String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK,
            node_server: DEFAULT_NODE_BASEURL.to_string(),
            node_token: DEFAULT_NODE_TOKEN.to_string(),
            node_port: DEFAULT_NODE_PORT.to_string(),
            node_headers: BTreeMap::new(),
        }
    }
}

/// Round status of the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeStatus {
    pub last_round: u64,
}

/// Pending transaction lookup result
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PendingTransaction {
    #[serde(default)]
    pub confirmed_round: Option<u64>,
    #[serde(default)]
    pub pool_error: String,
    #[serde(default)]
    pub global_state_delta: Option<serde_json::Value>,
    #[serde(default)]
    pub txn: Option<serde_json::Value>,
}

/// Result of broadcasting a group and waiting for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfirmedTransaction {
    pub id: String,
    pub confirmed_round: u64,
    pub pool_error: String,
    pub global_state_delta: Option<serde_json::Value>,
    pub txn: Option<serde_json::Value>,
}

/// Node operations used by the adapters
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn health(&self) -> Result<(), ProviderError>;

    async fn status(&self) -> Result<NodeStatus, ProviderError>;

    /// Block until the node has seen a round after `round`
    async fn status_after_block(&self, round: u64) -> Result<NodeStatus, ProviderError>;

    async fn account_information(&self, address: &str) -> Result<AccountInfo, ProviderError>;

    /// Submit concatenated signed transactions, returning the first txid
    async fn send_raw_transactions(&self, txns: &[Vec<u8>]) -> Result<String, ProviderError>;

    async fn pending_transaction_information(
        &self,
        txid: &str,
    ) -> Result<PendingTransaction, ProviderError>;
}

/// Poll until `txid` is confirmed, for at most `rounds` rounds.
///
/// A pool error aborts immediately; lookup failures are retried until
/// the bound is reached.
pub async fn wait_for_confirmation(
    node: &dyn NodeClient,
    txid: &str,
    rounds: u64,
) -> Result<PendingTransaction, ProviderError> {
    let start_round = node.status().await?.last_round.saturating_add(1);
    let end_round = start_round.saturating_add(rounds);
    let mut current_round = start_round;

    while current_round < end_round {
        match node.pending_transaction_information(txid).await {
            Ok(pending) => {
                if pending.confirmed_round.is_some_and(|round| round > 0) {
                    return Ok(pending);
                }
                if !pending.pool_error.is_empty() {
                    return Err(ProviderError::TransactionRejected {
                        txid: txid.to_string(),
                        reason: pending.pool_error,
                    });
                }
            }
            Err(e) => debug!("Pending lookup for {} failed: {}", txid, e),
        }

        node.status_after_block(current_round).await?;
        current_round += 1;
    }

    Err(ProviderError::Timeout {
        txid: txid.to_string(),
        rounds,
    })
}

/// Broadcast signed transactions and wait for confirmation.
///
/// Without an explicit bound, waits for the validity window of the first
/// transaction, or `DEFAULT_WAIT_ROUNDS` when that window is empty.
pub async fn send_raw_transactions(
    node: &dyn NodeClient,
    txns: &[Vec<u8>],
    rounds: Option<u64>,
) -> Result<ConfirmedTransaction, ProviderError> {
    let first = txns
        .first()
        .ok_or_else(|| ProviderError::MalformedInput("No transactions to send".to_string()))?;

    let first = match decode_transaction(first)? {
        DecodedTransaction::Signed(stxn) => stxn,
        DecodedTransaction::Unsigned(_) => {
            return Err(ProviderError::MalformedInput(
                "Cannot send an unsigned transaction".to_string(),
            ))
        }
    };

    let rounds = rounds
        .filter(|r| *r > 0)
        .unwrap_or_else(|| match first.txn.validity_rounds() {
            0 => DEFAULT_WAIT_ROUNDS,
            window => window,
        });

    let txid = node.send_raw_transactions(txns).await?;
    info!("Sent {} transaction(s), txid {}", txns.len(), txid);

    let confirmed = wait_for_confirmation(node, &txid, rounds).await.map_err(|e| {
        warn!("Transaction {} failed to confirm: {}", txid, e);
        e
    })?;

    Ok(ConfirmedTransaction {
        id: txid,
        confirmed_round: confirmed.confirmed_round.unwrap_or_default(),
        pool_error: confirmed.pool_error,
        global_state_delta: confirmed.global_state_delta,
        txn: confirmed.txn,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::LocalAccount;
    use crate::providers::testing::MockNode;
    use crate::txn::Transaction;

    #[test]
    fn test_node_config_defaults() {
        let config: NodeConfig = serde_json::from_str(r#"{"network": "testnet"}"#).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.node_server, DEFAULT_NODE_BASEURL);
        assert!(config.node_token.is_empty());
    }

    #[tokio::test]
    async fn test_wait_confirms_after_some_rounds() {
        let node = MockNode::new().confirm_after(2);
        let pending = wait_for_confirmation(&node, "TXID", 5).await.unwrap();
        assert!(pending.confirmed_round.is_some());
    }

    #[tokio::test]
    async fn test_wait_times_out_after_bound() {
        let node = MockNode::new();
        let err = wait_for_confirmation(&node, "TXID", 3).await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::Timeout {
                txid: "TXID".to_string(),
                rounds: 3
            }
        );
        assert_eq!(node.rounds_waited(), 3);
    }

    #[tokio::test]
    async fn test_wait_pool_error_rejects() {
        let node = MockNode::new().pool_error("overspend");
        let err = wait_for_confirmation(&node, "TXID", 10).await.unwrap_err();
        assert!(matches!(err, ProviderError::TransactionRejected { reason, .. } if reason == "overspend"));
    }

    #[tokio::test]
    async fn test_send_uses_validity_window() {
        let account = LocalAccount::from_secret(&[1u8; 32]).unwrap();
        let stxn = Transaction::payment(account.address(), "r", 1, 10, 13).sign(&account);

        // never confirms, so the bound is what the error reports
        let node = MockNode::new();
        let err = send_raw_transactions(&node, &[stxn.encode()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { rounds: 3, .. }));
        assert_eq!(node.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_send_confirms() {
        let account = LocalAccount::from_secret(&[1u8; 32]).unwrap();
        let stxn = Transaction::payment(account.address(), "r", 1, 10, 1010).sign(&account);

        let node = MockNode::new().confirm_after(0);
        let confirmed = send_raw_transactions(&node, &[stxn.encode()], Some(4))
            .await
            .unwrap();
        assert_eq!(confirmed.id, stxn.id());
        assert!(confirmed.confirmed_round > 0);
    }

    #[tokio::test]
    async fn test_send_with_unbounded_wait() {
        let account = LocalAccount::from_secret(&[1u8; 32]).unwrap();
        let stxn = Transaction::payment(account.address(), "r", 1, 10, 20).sign(&account);

        let node = MockNode::new().confirm_after(0);
        let confirmed = send_raw_transactions(&node, &[stxn.encode()], Some(u64::MAX))
            .await
            .unwrap();
        assert!(confirmed.confirmed_round > 0);
    }

    #[tokio::test]
    async fn test_send_empty_window_uses_default_bound() {
        let account = LocalAccount::from_secret(&[1u8; 32]).unwrap();
        let stxn = Transaction::payment(account.address(), "r", 1, 10, 10).sign(&account);

        let node = MockNode::new();
        let err = send_raw_transactions(&node, &[stxn.encode()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { rounds, .. } if rounds == DEFAULT_WAIT_ROUNDS));
        assert_eq!(node.rounds_waited(), DEFAULT_WAIT_ROUNDS);
    }

    #[tokio::test]
    async fn test_send_rejects_unsigned_and_empty() {
        let node = MockNode::new();
        let unsigned = Transaction::payment("s", "r", 1, 10, 20).encode();
        assert!(matches!(
            send_raw_transactions(&node, &[unsigned], None).await,
            Err(ProviderError::MalformedInput(_))
        ));
        assert!(matches!(
            send_raw_transactions(&node, &[], None).await,
            Err(ProviderError::MalformedInput(_))
        ));
    }
}
