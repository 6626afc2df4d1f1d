//! Provider Error Types
//!
//! Unified error handling for all wallet provider adapters.

use crate::constants::ProviderId;

/// Errors that can occur when interacting with wallet providers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The user or the provider declined the connection request
    #[error("Connection rejected: {0}")]
    ConnectionRejected(String),

    /// The underlying SDK or transport is missing or unreachable
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Operation attempted before a session exists
    #[error("{0} is not connected")]
    NotConnected(ProviderId),

    /// The provider's own approval step was declined
    #[error("User rejected the request: {0}")]
    UserRejected(String),

    /// Transaction bytes or signing indexes could not be used
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Facade-level dispatch with no account selected
    #[error("No active account")]
    NoActiveAccount,

    /// Confirmation polling exceeded its bound
    #[error("Transaction {txid} not confirmed after {rounds} rounds")]
    Timeout { txid: String, rounds: u64 },

    /// A signing request is already in flight on this adapter
    #[error("{0} is already signing a request")]
    SigningInProgress(ProviderId),

    /// Provider declaration or options failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Provider SDK answered with something we cannot use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The node rejected the transaction from its pool
    #[error("Transaction {txid} rejected: {reason}")]
    TransactionRejected { txid: String, reason: String },

    /// Network-related errors (connection failed, timeout, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// Node returned an error status
    #[error("Node error [{status}]: {message}")]
    Node { status: u16, message: String },

    /// Session storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Key material error
    #[error("Key error: {0}")]
    Key(String),
}

impl ProviderError {
    /// Whether this error was caused by the user declining a prompt
    pub fn is_user_rejection(&self) -> bool {
        matches!(
            self,
            ProviderError::UserRejected(_) | ProviderError::ConnectionRejected(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            ProviderError::ProviderUnavailable(format!("Connection failed: {}", err))
        } else if let Some(status) = err.status() {
            ProviderError::Node {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::MalformedInput(err.to_string())
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        ProviderError::Storage(err.to_string())
    }
}
