//! Key material for signing transactions locally
//!
//! Used by the mnemonic adapter and the CLI. Every other provider class
//! delegates signing to its own SDK and never sees keys.

pub mod account;
pub mod mnemonic;

use crate::providers::ProviderError;

/// Common key error type
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Signature verification failed")]
    BadSignature,
}

impl From<KeyError> for ProviderError {
    fn from(err: KeyError) -> Self {
        ProviderError::Key(err.to_string())
    }
}

pub use account::{decode_address, encode_address, LocalAccount};
pub use mnemonic::{mnemonic_to_account, secret_to_mnemonic};
