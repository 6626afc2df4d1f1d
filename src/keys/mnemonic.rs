//! BIP-39 mnemonic backup for local accounts.

use bip39::{Language, Mnemonic};
use zeroize::Zeroizing;

use super::{KeyError, LocalAccount};

/// Convert an account secret to its 24-word phrase
pub fn secret_to_mnemonic(account: &LocalAccount) -> Zeroizing<String> {
    let secret = account.secret();
    match Mnemonic::from_entropy_in(Language::English, &secret[..]) {
        Ok(m) => Zeroizing::new(m.to_string()),
        // 32 bytes of entropy is always a valid length
        Err(_) => Zeroizing::new(String::new()),
    }
}

/// Parse a 24-word phrase into the account it encodes.
///
/// Whitespace is normalized and case is ignored.
pub fn mnemonic_to_account(phrase: &str) -> Result<LocalAccount, KeyError> {
    let normalized = Zeroizing::new(
        phrase
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
    );
    let m = Mnemonic::parse_in(Language::English, normalized.as_str())
        .map_err(|e| KeyError::InvalidMnemonic(e.to_string()))?;
    let entropy = Zeroizing::new(m.to_entropy());
    if entropy.len() != 32 {
        return Err(KeyError::InvalidMnemonic(format!(
            "expected 24 words, got {}",
            m.word_count()
        )));
    }
    LocalAccount::from_secret(&entropy)
}
