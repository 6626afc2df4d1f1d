//! Ed25519 Account
//!
//! A local keypair whose address is the base58 encoding of its public key.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroizing;

use super::KeyError;

/// Local account holding an ed25519 signing key
pub struct LocalAccount {
    signing_key: SigningKey,
    address: String,
}

impl LocalAccount {
    /// Create an account from a 32-byte secret seed
    pub fn from_secret(secret: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = secret.try_into().map_err(|_| {
            KeyError::InvalidPrivateKey(format!("Expected 32 bytes, got {}", secret.len()))
        })?;
        let bytes = Zeroizing::new(bytes);
        let signing_key = SigningKey::from_bytes(&bytes);
        let address = encode_address(signing_key.verifying_key().as_bytes());

        Ok(Self {
            signing_key,
            address,
        })
    }

    /// Generate a fresh random account
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let address = encode_address(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// Base58 address of this account
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Raw 32-byte public key
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Secret seed bytes. Handle with care.
    pub fn secret(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// Sign arbitrary bytes
    pub fn sign_bytes(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for LocalAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAccount")
            .field("address", &self.address)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Encode a public key as an address
pub fn encode_address(public_key: &[u8; 32]) -> String {
    bs58::encode(public_key).into_string()
}

/// Decode an address back to its public key
pub fn decode_address(address: &str) -> Result<[u8; 32], KeyError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| KeyError::InvalidAddress(format!("{}: {}", address, e)))?;
    bytes
        .try_into()
        .map_err(|_| KeyError::InvalidAddress(format!("{}: expected 32 bytes", address)))
}

/// Verify a signature made by `address` over `message`
pub fn verify(address: &str, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
    let public_key = decode_address(address)?;
    let key = VerifyingKey::from_bytes(&public_key)
        .map_err(|e| KeyError::InvalidAddress(e.to_string()))?;
    let signature = Signature::from_slice(signature).map_err(|_| KeyError::BadSignature)?;
    key.verify(message, &signature)
        .map_err(|_| KeyError::BadSignature)
}
