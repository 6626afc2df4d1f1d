//! kmd REST Client
//!
//! Low-level client for the keystore daemon's v1 API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{KeystoreClient, KmdOptions, KmdWallet};
use crate::providers::ProviderError;
use crate::txn::{decode_base64, encode_base64, Transaction};

/// API token header
pub const TOKEN_HEADER: &str = "X-KMD-API-Token";

/// kmd API client
pub struct KmdHttpClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct WalletsResponse {
    #[serde(default)]
    wallets: Vec<KmdWallet>,
}

#[derive(Debug, Deserialize)]
struct HandleResponse {
    wallet_handle_token: String,
}

#[derive(Debug, Deserialize)]
struct KeysResponse {
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signed_transaction: String,
}

impl KmdHttpClient {
    /// Create a new API client
    pub fn new(options: &KmdOptions) -> Self {
        let host = options.host.trim_end_matches('/');
        let base_url = if options.port.is_empty() {
            host.to_string()
        } else {
            format!("{}:{}", host, options.port)
        };

        Self {
            client: Client::new(),
            base_url,
            token: options.token.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ProviderError> {
        let resp = self
            .client
            .post(&format!("{}{}", self.base_url, path))
            .header(TOKEN_HEADER, &self.token)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Node { status, message });
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl KeystoreClient for KmdHttpClient {
    async fn list_wallets(&self) -> Result<Vec<KmdWallet>, ProviderError> {
        let resp = self
            .client
            .get(&format!("{}/v1/wallets", self.base_url))
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Node { status, message });
        }

        let data: WalletsResponse = resp.json().await?;
        Ok(data.wallets)
    }

    async fn init_wallet_handle(&self, wallet_id: &str, password: &str) -> Result<String, ProviderError> {
        let data: HandleResponse = self
            .post(
                "/v1/wallet/init",
                json!({ "wallet_id": wallet_id, "wallet_password": password }),
            )
            .await?;
        Ok(data.wallet_handle_token)
    }

    async fn release_wallet_handle(&self, token: &str) -> Result<(), ProviderError> {
        let _: serde_json::Value = self
            .post("/v1/wallet/release", json!({ "wallet_handle_token": token }))
            .await?;
        Ok(())
    }

    async fn list_keys(&self, token: &str) -> Result<Vec<String>, ProviderError> {
        let data: KeysResponse = self
            .post("/v1/key/list", json!({ "wallet_handle_token": token }))
            .await?;
        Ok(data.addresses)
    }

    async fn sign_transaction(
        &self,
        token: &str,
        password: &str,
        txn: &Transaction,
        public_key: Option<[u8; 32]>,
    ) -> Result<Vec<u8>, ProviderError> {
        let mut body = json!({
            "wallet_handle_token": token,
            "wallet_password": password,
            "transaction": encode_base64(&txn.encode()),
        });
        if let Some(pk) = public_key {
            body["public_key"] = json!(encode_base64(&pk));
        }

        let data: SignResponse = self.post("/v1/transaction/sign", body).await?;
        decode_base64(&data.signed_transaction)
    }
}
