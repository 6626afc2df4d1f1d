//! Algod HTTP Client
//!
//! REST client for the node's v2 API.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::Deserialize;

use super::{NodeClient, NodeConfig, NodeStatus, PendingTransaction};
use crate::providers::{AccountInfo, ProviderError};

/// API token header
pub const TOKEN_HEADER: &str = "X-Algo-API-Token";

/// Node REST client
pub struct AlgodClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

impl AlgodClient {
    /// Create a client from node settings
    pub fn new(config: &NodeConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        if !config.node_token.is_empty() {
            headers.insert(TOKEN_HEADER, header_value(&config.node_token)?);
        }
        for (name, value) in &config.node_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ProviderError::InvalidConfig(format!("Invalid header {}: {}", name, e)))?;
            headers.insert(name, header_value(value)?);
        }

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url(config),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = check(self.client.get(&url).send().await?).await?;
        Ok(resp.json().await?)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ProviderError> {
    HeaderValue::from_str(value)
        .map_err(|e| ProviderError::InvalidConfig(format!("Invalid header value: {}", e)))
}

fn base_url(config: &NodeConfig) -> String {
    let server = config.node_server.trim_end_matches('/');
    if config.node_port.is_empty() {
        server.to_string()
    } else {
        format!("{}:{}", server, config.node_port)
    }
}

async fn check(resp: Response) -> Result<Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(ProviderError::Node {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl NodeClient for AlgodClient {
    async fn health(&self) -> Result<(), ProviderError> {
        let url = format!("{}/health", self.base_url);
        check(self.client.get(&url).send().await?).await?;
        Ok(())
    }

    async fn status(&self) -> Result<NodeStatus, ProviderError> {
        self.get_json("/v2/status").await
    }

    async fn status_after_block(&self, round: u64) -> Result<NodeStatus, ProviderError> {
        self.get_json(&format!("/v2/status/wait-for-block-after/{}", round))
            .await
    }

    async fn account_information(&self, address: &str) -> Result<AccountInfo, ProviderError> {
        self.get_json(&format!("/v2/accounts/{}", address)).await
    }

    async fn send_raw_transactions(&self, txns: &[Vec<u8>]) -> Result<String, ProviderError> {
        let url = format!("{}/v2/transactions", self.base_url);
        let body: Vec<u8> = txns.concat();

        let resp = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/x-binary")
            .body(body)
            .send()
            .await?;

        let sent: SendResponse = check(resp).await?.json().await?;
        Ok(sent.tx_id)
    }

    async fn pending_transaction_information(
        &self,
        txid: &str,
    ) -> Result<PendingTransaction, ProviderError> {
        self.get_json(&format!("/v2/transactions/pending/{}?format=json", txid))
            .await
    }
}
