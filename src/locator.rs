//! Locator (scheduler) RPC boundary.
//!
//! The locator resolves a content id to signed edge capabilities and accepts
//! download outcome reports. [`HttpLocatorClient`] speaks JSON-RPC 2.0 over
//! HTTP; tests substitute their own [`LocatorClient`].

use crate::config::{ClientConfig, NetworkConfig};
use crate::error::{FetchError, Result};
use crate::types::{ContentId, DownloadReport, EdgeDescriptor};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// JSON-RPC method resolving a content id to edge descriptors.
pub const RESOLVE_METHOD: &str = "titan.GetDownloadInfosWithCarfile";

/// JSON-RPC method accepting download outcome reports.
pub const REPORT_METHOD: &str = "titan.UserDownloadBlockResults";

/// RPC contract of the locator.
#[async_trait]
pub trait LocatorClient: Send + Sync {
    /// Resolve the edges caching `cid`, identifying the client by its public key.
    async fn resolve_edges(&self, cid: &ContentId, public_key_pem: &str) -> Result<Vec<EdgeDescriptor>>;

    /// Deliver outcome reports.
    async fn report_outcome(&self, reports: &[DownloadReport]) -> Result<()>;
}

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u64,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

/// JSON-RPC locator client.
pub struct HttpLocatorClient {
    endpoint: String,
    client: Client,
    request_timeout: Duration,
    next_id: AtomicU64,
}

impl HttpLocatorClient {
    /// Create a client for a JSON-RPC endpoint.
    pub fn new(endpoint: impl Into<String>, network: &NetworkConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(network.connect_timeout)
            .timeout(network.request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Locator client setup failed, using default timeouts");
                Client::new()
            });

        Self {
            endpoint: endpoint.into(),
            client,
            request_timeout: network.request_timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Create from client configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.locator.rpc_endpoint(), &config.network)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<Option<R>>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        debug!(method, endpoint = %self.endpoint, "Locator RPC call");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.request_timeout.as_millis() as u64)
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Network(format!(
                "locator returned {} for {}",
                response.status(),
                method
            )));
        }

        let body: RpcResponse<R> = response
            .json()
            .await
            .map_err(|e| FetchError::Deserialization(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(FetchError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(body.result)
    }
}

#[async_trait]
impl LocatorClient for HttpLocatorClient {
    async fn resolve_edges(&self, cid: &ContentId, public_key_pem: &str) -> Result<Vec<EdgeDescriptor>> {
        let descriptors: Option<Vec<EdgeDescriptor>> = self
            .call(RESOLVE_METHOD, (cid.as_str(), public_key_pem))
            .await?;

        match descriptors {
            Some(descriptors) if !descriptors.is_empty() => Ok(descriptors),
            _ => Err(FetchError::NotCached(cid.to_string())),
        }
    }

    async fn report_outcome(&self, reports: &[DownloadReport]) -> Result<()> {
        let _: Option<serde_json::Value> = self.call(REPORT_METHOD, (reports,)).await?;
        Ok(())
    }
}
