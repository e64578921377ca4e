//! HTTP transport for edge and gateway retrieval.
//!
//! Edge requests are signed `GET`s carrying the capability in the query string:
//!
//! ```text
//! GET {edgeURL}?cid={cid}&sign={capability}&sn={serial}&signTime={signTime}&timeout={timeout}
//! App-Name: <client identifier>
//! ```
//!
//! Gateway requests are a bare `POST {gatewayBase}{cid}`.

use crate::config::{ClientConfig, NetworkConfig};
use crate::error::{FetchError, Result};
use crate::types::{ContentId, EdgeDescriptor};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Header identifying the client software to edges.
pub const APP_NAME_HEADER: &str = "App-Name";

/// A fully constructed edge retrieval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRequest {
    target: String,
    serial_number: i64,
}

impl EdgeRequest {
    /// Build the request for `cid` from an edge capability.
    ///
    /// A descriptor without a URL has nowhere to send the request and is
    /// treated as not-found; one without a capability signature cannot be
    /// authorized.
    pub fn build(descriptor: &EdgeDescriptor, cid: &ContentId) -> Result<Self> {
        if descriptor.url.is_empty() {
            return Err(FetchError::EdgeNotFound("no target host".to_string()));
        }
        if descriptor.capability_signature.is_empty() {
            return Err(FetchError::MissingCapability(descriptor.serial_number));
        }

        let target = format!(
            "{}?cid={}&sign={}&sn={}&signTime={}&timeout={}",
            descriptor.url,
            cid,
            descriptor.capability_signature,
            descriptor.serial_number,
            descriptor.sign_time,
            descriptor.timeout
        );

        Ok(Self {
            target,
            serial_number: descriptor.serial_number,
        })
    }

    /// Request target URL.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn serial_number(&self) -> i64 {
        self.serial_number
    }
}

/// Performs the raw block requests.
#[async_trait]
pub trait BlockTransport: Send + Sync {
    /// Fetch block bytes from an edge node.
    async fn fetch_edge(&self, request: &EdgeRequest) -> Result<Vec<u8>>;

    /// Fetch block bytes from a gateway URL.
    async fn fetch_gateway(&self, url: &str) -> Result<Vec<u8>>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    app_name: String,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with the given network settings.
    pub fn new(network: &NetworkConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(network.connect_timeout)
            .timeout(network.request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Edge transport client setup failed, using default timeouts");
                Client::new()
            });

        Self {
            client,
            app_name: network.app_name.clone(),
            request_timeout: network.request_timeout,
        }
    }

    /// Create from client configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.network)
    }

    fn transport_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.request_timeout.as_millis() as u64)
        } else {
            FetchError::EdgeTransport(e.to_string())
        }
    }
}

#[async_trait]
impl BlockTransport for HttpTransport {
    async fn fetch_edge(&self, request: &EdgeRequest) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(request.target())
            .header(APP_NAME_HEADER, &self.app_name)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::EdgeNotFound(format!(
                "edge returned {} (sn {})",
                status,
                request.serial_number()
            )));
        }
        if status != StatusCode::OK {
            return Err(FetchError::EdgeStatus {
                status: status.as_u16(),
                url: request.target().to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        debug!(sn = request.serial_number(), bytes = body.len(), "Edge response received");
        Ok(body.to_vec())
    }

    async fn fetch_gateway(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| FetchError::Gateway(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Gateway(format!("{} returned {}", url, status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Gateway(e.to_string()))?;
        Ok(body.to_vec())
    }
}
