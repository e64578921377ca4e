//! Public or local gateway used when no edge can serve a block.

use crate::config::ClientConfig;
use crate::error::{ErrorKind, FetchError, Result};
use crate::transport::{BlockTransport, HttpTransport};
use crate::types::{Block, ContentId};
use std::sync::Arc;
use tracing::{debug, warn};

/// When an edge failure hands the request over to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Only when the edge does not hold the content.
    #[default]
    OnNotFound,
    /// On any failure except cancellation, including pool resolution.
    OnAnyError,
}

/// Gateway fallback path.
#[derive(Clone)]
pub struct Gateway {
    base_url: String,
    transport: Arc<dyn BlockTransport>,
    policy: FallbackPolicy,
}

impl Gateway {
    /// Create a gateway rooted at `base_url`; the content id is appended verbatim.
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn BlockTransport>) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
            policy: FallbackPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build from configuration. Returns `None` when the gateway is disabled.
    pub fn from_config(config: &ClientConfig) -> Option<Self> {
        if !config.gateway.enabled {
            return None;
        }
        let policy = if config.gateway.fallback_on_any_error {
            FallbackPolicy::OnAnyError
        } else {
            FallbackPolicy::OnNotFound
        };
        let transport: Arc<dyn BlockTransport> = Arc::new(HttpTransport::from_config(config));
        Some(Self::new(config.gateway.base_url(), transport).with_policy(policy))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    pub fn url_for(&self, cid: &ContentId) -> String {
        format!("{}{}", self.base_url, cid)
    }

    /// Whether an edge failure should be retried through the gateway.
    pub fn should_fall_back(&self, error: &FetchError) -> bool {
        match self.policy {
            FallbackPolicy::OnNotFound => error.is_not_found(),
            FallbackPolicy::OnAnyError => error.kind() != ErrorKind::Cancelled,
        }
    }

    /// Fetch `cid` from the gateway. Failure here is terminal.
    pub async fn fetch(&self, cid: &ContentId) -> Result<Block> {
        if self.base_url.is_empty() {
            return Err(FetchError::Gateway("no gateway address configured".to_string()));
        }

        let url = self.url_for(cid);
        debug!(cid = %cid, url = %url, "Fetching from gateway");

        match self.transport.fetch_gateway(&url).await {
            Ok(data) => {
                crate::observability::record_gateway_fetch(true, data.len());
                Ok(Block::new(cid.clone(), data))
            }
            Err(e) => {
                crate::observability::record_gateway_fetch(false, 0);
                warn!(cid = %cid, error = %e, "Gateway fetch failed");
                Err(match e {
                    FetchError::Gateway(_) => e,
                    other => FetchError::Gateway(other.to_string()),
                })
            }
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("base_url", &self.base_url)
            .field("policy", &self.policy)
            .finish()
    }
}
